use super::*;

/// An unrecognized character in the source.
/// Lexing stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub pos: Pos,
}

/// A grammar violation. There is no recovery: the first one aborts the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

/// A structural problem which prevents elaboration.
/// Everything else degrades to constant 0 (see [`crate::flatten`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    NoModules,
    DuplicateModule(Name),
    DuplicatePort(Name, Name),
    RecursiveInstantiation(Vec<Name>),
    Arity(Name, usize, usize),
    WidthMismatch(&'static str, usize, usize),
    IndexOutOfRange(Name, usize),
}

/// Errors raised while driving a [`crate::sim::Simulator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    NoSuchInput(Name),
    NoSuchOutput(Name),
    NoSuchWire(Name),
    NoSuchModule(Name),
    NoSuchBusPin(Name),
}

/// Any failure of the text to netlist pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Lex(LexError),
    Parse(ParseError),
    Compile(CompileError),
}

impl LexError {
    pub(crate) fn unexpected(ch: char, pos: Pos) -> LexError {
        LexError {
            message: format!("Unexpected character {ch:?}"),
            pos,
        }
    }
}

impl HasPos for LexError {
    fn pos(&self) -> Pos {
        self.pos
    }
}

impl HasPos for ParseError {
    fn pos(&self) -> Pos {
        self.pos
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.pos, self.message)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.pos, self.message)
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CompileError::NoModules => write!(f, "No modules found"),
            CompileError::DuplicateModule(name) => write!(f, "Duplicate module: {name}"),
            CompileError::DuplicatePort(module, port) => write!(f, "Duplicate port {port} in module {module}"),
            CompileError::RecursiveInstantiation(stack) => write!(f, "Recursive instantiation: {}", stack.join(" -> ")),
            CompileError::Arity(name, expected, found) => write!(f, "{name} expects {expected} arguments, found {found}"),
            CompileError::WidthMismatch(prim, w0, w1) => write!(f, "Width mismatch in {prim}: {w0} bits vs {w1} bits"),
            CompileError::IndexOutOfRange(module, index) => write!(f, "Bit index {index} out of range in module {module}"),
        }
    }
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SimError::NoSuchInput(name) => write!(f, "No such input: {name}"),
            SimError::NoSuchOutput(name) => write!(f, "No such output: {name}"),
            SimError::NoSuchWire(name) => write!(f, "No such wire: {name}"),
            SimError::NoSuchModule(name) => write!(f, "No such module: {name}"),
            SimError::NoSuchBusPin(name) => write!(f, "Ram bus pin not found: {name}"),
        }
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WireError::Lex(error) => write!(f, "{error}"),
            WireError::Parse(error) => write!(f, "{error}"),
            WireError::Compile(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for LexError {}
impl std::error::Error for ParseError {}
impl std::error::Error for CompileError {}
impl std::error::Error for SimError {}
impl std::error::Error for WireError {}

impl From<LexError> for WireError {
    fn from(error: LexError) -> WireError {
        WireError::Lex(error)
    }
}

impl From<ParseError> for WireError {
    fn from(error: ParseError) -> WireError {
        WireError::Parse(error)
    }
}

impl From<CompileError> for WireError {
    fn from(error: CompileError) -> WireError {
        WireError::Compile(error)
    }
}
