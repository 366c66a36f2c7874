//! The syntax tree produced by [`crate::parser`].
//!
//! This shape is also the interchange format for tools which edit circuits
//! without going through text: every type here is serde (de)serialisable,
//! and [`Module`]'s `Display` regenerates source which parses back to the same tree.
use super::*;

use serde::{Deserialize, Serialize};

/// The widest bus, and one past the highest bit index, a circuit may name.
pub const MAX_WIDTH: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: Name,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: Name,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub target: Target,
    pub expr: Expr,
}

/// The left hand side of a statement.
/// With a `range`, only those bits of the bus are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: Name,
    pub range: Option<BitRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BitRange {
    Bit { bit: usize },
    /// Inclusive on both ends: `[0:7]` is 8 bits.
    Slice { lo: usize, hi: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    Identifier { name: Name },
    Number { value: u64 },
    Call { name: Name, args: Vec<Expr> },
    Member { object: Box<Expr>, field: Name },
    Index { object: Box<Expr>, bit: usize },
    Slice { object: Box<Expr>, lo: usize, hi: usize },
}

impl Port {
    pub fn new(name: impl Into<Name>, width: usize) -> Port {
        Port { name: name.into(), width }
    }
}

impl Module {
    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|port| port.name == name)
    }

    /// Every name assigned by some statement of this module.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self.statements.iter().map(|stmt| stmt.target.name.as_str()).collect();
        targets.sort();
        targets.dedup();
        targets
    }
}

impl BitRange {
    /// Normalised `(lo, hi)`, inclusive.
    pub fn bounds(&self) -> (usize, usize) {
        match *self {
            BitRange::Bit { bit } => (bit, bit),
            BitRange::Slice { lo, hi } => (lo.min(hi), lo.max(hi)),
        }
    }

    pub fn width(&self) -> usize {
        let (lo, hi) = self.bounds();
        (hi - lo).saturating_add(1)
    }
}

impl Expr {
    /// The largest bit index this expression or any subexpression names.
    pub fn max_index(&self) -> usize {
        match self {
            Expr::Identifier { .. } | Expr::Number { .. } => 0,
            Expr::Call { args, .. } => args.iter().map(|arg| arg.max_index()).max().unwrap_or(0),
            Expr::Member { object, .. } => object.max_index(),
            Expr::Index { object, bit } => object.max_index().max(*bit),
            Expr::Slice { object, lo, hi } => object.max_index().max(*lo).max(*hi),
        }
    }

    pub fn ident(name: impl Into<Name>) -> Expr {
        Expr::Identifier { name: name.into() }
    }

    pub fn call(name: impl Into<Name>, args: Vec<Expr>) -> Expr {
        Expr::Call { name: name.into(), args }
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.width == 1 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.width)
        }
    }
}

impl std::fmt::Display for BitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BitRange::Bit { bit } => write!(f, "[{bit}]"),
            BitRange::Slice { lo, hi } => write!(f, "[{lo}:{hi}]"),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(range) = &self.range {
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Expr::Identifier { name } => write!(f, "{name}"),
            Expr::Number { value } => write!(f, "{value}"),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    write!(f, "{arg}")?;
                    if i + 1 < args.len() {
                        write!(f, ", ")?;
                    }
                }
                write!(f, ")")
            },
            Expr::Member { object, field } => write!(f, "{object}.{field}"),
            Expr::Index { object, bit } => write!(f, "{object}[{bit}]"),
            Expr::Slice { object, lo, hi } => write!(f, "{object}[{lo}:{hi}]"),
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} = {}", self.target, self.expr)
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "module {}(", self.name)?;
        write_ports(f, &self.inputs)?;
        write!(f, ") -> ")?;
        if let [output] = self.outputs.as_slice() {
            write!(f, "{output}")?;
        } else {
            write!(f, "(")?;
            write_ports(f, &self.outputs)?;
            write!(f, ")")?;
        }
        writeln!(f, ":")?;
        for stmt in &self.statements {
            writeln!(f, "    {stmt}")?;
        }
        Ok(())
    }
}

fn write_ports(f: &mut std::fmt::Formatter, ports: &[Port]) -> std::fmt::Result {
    for (i, port) in ports.iter().enumerate() {
        write!(f, "{port}")?;
        if i + 1 < ports.len() {
            write!(f, ", ")?;
        }
    }
    Ok(())
}
