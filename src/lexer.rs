//! Turns Wire source text into a stream of [`Token`]s.
//!
//! The lexer is line-aware only inside a module's body.
//! A body starts after the colon which ends a module header
//! and runs until the next `module` keyword (or the end of the text).
//! Inside a body, every non-blank line yields an optional [`TokenKind::Indent`]
//! carrying its raw leading whitespace and a closing [`TokenKind::Newline`].
//! Everywhere else, whitespace and line breaks are insignificant.
use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Module,
    Arrow,
    Colon,
    Equals,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Newline,
    Indent,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            TokenKind::Ident => "IDENT",
            TokenKind::Number => "NUMBER",
            TokenKind::Module => "MODULE",
            TokenKind::Arrow => "ARROW",
            TokenKind::Colon => "COLON",
            TokenKind::Equals => "EQUALS",
            TokenKind::Comma => "COMMA",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::Dot => "DOT",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Indent => "INDENT",
            TokenKind::Eof => "EOF",
        };
        write!(f, "{name}")
    }
}

/// A single token. `line` and `column` locate its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, pos: Pos) -> Token {
        Token {
            kind,
            value: value.into(),
            line: pos.line,
            column: pos.column,
        }
    }
}

impl HasPos for Token {
    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.kind {
            TokenKind::Newline | TokenKind::Eof => write!(f, "{}", self.kind),
            TokenKind::Indent => write!(f, "{} {:?}", self.kind, self.value),
            _ => write!(f, "{} '{}'", self.kind, self.value),
        }
    }
}

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

#[derive(Debug, Default)]
struct Header {
    active: bool,
    depth: usize,
    seen_arrow: bool,
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    pos: Pos,
    tokens: Vec<Token>,
    header: Header,
    // the header's trailing colon has been seen; the body starts at the next line break
    body_pending: bool,
    in_body: bool,
    at_line_start: bool,
}

impl Lexer {
    fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            index: 0,
            pos: Pos::start(),
            tokens: vec![],
            header: Header::default(),
            body_pending: false,
            in_body: false,
            at_line_start: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.index += 1;
        self.pos.advance(ch);
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>, pos: Pos) {
        self.tokens.push(Token::new(kind, value, pos));
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            if self.in_body && self.at_line_start {
                self.at_line_start = false;
                if !self.line_start() {
                    continue;
                }
            }

            let Some(ch) = self.peek() else { break };
            let pos = self.pos;

            match ch {
                '\n' => {
                    self.bump();
                    if self.body_pending {
                        self.body_pending = false;
                        self.in_body = true;
                    }
                    if self.in_body {
                        self.push(TokenKind::Newline, "\n", pos);
                        self.at_line_start = true;
                    }
                },
                ' ' | '\t' => {
                    self.bump();
                },
                ';' => self.skip_comment(),
                'A'..='Z' | 'a'..='z' | '_' => self.ident(),
                '0'..='9' => self.number(),
                '-' => {
                    if self.peek_at(1) == Some('>') {
                        self.bump();
                        self.bump();
                        if self.header.active && self.header.depth == 0 {
                            self.header.seen_arrow = true;
                        }
                        self.push(TokenKind::Arrow, "->", pos);
                    } else {
                        return Err(LexError::unexpected(ch, pos));
                    }
                },
                ':' => {
                    self.bump();
                    self.push(TokenKind::Colon, ":", pos);
                    if self.header.active && self.header.depth == 0 && self.header.seen_arrow && self.rest_of_line_is_blank() {
                        self.header = Header::default();
                        self.body_pending = true;
                    }
                },
                '(' => {
                    self.bump();
                    if self.header.active {
                        self.header.depth += 1;
                    }
                    self.push(TokenKind::LParen, "(", pos);
                },
                ')' => {
                    self.bump();
                    if self.header.active {
                        self.header.depth = self.header.depth.saturating_sub(1);
                    }
                    self.push(TokenKind::RParen, ")", pos);
                },
                '=' => self.single(TokenKind::Equals, ch),
                ',' => self.single(TokenKind::Comma, ch),
                '[' => self.single(TokenKind::LBracket, ch),
                ']' => self.single(TokenKind::RBracket, ch),
                '.' => self.single(TokenKind::Dot, ch),
                _ => return Err(LexError::unexpected(ch, pos)),
            }
        }

        let pos = self.pos;
        self.push(TokenKind::Eof, "", pos);
        Ok(self.tokens)
    }

    /// Handles the leading whitespace of a body line.
    /// Returns `false` when the line was blank or comment-only and has been consumed.
    fn line_start(&mut self) -> bool {
        let pos = self.pos;
        let mut indent = String::new();
        while let Some(ch @ (' ' | '\t')) = self.peek() {
            indent.push(ch);
            self.bump();
        }

        match self.peek() {
            None => false,
            Some('\n') => {
                self.bump();
                self.at_line_start = true;
                false
            },
            Some(';') => {
                self.skip_comment();
                if self.bump().is_some() {
                    self.at_line_start = true;
                }
                false
            },
            Some(_) => {
                if !indent.is_empty() {
                    self.push(TokenKind::Indent, indent, pos);
                }
                true
            },
        }
    }

    fn rest_of_line_is_blank(&self) -> bool {
        for ch in &self.chars[self.index..] {
            match ch {
                ' ' | '\t' => continue,
                '\n' | ';' => return true,
                _ => return false,
            }
        }
        true
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn single(&mut self, kind: TokenKind, ch: char) {
        let pos = self.pos;
        self.bump();
        self.push(kind, ch.to_string(), pos);
    }

    fn ident(&mut self) {
        let pos = self.pos;
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }

        if text == "module" {
            self.in_body = false;
            self.body_pending = false;
            self.header = Header { active: true, ..Header::default() };
            self.push(TokenKind::Module, text, pos);
        } else {
            self.push(TokenKind::Ident, text, pos);
        }
    }

    fn number(&mut self) {
        let pos = self.pos;
        let mut text = String::new();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            text.extend(self.bump());
            text.extend(self.bump());
            while let Some(ch) = self.peek() {
                if ch.is_ascii_hexdigit() {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        } else {
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.push(TokenKind::Number, text, pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().iter().map(|token| token.kind).collect()
    }

    #[test]
    fn header_and_body() {
        use TokenKind::*;
        let source = "module not(a) -> out:\n    out = nand(a, a)\n";
        assert_eq!(
            kinds(source),
            vec![
                Module, Ident, LParen, Ident, RParen, Arrow, Ident, Colon, Newline,
                Indent, Ident, Equals, Ident, LParen, Ident, Comma, Ident, RParen, Newline,
                Eof,
            ],
        );
    }

    #[test]
    fn positions() {
        let tokens = lex("module x() -> y:\n  y = 1\n").unwrap();
        let indent = &tokens[8];
        assert_eq!(indent.kind, TokenKind::Indent);
        assert_eq!((indent.line, indent.column), (2, 1));
        assert_eq!(indent.value, "  ");

        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!((eof.line, eof.column), (3, 1));
    }

    #[test]
    fn keyword_is_exact() {
        let tokens = lex("modules Module module").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[2].kind, TokenKind::Module);
    }

    #[test]
    fn numbers() {
        let tokens = lex("42 0xFe 0X1 0x").unwrap();
        let values: Vec<&str> = tokens.iter().map(|token| token.value.as_str()).collect();
        assert_eq!(values, vec!["42", "0xFe", "0X1", "0x", ""]);
        assert!(tokens[..4].iter().all(|token| token.kind == TokenKind::Number));
    }

    #[test]
    fn no_layout_outside_body() {
        use TokenKind::*;
        assert_eq!(kinds("a\n  b\n\n c"), vec![Ident, Ident, Ident, Eof]);
    }

    #[test]
    fn blank_and_comment_lines_in_body() {
        use TokenKind::*;
        let source = "module m(a) -> b: ; header\n\n   ; only a comment\n\tb = a ; trailing\n";
        assert_eq!(
            kinds(source),
            vec![
                Module, Ident, LParen, Ident, RParen, Arrow, Ident, Colon, Newline,
                Indent, Ident, Equals, Ident, Newline,
                Eof,
            ],
        );
        let tokens = lex(source).unwrap();
        assert_eq!(tokens[9].value, "\t");
    }

    #[test]
    fn body_ends_at_next_module() {
        use TokenKind::*;
        let source = "module a(x) -> y:\n  y = x\n\nmodule b(x) -> y:\n  y = a(x)";
        let tokens = kinds(source);
        assert_eq!(tokens.iter().filter(|kind| **kind == Module).count(), 2);
        assert_eq!(tokens.iter().filter(|kind| **kind == Indent).count(), 2);
        assert_eq!(tokens.last(), Some(&Eof));
        assert_eq!(tokens[tokens.len() - 2], RParen);
    }

    #[test]
    fn port_colons_do_not_open_body() {
        use TokenKind::*;
        let source = "module r(d:8, clk) -> q:8:\n  q = dff(d, clk)\n";
        let tokens = kinds(source);
        assert_eq!(tokens.iter().filter(|kind| **kind == Newline).count(), 2);
        assert_eq!(tokens[11], Colon);
        assert_eq!(tokens[13], Colon);
        assert_eq!(tokens[14], Newline);
    }

    #[test]
    fn unexpected_character() {
        let error = lex("module m(a) -> b:\n  b = a + a\n").unwrap_err();
        assert!(error.message.contains("'+'"));
        assert_eq!(error.pos, Pos::new(2, 9));
    }

    #[test]
    fn carriage_return_is_an_error() {
        let error = lex("module m(a) -> b:\r\n").unwrap_err();
        assert!(error.message.contains("\\r"));
        assert_eq!(error.pos, Pos::new(1, 18));
    }

    #[test]
    fn lone_minus() {
        let error = lex("a - b").unwrap_err();
        assert!(error.message.contains("'-'"));
        assert_eq!(error.pos, Pos::new(1, 3));
    }
}
