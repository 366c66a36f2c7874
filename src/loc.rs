use serde::{Deserialize, Serialize};

/// A [`Pos`] is a line and column in a source text.
/// Both start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Pos {
        Pos { line, column }
    }

    /// The position of the first character of a text.
    pub fn start() -> Pos {
        Pos::new(1, 1)
    }

    /// Advance past `ch`.
    pub(crate) fn advance(&mut self, ch: char) {
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Many objects have location information.
/// [`HasPos`] allows you to call [`HasPos::pos`] to get it.
pub trait HasPos {
    fn pos(&self) -> Pos;
}

#[test]
fn pos_advance() {
    let mut pos = Pos::start();
    for ch in "ab\ncd".chars() {
        pos.advance(ch);
    }
    assert_eq!(pos.to_string(), "2:3".to_string());
}
