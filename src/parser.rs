use super::*;
use crate::ast::*;
use crate::lexer::{Token, TokenKind};

use log::*;

/// Parses a token stream (as produced by [`crate::lexer::lex`]) into modules, in source order.
pub fn parse(tokens: &[Token]) -> Result<Vec<Module>, ParseError> {
    if tokens.is_empty() {
        return Ok(vec![]);
    }
    Parser { tokens, index: 0 }.modules()
}

/// Lexes and parses `source`.
pub fn parse_source(source: &str) -> Result<Vec<Module>, WireError> {
    let tokens = lexer::lex(source)?;
    Ok(parse(&tokens)?)
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &'a Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn next_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.index + 1).map(|token| token.kind)
    }

    fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError {
            message: format!("Expected {expected}, found {token}"),
            pos: token.pos(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&'a Token, ParseError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.error(&kind.to_string()))
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// A line ends with NEWLINE, or with EOF when the text has no final line break.
    fn end_of_line(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            },
            TokenKind::Eof => Ok(()),
            _ => Err(self.error("NEWLINE")),
        }
    }

    fn number(&mut self) -> Result<u64, ParseError> {
        let token = self.expect(TokenKind::Number)?;
        let text = token.value.as_str();
        let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(digits) => u64::from_str_radix(digits, 16),
            None => text.parse::<u64>(),
        };
        value.map_err(|_| ParseError {
            message: format!("Invalid number literal '{text}'"),
            pos: token.pos(),
        })
    }

    fn index_number(&mut self) -> Result<usize, ParseError> {
        let pos = self.peek().pos();
        let value = self.number()?;
        match usize::try_from(value) {
            Ok(index) if index <= MAX_WIDTH => Ok(index),
            _ => Err(ParseError {
                message: format!("Bit index out of range '{value}'"),
                pos,
            }),
        }
    }

    fn modules(&mut self) -> Result<Vec<Module>, ParseError> {
        let mut modules = vec![];
        while self.peek_kind() != TokenKind::Eof {
            let module = self.module()?;
            debug!("Parsed module {} ({} statements)", module.name, module.statements.len());
            modules.push(module);
        }
        Ok(modules)
    }

    fn module(&mut self) -> Result<Module, ParseError> {
        self.expect(TokenKind::Module)?;
        let name = self.expect(TokenKind::Ident)?.value.clone();

        self.expect(TokenKind::LParen)?;
        let inputs = if self.peek_kind() == TokenKind::RParen {
            vec![]
        } else {
            self.ports()?
        };
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::Arrow)?;
        let outputs = if self.eat(TokenKind::LParen) {
            let outputs = if self.peek_kind() == TokenKind::RParen {
                vec![]
            } else {
                self.ports()?
            };
            self.expect(TokenKind::RParen)?;
            outputs
        } else {
            vec![self.port()?]
        };
        self.expect(TokenKind::Colon)?;
        self.end_of_line()?;

        let mut statements = vec![];
        while self.eat(TokenKind::Indent) {
            statements.push(self.statement()?);
            self.end_of_line()?;
        }

        Ok(Module {
            name,
            inputs,
            outputs,
            statements,
        })
    }

    fn ports(&mut self) -> Result<Vec<Port>, ParseError> {
        let mut ports = vec![self.port()?];
        while self.eat(TokenKind::Comma) {
            ports.push(self.port()?);
        }
        Ok(ports)
    }

    fn port(&mut self) -> Result<Port, ParseError> {
        let name = self.expect(TokenKind::Ident)?.value.clone();
        // `-> out:` ends the header, so a colon only starts a width when a number follows
        let width = if self.peek_kind() == TokenKind::Colon && self.next_kind() == Some(TokenKind::Number) {
            self.advance();
            let pos = self.peek().pos();
            let width = self.index_number()?;
            if width == 0 {
                return Err(ParseError {
                    message: "Port width must be at least 1, found '0'".to_string(),
                    pos,
                });
            }
            width
        } else {
            1
        };
        Ok(Port { name, width })
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let name = self.expect(TokenKind::Ident)?.value.clone();
        let range = if self.eat(TokenKind::LBracket) {
            Some(self.bit_range()?)
        } else {
            None
        };
        self.expect(TokenKind::Equals)?;
        let expr = self.expr()?;
        Ok(Statement {
            target: Target { name, range },
            expr,
        })
    }

    /// Parses the remainder of `[i]` or `[lo:hi]` after the opening bracket.
    fn bit_range(&mut self) -> Result<BitRange, ParseError> {
        let lo = self.index_number()?;
        let range = if self.eat(TokenKind::Colon) {
            let hi = self.index_number()?;
            BitRange::Slice { lo, hi }
        } else {
            BitRange::Bit { bit: lo }
        };
        self.expect(TokenKind::RBracket)?;
        Ok(range)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(TokenKind::Dot) {
                let field = self.expect(TokenKind::Ident)?.value.clone();
                expr = Expr::Member { object: Box::new(expr), field };
            } else if self.eat(TokenKind::LBracket) {
                let object = Box::new(expr);
                expr = match self.bit_range()? {
                    BitRange::Bit { bit } => Expr::Index { object, bit },
                    BitRange::Slice { lo, hi } => Expr::Slice { object, lo, hi },
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Ident => {
                if self.next_kind() == Some(TokenKind::LParen) {
                    self.call()
                } else {
                    let name = self.advance().value.clone();
                    Ok(Expr::Identifier { name })
                }
            },
            TokenKind::Number => {
                let value = self.number()?;
                Ok(Expr::Number { value })
            },
            _ => Err(self.error("expression")),
        }
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let name = self.expect(TokenKind::Ident)?.value.clone();
        self.expect(TokenKind::LParen)?;
        let mut args = vec![];
        if self.peek_kind() != TokenKind::RParen {
            args.push(self.expr()?);
            while self.eat(TokenKind::Comma) {
                args.push(self.expr()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Call { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(source: &str) -> Result<Vec<Module>, ParseError> {
        parse(&lexer::lex(source).unwrap())
    }

    #[test]
    fn single_module() {
        let modules = parse_str("module not(a) -> out:\n    out = nand(a, a)\n").unwrap();
        assert_eq!(modules.len(), 1);
        let module = &modules[0];
        assert_eq!(module.name, "not");
        assert_eq!(module.inputs, vec![Port::new("a", 1)]);
        assert_eq!(module.outputs, vec![Port::new("out", 1)]);
        assert_eq!(
            module.statements,
            vec![Statement {
                target: Target { name: "out".to_string(), range: None },
                expr: Expr::call("nand", vec![Expr::ident("a"), Expr::ident("a")]),
            }],
        );
    }

    #[test]
    fn widths_and_multiple_outputs() {
        let source = "module half(a, b:8) -> (sum:8, carry):\n  sum = b\n  carry = a\n";
        let module = &parse_str(source).unwrap()[0];
        assert_eq!(module.inputs, vec![Port::new("a", 1), Port::new("b", 8)]);
        assert_eq!(module.outputs, vec![Port::new("sum", 8), Port::new("carry", 1)]);
        assert_eq!(module.statements.len(), 2);
    }

    #[test]
    fn postfix_chains() {
        let source = "module m(x:8) -> y:\n  y = f(x[0:3], x[7]).out[2]\n";
        let module = &parse_str(source).unwrap()[0];
        let expected = Expr::Index {
            object: Box::new(Expr::Member {
                object: Box::new(Expr::call(
                    "f",
                    vec![
                        Expr::Slice { object: Box::new(Expr::ident("x")), lo: 0, hi: 3 },
                        Expr::Index { object: Box::new(Expr::ident("x")), bit: 7 },
                    ],
                )),
                field: "out".to_string(),
            }),
            bit: 2,
        };
        assert_eq!(module.statements[0].expr, expected);
    }

    #[test]
    fn partial_targets() {
        let source = "module m(a) -> y:4:\n  y[0] = a\n  y[1:3] = 0x7\n";
        let module = &parse_str(source).unwrap()[0];
        assert_eq!(module.statements[0].target.range, Some(BitRange::Bit { bit: 0 }));
        assert_eq!(module.statements[1].target.range, Some(BitRange::Slice { lo: 1, hi: 3 }));
        assert_eq!(module.statements[1].expr, Expr::Number { value: 7 });
    }

    #[test]
    fn modules_in_source_order() {
        let source = "module b(x) -> y:\n  y = x\nmodule a(x) -> y:\n  y = b(x)\n";
        let names: Vec<String> = parse_str(source).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn empty_body_and_no_trailing_newline() {
        let modules = parse_str("module a() -> y:\nmodule b(x) -> y:\n  y = x").unwrap();
        assert_eq!(modules[0].statements.len(), 0);
        assert_eq!(modules[0].inputs.len(), 0);
        assert_eq!(modules[1].statements.len(), 1);
    }

    #[test]
    fn header_colon_after_single_output() {
        let module = &parse_str("module m(a) -> out:\n  out = a\n").unwrap()[0];
        assert_eq!(module.outputs, vec![Port::new("out", 1)]);
        assert_eq!(module.statements.len(), 1);

        let module = &parse_str("module m(a:8) -> out:8:\n  out = a\n").unwrap()[0];
        assert_eq!(module.outputs, vec![Port::new("out", 8)]);
        assert_eq!(module.statements.len(), 1);
    }

    #[test]
    fn indices_are_bounded() {
        let error = parse_str("module m(a:8) -> b:\n  b = a[4000000000]\n").unwrap_err();
        assert_eq!(error.message, "Bit index out of range '4000000000'");
        assert_eq!(error.pos, Pos::new(2, 9));

        let error = parse_str("module m(a:8) -> b:8:\n  b[0:18446744073709551615] = a\n").unwrap_err();
        assert!(error.message.contains("18446744073709551615"), "{}", error.message);

        let module = &parse_str("module m(a:65536) -> b:\n  b = a[65535]\n").unwrap()[0];
        assert_eq!(module.inputs, vec![Port::new("a", MAX_WIDTH)]);
    }

    #[test]
    fn expected_found() {
        let error = parse_str("module m(a -> b:\n  b = a\n").unwrap_err();
        assert!(error.message.contains("Expected RPAREN"), "{}", error.message);
        assert!(error.message.contains("ARROW '->'"), "{}", error.message);
        assert_eq!(error.pos, Pos::new(1, 12));
    }

    #[test]
    fn missing_expression() {
        let error = parse_str("module m(a) -> b:\n  b = \n").unwrap_err();
        assert!(error.message.contains("Expected expression, found NEWLINE"), "{}", error.message);
        assert_eq!(error.pos.line, 2);
    }

    #[test]
    fn unindented_statement() {
        let error = parse_str("module m(a) -> b:\nb = a\n").unwrap_err();
        assert!(error.message.contains("Expected MODULE, found IDENT 'b'"), "{}", error.message);
    }

    #[test]
    fn bare_hex_prefix_is_rejected() {
        let error = parse_str("module m(a) -> b:\n  b = 0x\n").unwrap_err();
        assert!(error.message.contains("'0x'"), "{}", error.message);
        assert_eq!(error.pos, Pos::new(2, 7));
    }

    #[test]
    fn regenerated_source_round_trips() {
        let source = "module add(a:8, b:8) -> (sum:8, carry):\n  t = half(a[0], b[0])\n  sum[0] = t.sum\n  carry = t.carry\n  sum[1:7] = 0\n";
        let modules = parse_str(source).unwrap();
        let text = modules[0].to_string();
        assert_eq!(parse_str(&text).unwrap(), modules);
    }
}
