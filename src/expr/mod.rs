//! Arithmetic expressions over instruments.
//!
//! Grammar (standard precedence, parenthesized grouping, no unary minus,
//! no implicit multiplication):
//!
//! ```text
//! expr   := term (('+'|'-') term)*
//! term   := factor (('*'|'/') factor)*
//! factor := SYMBOL | NUMBER | '(' expr ')'
//! ```

pub mod align;
pub mod eval;

pub use align::{AlignMode, AlignedFrame};
pub use eval::{evaluate, normalize, NormMode};

use crate::error::{AppError, Result};
use crate::models::SymbolToken;

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Leaf(SymbolToken),
    Number(f64),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Distinct leaves in first-appearance order.
    pub fn leaves(&self) -> Vec<SymbolToken> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<SymbolToken>) {
        match self {
            Expr::Leaf(token) => {
                if !out.contains(token) {
                    out.push(token.clone());
                }
            }
            Expr::Number(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_leaves(out);
                rhs.collect_leaves(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Symbol(SymbolToken),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value: f64 = literal.parse().map_err(|_| {
                    AppError::Parse(format!("bad numeric literal '{}' at position {}", literal, start))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() => {
                // Symbol tokens run until an operator, parenthesis or space;
                // the symbol model validates the inside.
                let start = i;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_ascii_alphanumeric() || c == ':' || c == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let token = SymbolToken::parse(&literal)?;
                tokens.push(Token::Symbol(token));
            }
            other => {
                return Err(AppError::Parse(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut node = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.advance();
            let rhs = self.term()?;
            node = Expr::Binary { op, lhs: Box::new(node), rhs: Box::new(rhs) };
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut node = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            _ => None,
        } {
            self.advance();
            let rhs = self.factor()?;
            node = Expr::Binary { op, lhs: Box::new(node), rhs: Box::new(rhs) };
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Symbol(token)) => Ok(Expr::Leaf(token)),
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(AppError::Parse("missing closing parenthesis".into())),
                }
            }
            Some(other) => Err(AppError::Parse(format!("unexpected token {:?}", other))),
            None => Err(AppError::Parse("unexpected end of expression".into())),
        }
    }
}

/// Parse an expression string into its AST.
pub fn parse(input: &str) -> Result<Expr> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::Parse("empty expression".into()));
    }
    let tokens = tokenize(trimmed)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(AppError::Parse(format!(
            "trailing input after position {}",
            parser.pos
        )));
    }
    if ast.leaves().is_empty() {
        return Err(AppError::Parse(
            "expression has no instrument tokens (use e.g. EQ:SPY)".into(),
        ));
    }
    Ok(ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_symbol() {
        let ast = parse("EQ:SPY").unwrap();
        assert_eq!(ast, Expr::Leaf(SymbolToken::parse("EQ:SPY").unwrap()));
    }

    #[test]
    fn precedence_binds_mul_over_add() {
        let ast = parse("EQ:AAPL + EQ:MSFT * 2").unwrap();
        match ast {
            Expr::Binary { op: BinOp::Add, rhs, .. } => match *rhs {
                Expr::Binary { op: BinOp::Mul, .. } => {}
                other => panic!("expected Mul under Add, got {:?}", other),
            },
            other => panic!("expected Add at root, got {:?}", other),
        }
    }

    #[test]
    fn parens_override_precedence() {
        let ast = parse("(EQ:AAPL + EQ:MSFT) / 2").unwrap();
        match ast {
            Expr::Binary { op: BinOp::Div, lhs, .. } => match *lhs {
                Expr::Binary { op: BinOp::Add, .. } => {}
                other => panic!("expected Add under Div, got {:?}", other),
            },
            other => panic!("expected Div at root, got {:?}", other),
        }
    }

    #[test]
    fn ratio_expression() {
        let ast = parse("IX:SPX/IX:RTY").unwrap();
        let leaves = ast.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].to_string(), "IX:SPX");
        assert_eq!(leaves[1].to_string(), "IX:RTY");
    }

    #[test]
    fn repeated_leaf_collected_once() {
        let ast = parse("(IX:ES1 - IX:SPX) / IX:SPX").unwrap();
        assert_eq!(ast.leaves().len(), 2);
    }

    #[test]
    fn zero_minus_replaces_unary_negation() {
        let ast = parse("0 - EQ:SPY").unwrap();
        match ast {
            Expr::Binary { op: BinOp::Sub, lhs, .. } => assert_eq!(*lhs, Expr::Number(0.0)),
            other => panic!("expected Sub, got {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(parse("").is_err());
        assert!(parse("EQ:SPY +").is_err());
        assert!(parse("(EQ:SPY").is_err());
        assert!(parse("EQ:SPY EQ:QQQ").is_err());
        assert!(parse("-EQ:SPY").is_err());
        assert!(parse("2 + 2").is_err()); // no instrument leaf
        assert!(parse("XX:SPY").is_err());
        assert!(parse("EQ:SPY $ 2").is_err());
    }

    #[test]
    fn numbers_parse_with_decimals() {
        let ast = parse("EQ:SPY * 1.5").unwrap();
        match ast {
            Expr::Binary { rhs, .. } => assert_eq!(*rhs, Expr::Number(1.5)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
