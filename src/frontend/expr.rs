//! 整数表达式的语法分析

use super::ast::{BinaryOp, Call, Expr, UnaryOp};
use super::lexer::TokenKind;
use super::parser::{PResult, Parser};

/// Binary operator levels, lowest precedence first.
const LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[
        ("and", BinaryOp::And),
        ("or", BinaryOp::Or),
        ("&&", BinaryOp::And),
        ("||", BinaryOp::Or),
    ],
    &[
        ("==", BinaryOp::Eq),
        ("!=", BinaryOp::Ne),
        ("<", BinaryOp::Lt),
        ("<=", BinaryOp::Le),
        (">", BinaryOp::Gt),
        (">=", BinaryOp::Ge),
    ],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("//", BinaryOp::FloorDiv),
        ("%", BinaryOp::Mod),
    ],
];

const KEYWORDS: &[&str] = &["and", "or", "not"];

impl Parser<'_> {
    /// 整数表达式。
    pub fn expression(&mut self) -> PResult<Expr> {
        self.attempt(|p| p.binary(0))
    }

    fn binary(&mut self, level: usize) -> PResult<Expr> {
        let operand = |p: &mut Self| {
            if level + 1 < LEVELS.len() {
                p.binary(level + 1)
            } else {
                p.unary()
            }
        };

        let mut left = operand(self)?;
        while let Ok((op, right)) = self.attempt(|p| {
            let op = p.binary_op(level)?;
            let right = operand(p)?;
            Ok((op, right))
        }) {
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_op(&mut self, level: usize) -> PResult<BinaryOp> {
        let token = self.peek();
        if matches!(token.kind, TokenKind::Operator | TokenKind::Word) {
            if let Some((_, op)) = LEVELS[level].iter().find(|(l, _)| *l == token.literal) {
                let op = *op;
                self.attempt(|p| match token.kind {
                    TokenKind::Word => p.expect_keyword(&token.literal),
                    _ => p.expect_operator(&token.literal),
                })?;
                return Ok(op);
            }
        }
        Err(self.fail("operator"))
    }

    fn unary(&mut self) -> PResult<Expr> {
        let prefixed = self.attempt(|p| {
            let token = p.peek();
            let op = match (token.kind, token.literal.as_str()) {
                (TokenKind::Operator, "!") => UnaryOp::Not,
                (TokenKind::Word, "not") => UnaryOp::Not,
                (TokenKind::Operator, "-") => UnaryOp::Neg,
                _ => return Err(p.fail("expression")),
            };
            match token.kind {
                TokenKind::Word => p.expect_keyword("not")?,
                _ => p.expect_operator(&token.literal)?,
            }
            let operand = p.unary()?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            })
        });
        match prefixed {
            Ok(expr) => Ok(expr),
            Err(_) => self.core(),
        }
    }

    /// 调用 `name(args)`。
    pub(crate) fn call(&mut self) -> PResult<Call> {
        self.attempt(|p| {
            let name = p.expect_word()?;
            p.expect_symbol("(")?;
            let args = p.separated(|p| p.expression()).unwrap_or_default();
            p.expect_symbol(")")?;
            Ok(Call { name, args })
        })
    }

    fn variable(&mut self) -> PResult<Expr> {
        self.attempt(|p| {
            let name = p.expect_word()?;
            if KEYWORDS.contains(&name.as_str()) {
                return Err(p.fail("variable"));
            }
            if let Ok(field) = p.attempt(|p| {
                p.expect_operator(".")?;
                p.expect_word()
            }) {
                return Ok(Expr::Variable {
                    name,
                    field: Some(field),
                });
            }
            let indices = p.many(|p| {
                p.expect_symbol("[")?;
                let index = p.expression()?;
                p.expect_symbol("]")?;
                Ok(index)
            });
            if indices.is_empty() {
                Ok(Expr::Variable { name, field: None })
            } else {
                Ok(Expr::Indexed { name, indices })
            }
        })
    }

    fn core(&mut self) -> PResult<Expr> {
        if let Ok(call) = self.call() {
            return Ok(Expr::Call(call));
        }
        if let Ok(value) = self.expect_integer() {
            return Ok(Expr::Literal(value));
        }
        if let Ok(variable) = self.variable() {
            return Ok(variable);
        }
        self.attempt(|p| {
            p.expect_symbol("(")?;
            let expr = p.expression()?;
            p.expect_symbol(")")?;
            Ok(expr)
        })
        .map_err(|_| self.fail("expression"))
    }
}
