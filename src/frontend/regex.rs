//! 走法正则表达式的语法分析

use super::ast::{Letter, Precondition, Regex};
use super::lexer::TokenKind;
use super::parser::{PResult, Parser};

impl Parser<'_> {
    /// `Concat ('|' Regex)?`
    pub fn regex(&mut self) -> PResult<Regex> {
        self.attempt(|p| {
            let left = p.concat()?;
            match p.attempt(|p| {
                p.expect_operator("|")?;
                p.regex()
            }) {
                Ok(right) => Ok(Regex::Union(Box::new(left), Box::new(right))),
                Err(_) => Ok(left),
            }
        })
    }

    /// `Unary+`, folded to the right.
    fn concat(&mut self) -> PResult<Regex> {
        self.attempt(|p| {
            let first = p.postfix()?;
            let rest = p.many(|p| p.postfix());
            let tail = rest
                .into_iter()
                .rev()
                .reduce(|right, left| Regex::Concat(Box::new(left), Box::new(right)));
            Ok(match tail {
                Some(tail) => Regex::Concat(Box::new(first), Box::new(tail)),
                None => first,
            })
        })
    }

    /// `Core ('*' | '+' | '?')?`
    fn postfix(&mut self) -> PResult<Regex> {
        self.attempt(|p| {
            let core = p.term()?;
            let token = p.peek();
            if token.kind != TokenKind::Operator {
                return Ok(core);
            }
            let wrap: fn(Box<Regex>) -> Regex = match token.literal.as_str() {
                "*" => Regex::Star,
                "+" => Regex::Plus,
                "?" => Regex::Optional,
                _ => return Ok(core),
            };
            p.expect_operator(&token.literal)?;
            Ok(wrap(Box::new(core)))
        })
    }

    /// `MacroCall | '(' Regex ')' | Letter`
    fn term(&mut self) -> PResult<Regex> {
        if let Ok(call) = self.call() {
            return Ok(Regex::MacroCall(call));
        }
        if let Ok(group) = self.attempt(|p| {
            p.expect_symbol("(")?;
            let inner = p.regex()?;
            p.expect_symbol(")")?;
            Ok(inner)
        }) {
            return Ok(group);
        }
        self.letter().map(Regex::Letter)
    }

    /// `'(' expr ',' expr ',' (Call | Word) ')' ('{' Call '}')?`
    fn letter(&mut self) -> PResult<Letter> {
        self.attempt(|p| {
            p.expect_symbol("(")?;
            let dx = p.expression()?;
            p.expect_delimiter()?;
            let dy = p.expression()?;
            p.expect_delimiter()?;
            let precondition = match p.call() {
                Ok(call) => Precondition::Call(call),
                Err(_) => Precondition::Named(p.expect_word()?),
            };
            p.expect_symbol(")")?;
            let effect = p
                .attempt(|p| {
                    p.expect_symbol("{")?;
                    let call = p.call()?;
                    p.expect_symbol("}")?;
                    Ok(call)
                })
                .ok();
            Ok(Letter {
                dx,
                dy,
                precondition,
                effect,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::ast::{Call, Expr};
    use super::super::parse_regex;
    use super::*;

    fn letter(dx: i64, dy: i64, pre: &str) -> Regex {
        Regex::Letter(Letter {
            dx: Expr::Literal(dx),
            dy: Expr::Literal(dy),
            precondition: Precondition::Named(pre.into()),
            effect: None,
        })
    }

    #[test]
    fn concat_is_right_folded() {
        let regex = parse_regex("(1,0,empty)(0,1,empty)(1,1,enemy)").unwrap();
        assert_eq!(
            regex,
            Regex::Concat(
                Box::new(letter(1, 0, "empty")),
                Box::new(Regex::Concat(
                    Box::new(letter(0, 1, "empty")),
                    Box::new(letter(1, 1, "enemy")),
                )),
            )
        );
    }

    #[test]
    fn union_binds_loosest() {
        let regex = parse_regex("(1,0,empty)* | (0,1,true)?").unwrap();
        assert_eq!(
            regex,
            Regex::Union(
                Box::new(Regex::Star(Box::new(letter(1, 0, "empty")))),
                Box::new(Regex::Optional(Box::new(letter(0, 1, "true")))),
            )
        );
    }

    #[test]
    fn groups_and_plus() {
        let regex = parse_regex("((1,0,empty)(0,1,empty))+").unwrap();
        let Regex::Plus(inner) = regex else {
            panic!("expected plus");
        };
        assert!(matches!(*inner, Regex::Concat(..)));
    }

    #[test]
    fn macro_call_is_tried_first() {
        assert_eq!(
            parse_regex("Slide(1, -1)").unwrap(),
            Regex::MacroCall(Call {
                name: "Slide".into(),
                args: vec![
                    Expr::Literal(1),
                    Expr::Unary {
                        op: crate::frontend::ast::UnaryOp::Neg,
                        operand: Box::new(Expr::Literal(1)),
                    },
                ],
            })
        );
    }

    #[test]
    fn call_precondition_and_effect() {
        let Regex::Letter(letter) =
            parse_regex("(0, 1, inRange(this.y + 1)){promote(1)}").unwrap()
        else {
            panic!("expected letter");
        };
        let Precondition::Call(call) = letter.precondition else {
            panic!("expected call precondition");
        };
        assert_eq!(call.name, "inRange");
        assert_eq!(letter.effect.unwrap().name, "promote");
    }

    #[test]
    fn parenthesised_offsets() {
        let Regex::Letter(letter) = parse_regex("((1 + 1), 0, empty)").unwrap() else {
            panic!("expected letter");
        };
        assert!(matches!(letter.dx, Expr::Binary { .. }));
    }

    #[test]
    fn incomplete_letter_fails() {
        assert!(parse_regex("(1, 0)").is_err());
    }
}
