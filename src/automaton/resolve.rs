//! 宏与常量的展开。

use super::{Letter, Pattern};
use crate::frontend::ast::{self, BinaryOp, Call, Expr, Precondition, Regex};
use crate::runtime::eval::{apply_binary, apply_unary, EvalError, Evaluator, Scope};
use crate::runtime::{Definitions, Variables};

/// 把带宏调用的走法正则表达式展开为 `Pattern`。
///
/// 宏按值调用：调用处实参先求值，再绑定到宏体的作用域中。
pub struct Resolver<'a> {
    definitions: &'a Definitions,
    evaluator: Evaluator<'a>,
}

impl<'a> Resolver<'a> {
    /// 创建一个新的 `Resolver`，偏移可引用 `variables` 中的初值。
    pub fn new(definitions: &'a Definitions, variables: &'a Variables) -> Self {
        Self {
            definitions,
            evaluator: Evaluator::new(definitions, variables),
        }
    }

    /// 展开一条走法。
    pub fn compile(&self, regex: &Regex) -> Result<Pattern, EvalError> {
        self.resolve(regex, &Scope::root())
    }

    fn resolve(&self, regex: &Regex, scope: &Scope) -> Result<Pattern, EvalError> {
        let boxed = |regex: &Regex| self.resolve(regex, scope).map(Box::new);
        Ok(match regex {
            Regex::Letter(letter) => Pattern::Letter(self.letter(letter, scope)?),
            Regex::Concat(left, right) => Pattern::Concat(boxed(left)?, boxed(right)?),
            Regex::Union(left, right) => Pattern::Union(boxed(left)?, boxed(right)?),
            Regex::Star(inner) => Pattern::Star(boxed(inner)?),
            Regex::Plus(inner) => Pattern::Plus(boxed(inner)?),
            Regex::Optional(inner) => Pattern::Optional(boxed(inner)?),
            Regex::MacroCall(call) => return self.expand(call, scope),
        })
    }

    fn expand(&self, call: &Call, scope: &Scope) -> Result<Pattern, EvalError> {
        let definition = self
            .definitions
            .macros
            .get(&call.name)
            .ok_or_else(|| EvalError::Undefined {
                kind: "macro",
                name: call.name.clone(),
            })?;
        if definition.params.len() != call.args.len() {
            return Err(EvalError::Arity {
                name: call.name.clone(),
                expected: definition.params.len(),
                found: call.args.len(),
            });
        }
        let args = call
            .args
            .iter()
            .map(|arg| self.evaluator.evaluate(arg, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let inner = scope.child(definition.params.iter().map(String::as_str).zip(args).collect());
        self.resolve(&definition.body, &inner)
    }

    fn letter(&self, letter: &ast::Letter, scope: &Scope) -> Result<Letter, EvalError> {
        let precondition = match &letter.precondition {
            Precondition::Named(name) => Expr::variable(name.as_str()),
            Precondition::Call(call) => Expr::Call(call.clone()),
        };
        Ok(Letter {
            dx: self.evaluator.evaluate(&letter.dx, scope)?,
            dy: self.evaluator.evaluate(&letter.dy, scope)?,
            precondition: fold(&precondition, scope)?,
            effect: letter
                .effect
                .as_ref()
                .map(|call| fold_call(call, scope))
                .transpose()?,
        })
    }
}

fn fold_call(call: &Call, scope: &Scope) -> Result<Call, EvalError> {
    Ok(Call {
        name: call.name.clone(),
        args: call
            .args
            .iter()
            .map(|arg| fold(arg, scope))
            .collect::<Result<_, _>>()?,
    })
}

/// 代入作用域中的名称并折叠常量子表达式。
pub fn fold(expr: &Expr, scope: &Scope) -> Result<Expr, EvalError> {
    Ok(match expr {
        Expr::Variable { name, field: None } => match scope.lookup(name) {
            Some(value) => Expr::Literal(value),
            None => expr.clone(),
        },
        Expr::Literal(_) | Expr::Variable { .. } => expr.clone(),
        Expr::Indexed { name, indices } => Expr::Indexed {
            name: name.clone(),
            indices: indices
                .iter()
                .map(|index| fold(index, scope))
                .collect::<Result<_, _>>()?,
        },
        Expr::Binary { op, left, right } => match (*op, fold(left, scope)?) {
            // decided by the left operand, the right one is never evaluated
            (BinaryOp::And, Expr::Literal(0)) => Expr::Literal(0),
            (BinaryOp::Or, Expr::Literal(value)) if value != 0 => Expr::Literal(1),
            (op, Expr::Literal(left)) => match fold(right, scope)? {
                Expr::Literal(right) => Expr::Literal(apply_binary(op, left, right)?),
                right => Expr::Binary {
                    op,
                    left: Box::new(Expr::Literal(left)),
                    right: Box::new(right),
                },
            },
            (op, left) => Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(fold(right, scope)?),
            },
        },
        Expr::Unary { op, operand } => match fold(operand, scope)? {
            Expr::Literal(value) => Expr::Literal(apply_unary(*op, value)?),
            operand => Expr::Unary {
                op: *op,
                operand: Box::new(operand),
            },
        },
        Expr::Call(call) => Expr::Call(fold_call(call, scope)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{parse_expression, parse_regex};
    use crate::runtime::Value;

    /// `(name, "p1, p2", body)`
    fn definitions(macros: &[(&str, &str, &str)]) -> Definitions {
        let mut definitions = Definitions::default();
        for (name, params, body) in macros {
            definitions.macros.insert(
                name.to_string(),
                ast::Macro {
                    name: name.to_string(),
                    params: params
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect(),
                    body: parse_regex(body).unwrap(),
                },
            );
        }
        definitions
    }

    fn letter(dx: i64, dy: i64, precondition: &str) -> Pattern {
        Pattern::Letter(Letter {
            dx,
            dy,
            precondition: parse_expression(precondition).unwrap(),
            effect: None,
        })
    }

    #[test]
    fn macro_expansion_matches_inline_letter() {
        let definitions = definitions(&[("M", "a", "(a, 0, empty)")]);
        let variables = Variables::new();
        let resolver = Resolver::new(&definitions, &variables);
        assert_eq!(
            resolver.compile(&parse_regex("M(1)").unwrap()),
            resolver.compile(&parse_regex("(1, 0, empty)").unwrap()),
        );
        assert_eq!(
            resolver.compile(&parse_regex("M(1)").unwrap()),
            Ok(letter(1, 0, "empty"))
        );
    }

    #[test]
    fn nested_macros_bind_by_value() {
        let definitions = definitions(&[
            ("Step", "dx, dy", "(dx, dy, empty)"),
            ("Slide", "d", "Step(d, d * 2)*"),
        ]);
        let variables = Variables::new();
        let resolver = Resolver::new(&definitions, &variables);
        assert_eq!(
            resolver.compile(&parse_regex("Slide(1 + 1)").unwrap()),
            Ok(Pattern::Star(Box::new(letter(2, 4, "empty"))))
        );
    }

    #[test]
    fn offsets_read_declared_variables() {
        let definitions = Definitions::default();
        let variables = Variables::from([("dir".to_string(), Value::Int(-1))]);
        let resolver = Resolver::new(&definitions, &variables);
        assert_eq!(
            resolver.compile(&parse_regex("(0, dir, empty)").unwrap()),
            Ok(letter(0, -1, "empty"))
        );
    }

    #[test]
    fn arguments_are_folded_but_runtime_names_stay() {
        let definitions = definitions(&[("M", "k", "(0, 1, far(k + 1, this.y)){mark(k * 3)}")]);
        let variables = Variables::new();
        let resolver = Resolver::new(&definitions, &variables);
        let Ok(Pattern::Letter(letter)) = resolver.compile(&parse_regex("M(2)").unwrap()) else {
            panic!("expected a letter");
        };
        assert_eq!(
            letter.precondition,
            parse_expression("far(3, this.y)").unwrap()
        );
        assert_eq!(
            letter.effect,
            Some(Call {
                name: "mark".into(),
                args: vec![Expr::Literal(6)],
            })
        );
    }

    #[test]
    fn folding_short_circuits_like_evaluation() {
        let scope = Scope::root();
        let fold_str = |s| fold(&parse_expression(s).unwrap(), &scope);
        assert_eq!(fold_str("0 and 1 / 0"), Ok(Expr::Literal(0)));
        assert_eq!(fold_str("2 or 1 / 0"), Ok(Expr::Literal(1)));
        assert_eq!(fold_str("1 and 2"), Ok(Expr::Literal(1)));
        assert_eq!(fold_str("1 / 0 and 0"), Err(EvalError::DivisionByZero));
        assert_eq!(
            fold_str("0 or empty"),
            Ok(parse_expression("0 or empty").unwrap())
        );

        let definitions = definitions(&[("M", "k", "(1, 0, p(k and 1 / k))")]);
        let variables = Variables::new();
        let resolver = Resolver::new(&definitions, &variables);
        let Ok(Pattern::Letter(letter)) = resolver.compile(&parse_regex("M(0)").unwrap()) else {
            panic!("expected a letter");
        };
        assert_eq!(letter.precondition, parse_expression("p(0)").unwrap());
    }

    #[test]
    fn macro_errors() {
        let definitions = definitions(&[("M", "a", "(a, 0, empty)")]);
        let variables = Variables::new();
        let resolver = Resolver::new(&definitions, &variables);
        assert_eq!(
            resolver.compile(&parse_regex("N(1)").unwrap()),
            Err(EvalError::Undefined {
                kind: "macro",
                name: "N".into()
            })
        );
        assert_eq!(
            resolver.compile(&parse_regex("M()").unwrap()),
            Err(EvalError::Arity {
                name: "M".into(),
                expected: 1,
                found: 0
            })
        );
    }

    #[test]
    fn offsets_cannot_depend_on_the_board() {
        let definitions = Definitions::default();
        let variables = Variables::new();
        let resolver = Resolver::new(&definitions, &variables);
        assert_eq!(
            resolver.compile(&parse_regex("(this.x, 0, empty)").unwrap()),
            Err(EvalError::NoTile("this.x".into()))
        );
    }
}
