//! 整数表达式求值与副作用执行

use std::collections::BTreeMap;

use thiserror::Error;

use super::{Board, Definitions, PieceId, PlayerId, Value, Variables};
use crate::frontend::ast::{Assignment, BinaryOp, Call, Expr, Predicate, UnaryOp};
use crate::frontend::check::BUILTINS;

/// 求值错误。
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("`{name}` has no field `{field}`")]
    NoField { name: String, field: String },

    #[error("`{0}` cannot be indexed")]
    NotIndexable(String),

    #[error("`{name}` has no entry {index}")]
    MissingKey { name: String, index: i64 },

    #[error("`{0}` is a map, not an integer")]
    NotAnInteger(String),

    #[error("`Board` takes exactly 2 indices, but {0} given")]
    BoardIndex(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("undefined {kind} `{name}`")]
    Undefined { kind: &'static str, name: String },

    #[error("`{name}` expects {expected} argument(s), but {found} given")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("{kind} `{name}` cannot be used in an integer expression")]
    NotAnExpression { kind: &'static str, name: String },

    #[error("`{0}` needs a board tile to be evaluated")]
    NoTile(String),

    #[error("`{0}` needs an acting player to be evaluated")]
    NoPlayer(String),

    #[error("the board is not available here")]
    NoBoard,

    #[error("tile ({x}, {y}) is outside the board")]
    OutOfBoard { x: i64, y: i64 },

    #[error("{0} is not a piece")]
    NotAPiece(i64),
}

type Result<T> = std::result::Result<T, EvalError>;

/// 求值上下文：`this` 所指的格子与行动玩家。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalContext {
    /// 当前格子
    pub tile: Option<(i64, i64)>,
    /// 行动玩家
    pub player: Option<PlayerId>,
}

impl EvalContext {
    /// 位于 `(x, y)`，由 `player` 行动。
    pub fn at(x: i64, y: i64, player: PlayerId) -> Self {
        Self {
            tile: Some((x, y)),
            player: Some(player),
        }
    }

    /// 不在任何格子上，由 `player` 行动。
    pub fn player(player: PlayerId) -> Self {
        Self {
            tile: None,
            player: Some(player),
        }
    }
}

/// 实参作用域链。内层遮蔽外层，返回时自然恢复。
#[derive(Debug, Default)]
pub struct Scope<'a> {
    bindings: Vec<(&'a str, i64)>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// 空作用域
    pub fn root() -> Self {
        Self::default()
    }

    /// 以给定绑定创建作用域。
    pub fn new(bindings: Vec<(&'a str, i64)>) -> Self {
        Self {
            bindings,
            parent: None,
        }
    }

    /// 在当前作用域之上叠加一层。
    pub fn child(&'a self, bindings: Vec<(&'a str, i64)>) -> Scope<'a> {
        Scope {
            bindings,
            parent: Some(self),
        }
    }

    /// 查找名称，内层优先。
    pub fn lookup(&self, name: &str) -> Option<i64> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|&(_, value)| value)
            .or_else(|| self.parent.and_then(|p| p.lookup(name)))
    }
}

/// 二元运算。
pub fn apply_binary(op: BinaryOp, left: i64, right: i64) -> Result<i64> {
    let value = match op {
        BinaryOp::And => i64::from(left != 0 && right != 0),
        BinaryOp::Or => i64::from(left != 0 || right != 0),
        BinaryOp::Eq => i64::from(left == right),
        BinaryOp::Ne => i64::from(left != right),
        BinaryOp::Lt => i64::from(left < right),
        BinaryOp::Le => i64::from(left <= right),
        BinaryOp::Gt => i64::from(left > right),
        BinaryOp::Ge => i64::from(left >= right),
        BinaryOp::Add => left.checked_add(right).ok_or(EvalError::Overflow)?,
        BinaryOp::Sub => left.checked_sub(right).ok_or(EvalError::Overflow)?,
        BinaryOp::Mul => left.checked_mul(right).ok_or(EvalError::Overflow)?,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if right == 0 => {
            return Err(EvalError::DivisionByZero)
        }
        BinaryOp::Div => left.checked_div(right).ok_or(EvalError::Overflow)?,
        BinaryOp::FloorDiv => {
            let quotient = left.checked_div(right).ok_or(EvalError::Overflow)?;
            if quotient * right != left && (left < 0) != (right < 0) {
                quotient - 1
            } else {
                quotient
            }
        }
        BinaryOp::Mod => {
            let remainder = left.checked_rem(right).ok_or(EvalError::Overflow)?;
            if remainder != 0 && (remainder < 0) != (right < 0) {
                remainder + right
            } else {
                remainder
            }
        }
    };
    Ok(value)
}

/// 一元运算。
pub fn apply_unary(op: UnaryOp, operand: i64) -> Result<i64> {
    match op {
        UnaryOp::Not => Ok(i64::from(operand == 0)),
        UnaryOp::Neg => operand.checked_neg().ok_or(EvalError::Overflow),
    }
}

/// 整数表达式求值器。
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    definitions: &'a Definitions,
    variables: &'a Variables,
    board: Option<&'a Board>,
    context: EvalContext,
}

impl<'a> Evaluator<'a> {
    /// 创建一个不绑定棋盘的求值器。
    pub fn new(definitions: &'a Definitions, variables: &'a Variables) -> Self {
        Self {
            definitions,
            variables,
            board: None,
            context: EvalContext::default(),
        }
    }

    /// 绑定棋盘。
    pub fn with_board(self, board: &'a Board) -> Self {
        Self {
            board: Some(board),
            ..self
        }
    }

    /// 设置求值上下文。
    pub fn with_context(self, context: EvalContext) -> Self {
        Self { context, ..self }
    }

    /// 求值。
    pub fn evaluate(&self, expr: &Expr, scope: &Scope) -> Result<i64> {
        match expr {
            Expr::Literal(value) => Ok(*value),
            Expr::Variable { name, field: None } => self.variable(name, scope),
            Expr::Variable {
                name,
                field: Some(field),
            } => self.field(name, field),
            Expr::Indexed { name, indices } => {
                let indices = self.evaluate_all(indices, scope)?;
                self.indexed(name, &indices)
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => Ok(i64::from(
                self.truthy(left, scope)? && self.truthy(right, scope)?,
            )),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => Ok(i64::from(
                self.truthy(left, scope)? || self.truthy(right, scope)?,
            )),
            Expr::Binary { op, left, right } => apply_binary(
                *op,
                self.evaluate(left, scope)?,
                self.evaluate(right, scope)?,
            ),
            Expr::Unary { op, operand } => apply_unary(*op, self.evaluate(operand, scope)?),
            Expr::Call(call) => self.call(call, scope),
        }
    }

    /// 求值并判断是否非零。
    pub fn truthy(&self, expr: &Expr, scope: &Scope) -> Result<bool> {
        Ok(self.evaluate(expr, scope)? != 0)
    }

    fn evaluate_all(&self, exprs: &[Expr], scope: &Scope) -> Result<Vec<i64>> {
        exprs.iter().map(|e| self.evaluate(e, scope)).collect()
    }

    /// 当前格子上的棋子与行动玩家。
    fn here(&self, name: &str) -> Result<(Option<PieceId>, PlayerId)> {
        let (x, y) = self
            .context
            .tile
            .ok_or_else(|| EvalError::NoTile(name.to_string()))?;
        let board = self.board.ok_or(EvalError::NoBoard)?;
        let player = self
            .context
            .player
            .ok_or_else(|| EvalError::NoPlayer(name.to_string()))?;
        Ok((board.get(x, y)?, player))
    }

    fn builtin(&self, name: &str) -> Result<bool> {
        match name {
            "empty" => Ok(self.here(name)?.0.is_none()),
            "enemy" => {
                let (occupant, player) = self.here(name)?;
                Ok(occupant.map_or(false, |p| self.definitions.owner(p) != player))
            }
            _ => Ok(true),
        }
    }

    fn variable(&self, name: &str, scope: &Scope) -> Result<i64> {
        if let Some(value) = scope.lookup(name) {
            return Ok(value);
        }
        match name {
            "None" => return Ok(0),
            _ if BUILTINS.contains(&name) => return self.builtin(name).map(i64::from),
            _ => {}
        }
        if let Some(piece) = self.definitions.piece_id(name) {
            let (occupant, _) = self.here(name)?;
            return Ok(i64::from(occupant == Some(piece)));
        }
        if let Some(value) = self.variables.get(name) {
            return value.as_int(name);
        }
        if let Some(predicate) = self.definitions.predicates.get(name) {
            return self.invoke(predicate, Vec::new(), scope);
        }
        Err(EvalError::UnknownVariable(name.to_string()))
    }

    /// 只有 `this` 带字段；映射以整数为键，没有具名字段。
    fn field(&self, name: &str, field: &str) -> Result<i64> {
        let qualified = || format!("{}.{}", name, field);
        if name == "this" {
            match field {
                "x" | "y" => {
                    let (x, y) = self
                        .context
                        .tile
                        .ok_or_else(|| EvalError::NoTile(qualified()))?;
                    return Ok(if field == "x" { x } else { y });
                }
                "player" => {
                    let player = self
                        .context
                        .player
                        .ok_or_else(|| EvalError::NoPlayer(qualified()))?;
                    return Ok(player.0 as i64);
                }
                _ => {}
            }
        }
        Err(EvalError::NoField {
            name: name.to_string(),
            field: field.to_string(),
        })
    }

    fn indexed(&self, name: &str, indices: &[i64]) -> Result<i64> {
        if name == "Board" {
            let &[x, y] = indices else {
                return Err(EvalError::BoardIndex(indices.len()));
            };
            let board = self.board.ok_or(EvalError::NoBoard)?;
            return Ok(PieceId::code(board.get(x, y)?));
        }
        let mut value = self
            .variables
            .get(name)
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))?;
        for &index in indices {
            value = match value {
                Value::Map(map) => map.get(&index).ok_or_else(|| EvalError::MissingKey {
                    name: name.to_string(),
                    index,
                })?,
                Value::Int(_) => return Err(EvalError::NotIndexable(name.to_string())),
            };
        }
        value.as_int(name)
    }

    fn call(&self, call: &Call, scope: &Scope) -> Result<i64> {
        let name = call.name.as_str();
        if BUILTINS.contains(&name) {
            if !call.args.is_empty() {
                return Err(EvalError::Arity {
                    name: name.to_string(),
                    expected: 0,
                    found: call.args.len(),
                });
            }
            return self.builtin(name).map(i64::from);
        }
        if let Some(predicate) = self.definitions.predicates.get(name) {
            let args = self.evaluate_all(&call.args, scope)?;
            return self.invoke(predicate, args, scope);
        }
        let kind = if self.definitions.macros.contains_key(name) {
            "macro"
        } else if self.definitions.effects.contains_key(name) {
            "effect"
        } else {
            return Err(EvalError::Undefined {
                kind: "predicate",
                name: name.to_string(),
            });
        };
        Err(EvalError::NotAnExpression {
            kind,
            name: name.to_string(),
        })
    }

    fn invoke(&self, predicate: &Predicate, args: Vec<i64>, scope: &Scope) -> Result<i64> {
        if predicate.params.len() != args.len() {
            return Err(EvalError::Arity {
                name: predicate.name.clone(),
                expected: predicate.params.len(),
                found: args.len(),
            });
        }
        let bindings = predicate.params.iter().map(String::as_str).zip(args);
        let inner = scope.child(bindings.collect());
        self.evaluate(&predicate.body, &inner)
    }

    /// 赋值右侧若为棋子名或 `None`，视为放置棋子；否则按编码解释。
    fn piece_value(&self, expr: &Expr, scope: &Scope) -> Result<Option<PieceId>> {
        if let Expr::Variable { name, field: None } = expr {
            if scope.lookup(name).is_none() {
                if name == "None" {
                    return Ok(None);
                }
                if let Some(piece) = self.definitions.piece_id(name) {
                    return Ok(Some(piece));
                }
            }
        }
        let code = self.evaluate(expr, scope)?;
        self.definitions.piece_from_code(code)
    }

    fn assignment(&self, assignment: &Assignment, scope: &Scope) -> Result<Write> {
        let indices = self.evaluate_all(&assignment.indices, scope)?;
        if assignment.target == "Board" {
            let &[x, y] = indices.as_slice() else {
                return Err(EvalError::BoardIndex(indices.len()));
            };
            let piece = self.piece_value(&assignment.value, scope)?;
            return Ok(Write::Tile { x, y, piece });
        }
        Ok(Write::Variable {
            name: assignment.target.clone(),
            value: self.evaluate(&assignment.value, scope)?,
            path: indices,
        })
    }
}

enum Write {
    Tile {
        x: i64,
        y: i64,
        piece: Option<PieceId>,
    },
    Variable {
        name: String,
        path: Vec<i64>,
        value: i64,
    },
}

impl Write {
    fn apply(self, variables: &mut Variables, board: &mut Board) -> Result<()> {
        match self {
            Write::Tile { x, y, piece } => board.set(x, y, piece),
            Write::Variable { name, path, value } => {
                let slot = variables.entry(name.clone()).or_insert_with(|| {
                    if path.is_empty() {
                        Value::Int(0)
                    } else {
                        Value::Map(BTreeMap::new())
                    }
                });
                slot.store(&path, value, &name)
            }
        }
    }
}

/// 执行副作用调用。
///
/// 实参在执行前按调用处的状态求值；各赋值依次执行，后面的赋值可以看到前面的结果。
pub fn execute_effect(
    definitions: &Definitions,
    variables: &mut Variables,
    board: &mut Board,
    context: EvalContext,
    call: &Call,
) -> Result<()> {
    let effect = definitions
        .effects
        .get(&call.name)
        .ok_or_else(|| EvalError::Undefined {
            kind: "effect",
            name: call.name.clone(),
        })?;
    if effect.params.len() != call.args.len() {
        return Err(EvalError::Arity {
            name: call.name.clone(),
            expected: effect.params.len(),
            found: call.args.len(),
        });
    }

    let args = Evaluator::new(definitions, variables)
        .with_board(board)
        .with_context(context)
        .evaluate_all(&call.args, &Scope::root())?;
    let scope = Scope::new(effect.params.iter().map(String::as_str).zip(args).collect());

    for assignment in &effect.assignments {
        let write = Evaluator::new(definitions, variables)
            .with_board(board)
            .with_context(context)
            .assignment(assignment, &scope)?;
        write.apply(variables, board)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{ast::Effect, parse_expression};
    use crate::runtime::PieceType;

    fn definitions() -> Definitions {
        let mut definitions = Definitions {
            players: vec!["white".into(), "black".into()],
            pieces: vec![
                PieceType {
                    name: "Pawn".into(),
                    owner: PlayerId(0),
                },
                PieceType {
                    name: "King".into(),
                    owner: PlayerId(1),
                },
            ],
            ..Default::default()
        };
        definitions.predicates.insert(
            "twice".into(),
            Predicate {
                name: "twice".into(),
                params: vec!["n".into()],
                body: parse_expression("n * 2").unwrap(),
            },
        );
        definitions.predicates.insert(
            "shadow".into(),
            Predicate {
                name: "shadow".into(),
                params: vec!["n".into()],
                body: parse_expression("twice(n + 1) + n").unwrap(),
            },
        );
        definitions
    }

    fn eval(source: &str) -> Result<i64> {
        let definitions = definitions();
        let variables = Variables::from([("n".to_string(), Value::Int(10))]);
        Evaluator::new(&definitions, &variables)
            .evaluate(&parse_expression(source).unwrap(), &Scope::root())
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7));
        assert_eq!(eval("10 - 3 - 2"), Ok(5));
        assert_eq!(eval("3 < 4 and 4 <= 4"), Ok(1));
        assert_eq!(eval("!0 + not 5"), Ok(1));
    }

    #[test]
    fn division_semantics() {
        assert_eq!(eval("-7 / 2"), Ok(-3));
        assert_eq!(eval("-7 // 2"), Ok(-4));
        assert_eq!(eval("7 // 2"), Ok(3));
        assert_eq!(eval("-7 % 3"), Ok(2));
        assert_eq!(eval("7 % -3"), Ok(-2));
        assert_eq!(eval("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn overflow_is_an_error() {
        assert_eq!(eval("9223372036854775807 + 1"), Err(EvalError::Overflow));
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(eval("0 and 1 / 0"), Ok(0));
        assert_eq!(eval("1 or missing"), Ok(1));
    }

    #[test]
    fn predicate_calls_shadow_globals() {
        assert_eq!(eval("twice(3)"), Ok(6));
        // Inside `shadow`, `n` is the argument, not the global 10.
        assert_eq!(eval("shadow(1)"), Ok(5));
        assert_eq!(eval("n"), Ok(10));
    }

    #[test]
    fn call_errors() {
        assert_eq!(
            eval("twice(1, 2)"),
            Err(EvalError::Arity {
                name: "twice".into(),
                expected: 1,
                found: 2
            })
        );
        assert_eq!(
            eval("nothing(1)"),
            Err(EvalError::Undefined {
                kind: "predicate",
                name: "nothing".into()
            })
        );
        assert_eq!(eval("missing"), Err(EvalError::UnknownVariable("missing".into())));
    }

    #[test]
    fn fields_exist_only_on_this() {
        assert_eq!(
            eval("n.x"),
            Err(EvalError::NoField {
                name: "n".into(),
                field: "x".into()
            })
        );
        assert_eq!(
            eval("this.z"),
            Err(EvalError::NoField {
                name: "this".into(),
                field: "z".into()
            })
        );
    }

    #[test]
    fn board_predicates_need_context() {
        let definitions = definitions();
        let variables = Variables::new();
        let mut board = Board::new(2, 2);
        board.set(1, 0, Some(PieceId(1))).unwrap();

        let at = |x, y| {
            Evaluator::new(&definitions, &variables)
                .with_board(&board)
                .with_context(EvalContext::at(x, y, PlayerId(0)))
        };
        let expr = |s| parse_expression(s).unwrap();

        assert_eq!(at(0, 0).evaluate(&expr("empty"), &Scope::root()), Ok(1));
        assert_eq!(at(1, 0).evaluate(&expr("enemy()"), &Scope::root()), Ok(1));
        assert_eq!(at(1, 0).evaluate(&expr("King"), &Scope::root()), Ok(1));
        assert_eq!(at(1, 0).evaluate(&expr("Pawn"), &Scope::root()), Ok(0));
        assert_eq!(at(1, 0).evaluate(&expr("Board[1][0]"), &Scope::root()), Ok(2));
        assert_eq!(
            at(1, 0).evaluate(&expr("this.x * 10 + this.y"), &Scope::root()),
            Ok(10)
        );
        assert_eq!(
            at(1, 0).evaluate(&expr("Board[2][0]"), &Scope::root()),
            Err(EvalError::OutOfBoard { x: 2, y: 0 })
        );
        assert_eq!(
            eval("empty"),
            Err(EvalError::NoTile("empty".into()))
        );
    }

    #[test]
    fn effects_assign_in_order() {
        let mut definitions = definitions();
        definitions.effects.insert(
            "move".into(),
            Effect {
                name: "move".into(),
                params: vec!["k".into()],
                assignments: vec![
                    Assignment {
                        target: "count".into(),
                        indices: vec![],
                        value: parse_expression("k").unwrap(),
                    },
                    Assignment {
                        target: "seen".into(),
                        indices: vec![parse_expression("this.x").unwrap()],
                        value: parse_expression("count + 1").unwrap(),
                    },
                    Assignment {
                        target: "Board".into(),
                        indices: vec![Expr::Literal(0), Expr::Literal(1)],
                        value: Expr::variable("King"),
                    },
                ],
            },
        );
        let mut variables = Variables::new();
        let mut board = Board::new(2, 2);
        let call = Call {
            name: "move".into(),
            args: vec![Expr::Literal(4)],
        };

        execute_effect(
            &definitions,
            &mut variables,
            &mut board,
            EvalContext::at(1, 1, PlayerId(0)),
            &call,
        )
        .unwrap();

        assert_eq!(variables.get("count"), Some(&Value::Int(4)));
        assert_eq!(
            variables.get("seen"),
            Some(&Value::Map(BTreeMap::from([(1, Value::Int(5))])))
        );
        assert_eq!(board.get(0, 1), Ok(Some(PieceId(1))));
    }
}
