//! 语义检查。

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::ast::{self, Cell, Declaration, Expr, Precondition, Regex};
use crate::utils::SourceFile;

/// 内建的零元谓词。
pub const BUILTINS: &[&str] = &["empty", "enemy", "true"];

/// 不能被声明或赋值的名称。
pub const RESERVED: &[&str] = &["Board", "this", "None", "empty", "enemy", "true"];

/// 语义错误的种类。
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckErrorKind {
    #[error("undefined {kind} `{name}`")]
    UndefinedSymbol { kind: &'static str, name: String },

    #[error("{kind} `{name}` is declared more than once")]
    Duplicate { kind: &'static str, name: String },

    #[error("`{name}` expects {expected} argument(s), but {found} given")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("`{name}` is a reserved name")]
    Reserved { name: String },

    #[error("cannot assign to `{name}`")]
    InvalidTarget { name: String },

    #[error("board size must be positive, got {width}x{height}")]
    BoardSize { width: i64, height: i64 },

    #[error("board has {found} cells, but its size requires {expected}")]
    CellCount { expected: usize, found: usize },

    #[error("piece `{piece}` belongs to `{declared}`, not `{found}`")]
    OwnerMismatch {
        piece: String,
        declared: String,
        found: String,
    },
}

/// 语义错误，附带所在声明的位置。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct CheckError {
    /// 错误种类
    pub kind: CheckErrorKind,
    /// 起始偏移
    pub start: usize,
    /// 结束偏移
    pub end: usize,
}

impl CheckError {
    /// 生成带有源码标注的错误信息。
    pub fn to_snippet(&self, file: &SourceFile) -> String {
        file.snippet("semantic error", &self.kind.to_string(), self.start, self.end)
    }
}

type Result<T> = std::result::Result<T, CheckErrorKind>;

fn duplicate(kind: &'static str, name: &str) -> CheckErrorKind {
    CheckErrorKind::Duplicate {
        kind,
        name: name.to_string(),
    }
}

fn undefined(kind: &'static str, name: &str) -> CheckErrorKind {
    CheckErrorKind::UndefinedSymbol {
        kind,
        name: name.to_string(),
    }
}

fn arity(name: &str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(CheckErrorKind::Arity {
            name: name.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

#[derive(Default)]
struct Symbols<'a> {
    players: HashSet<&'a str>,
    pieces: HashMap<&'a str, &'a str>,
    macros: HashMap<&'a str, usize>,
    predicates: HashMap<&'a str, usize>,
    effects: HashMap<&'a str, usize>,
    variables: HashSet<&'a str>,
}

impl<'a> Symbols<'a> {
    fn declarable(&self, name: &str) -> Result<()> {
        if RESERVED.contains(&name) || self.pieces.contains_key(name) {
            return Err(CheckErrorKind::Reserved {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn params(&self, params: &'a [String]) -> Result<HashSet<&'a str>> {
        let mut scope = HashSet::new();
        for param in params {
            self.declarable(param)?;
            if !scope.insert(param.as_str()) {
                return Err(duplicate("parameter", param));
            }
        }
        Ok(scope)
    }

    fn declare(&mut self, declaration: &'a Declaration) -> Result<()> {
        match declaration {
            Declaration::Rule(_) | Declaration::Victory(_) => Ok(()),
            Declaration::Macro(m) => {
                if self.macros.insert(&m.name, m.params.len()).is_some() {
                    return Err(duplicate("macro", &m.name));
                }
                Ok(())
            }
            Declaration::Predicate(p) => {
                self.declarable(&p.name)?;
                if self.predicates.insert(&p.name, p.params.len()).is_some() {
                    return Err(duplicate("predicate", &p.name));
                }
                Ok(())
            }
            Declaration::Effect(e) => {
                if self.effects.insert(&e.name, e.params.len()).is_some() {
                    return Err(duplicate("effect", &e.name));
                }
                Ok(())
            }
            Declaration::Variable(v) => {
                self.declarable(&v.name)?;
                if !self.variables.insert(&v.name) {
                    return Err(duplicate("variable", &v.name));
                }
                Ok(())
            }
        }
    }

    fn call(&self, call: &ast::Call) -> Result<()> {
        if BUILTINS.contains(&call.name.as_str()) {
            arity(&call.name, 0, call.args.len())?;
        } else if let Some(&expected) = self.predicates.get(call.name.as_str()) {
            arity(&call.name, expected, call.args.len())?;
        } else {
            return Err(undefined("predicate", &call.name));
        }
        for arg in &call.args {
            self.expr(arg)?;
        }
        Ok(())
    }

    fn expr(&self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(_) | Expr::Variable { .. } => Ok(()),
            Expr::Indexed { indices, .. } => {
                for index in indices {
                    self.expr(index)?;
                }
                Ok(())
            }
            Expr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Call(call) => self.call(call),
        }
    }

    fn precondition(&self, precondition: &Precondition, scope: &HashSet<&str>) -> Result<()> {
        match precondition {
            Precondition::Call(call) => self.call(call),
            Precondition::Named(name) => {
                let name = name.as_str();
                if scope.contains(name)
                    || BUILTINS.contains(&name)
                    || self.pieces.contains_key(name)
                    || self.variables.contains(name)
                {
                    return Ok(());
                }
                match self.predicates.get(name) {
                    Some(&expected) => arity(name, expected, 0),
                    None => Err(undefined("predicate", name)),
                }
            }
        }
    }

    fn regex(&self, regex: &Regex, scope: &HashSet<&str>) -> Result<()> {
        match regex {
            Regex::Letter(letter) => {
                self.expr(&letter.dx)?;
                self.expr(&letter.dy)?;
                self.precondition(&letter.precondition, scope)?;
                if let Some(effect) = &letter.effect {
                    let expected = self
                        .effects
                        .get(effect.name.as_str())
                        .ok_or_else(|| undefined("effect", &effect.name))?;
                    arity(&effect.name, *expected, effect.args.len())?;
                    for arg in &effect.args {
                        self.expr(arg)?;
                    }
                }
                Ok(())
            }
            Regex::Concat(left, right) | Regex::Union(left, right) => {
                self.regex(left, scope)?;
                self.regex(right, scope)
            }
            Regex::Star(inner) | Regex::Plus(inner) | Regex::Optional(inner) => {
                self.regex(inner, scope)
            }
            Regex::MacroCall(call) => {
                let expected = self
                    .macros
                    .get(call.name.as_str())
                    .ok_or_else(|| undefined("macro", &call.name))?;
                arity(&call.name, *expected, call.args.len())?;
                for arg in &call.args {
                    self.expr(arg)?;
                }
                Ok(())
            }
        }
    }

    fn assignment(&self, assignment: &ast::Assignment, scope: &HashSet<&str>) -> Result<()> {
        let target = assignment.target.as_str();
        let valid = match target {
            "Board" => assignment.indices.len() == 2,
            _ => !(RESERVED.contains(&target)
                || self.pieces.contains_key(target)
                || scope.contains(target)),
        };
        if !valid {
            return Err(CheckErrorKind::InvalidTarget {
                name: target.to_string(),
            });
        }
        for index in &assignment.indices {
            self.expr(index)?;
        }
        self.expr(&assignment.value)
    }

    fn body(&self, declaration: &'a Declaration, rules: &mut HashSet<&'a str>) -> Result<()> {
        let empty = HashSet::new();
        match declaration {
            Declaration::Rule(rule) => {
                if !self.pieces.contains_key(rule.piece.as_str()) {
                    return Err(undefined("piece", &rule.piece));
                }
                if !rules.insert(&rule.piece) {
                    return Err(duplicate("rule for piece", &rule.piece));
                }
                self.regex(&rule.regex, &empty)
            }
            Declaration::Macro(m) => self.regex(&m.body, &self.params(&m.params)?),
            Declaration::Predicate(p) => {
                self.params(&p.params)?;
                self.expr(&p.body)
            }
            Declaration::Effect(e) => {
                let scope = self.params(&e.params)?;
                for assignment in &e.assignments {
                    self.assignment(assignment, &scope)?;
                }
                Ok(())
            }
            Declaration::Variable(v) => self.expr(&v.value),
            Declaration::Victory(v) => {
                if !self.players.contains(v.player.as_str()) {
                    return Err(undefined("player", &v.player));
                }
                self.expr(&v.condition)
            }
        }
    }
}

fn at<T>(result: Result<T>, start: usize, end: usize) -> std::result::Result<T, CheckError> {
    result.map_err(|kind| CheckError { kind, start, end })
}

fn check_board(board: &ast::BoardDecl) -> Result<()> {
    let size_error = || CheckErrorKind::BoardSize {
        width: board.width,
        height: board.height,
    };
    let side = |n: i64| usize::try_from(n).ok().filter(|&n| n > 0);
    let expected = side(board.width)
        .zip(side(board.height))
        .and_then(|(width, height)| width.checked_mul(height))
        .ok_or_else(size_error)?;
    if board.cells.len() != expected {
        return Err(CheckErrorKind::CellCount {
            expected,
            found: board.cells.len(),
        });
    }
    Ok(())
}

fn check_cell(symbols: &Symbols, cell: &Cell) -> Result<()> {
    let Cell::Piece { name, owner } = cell else {
        return Ok(());
    };
    let declared = symbols
        .pieces
        .get(name.as_str())
        .ok_or_else(|| undefined("piece", name))?;
    if let Some(owner) = owner {
        if !symbols.players.contains(owner.as_str()) {
            return Err(undefined("player", owner));
        }
        if owner.as_str() != *declared {
            return Err(CheckErrorKind::OwnerMismatch {
                piece: name.clone(),
                declared: declared.to_string(),
                found: owner.clone(),
            });
        }
    }
    Ok(())
}

/// 检查整个程序
pub fn check_program(program: &ast::Program) -> std::result::Result<(), CheckError> {
    let mut symbols = Symbols::default();

    for player in &program.players {
        if !symbols.players.insert(player.as_str()) {
            return at(Err(duplicate("player", player)), player.start, player.end);
        }
    }
    for piece in &program.pieces {
        at(symbols.declarable(&piece.name), piece.start, piece.end)?;
        if !symbols.players.contains(piece.owner.as_str()) {
            return at(Err(undefined("player", &piece.owner)), piece.start, piece.end);
        }
        if symbols.pieces.insert(&piece.name, &piece.owner).is_some() {
            return at(Err(duplicate("piece", &piece.name)), piece.start, piece.end);
        }
    }

    let mut victories = HashSet::new();
    for declaration in &program.declarations {
        at(symbols.declare(declaration), declaration.start, declaration.end)?;
        if let Declaration::Victory(v) = declaration.as_ref() {
            if !victories.insert(v.player.as_str()) {
                return at(
                    Err(duplicate("victory for player", &v.player)),
                    declaration.start,
                    declaration.end,
                );
            }
        }
    }

    let mut rules = HashSet::new();
    for declaration in &program.declarations {
        at(symbols.body(declaration, &mut rules), declaration.start, declaration.end)?;
    }

    at(check_board(&program.board), program.board.start, program.board.end)?;
    for cell in &program.board.cells {
        at(check_cell(&symbols, cell), cell.start, cell.end)?;
    }

    Ok(())
}
