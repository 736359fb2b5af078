//! 规则表构建器。

use thiserror::Error;
use tracing::debug;

use crate::automaton::{Dfa, Nfa, Resolver};
use crate::frontend::ast::{self, Cell, Declaration};

use super::{
    Board, BoardPiece, Definitions, EvalError, Evaluator, PieceType, Rules, Scope, Value,
    Variables,
};

/// 构建规则表时的错误。
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("a program has already been loaded")]
    AlreadyLoaded,

    #[error("no program has been loaded")]
    NoProgram,

    #[error("undefined player `{0}`")]
    UndefinedPlayer(String),

    #[error("undefined piece `{0}`")]
    UndefinedPiece(String),

    #[error("invalid board size {width}x{height}")]
    BoardSize { width: i64, height: i64 },

    #[error("board has {found} cells, but {expected} are expected")]
    CellCount { expected: usize, found: usize },

    #[error("failed to evaluate variable `{name}`: {source}")]
    Variable {
        name: String,
        #[source]
        source: EvalError,
    },

    #[error("failed to compile the rule of piece `{piece}`: {source}")]
    Rule {
        piece: String,
        #[source]
        source: EvalError,
    },
}

type Result<T, E = BuildError> = std::result::Result<T, E>;

/// 由程序构建规则表。
#[derive(Default)]
pub struct RulesBuilder {
    program: Option<ast::Program>,
}

impl RulesBuilder {
    /// 创建一个新的 `RulesBuilder`。
    pub fn new() -> Self {
        Default::default()
    }

    /// 载入一个已通过检查的程序。一份规则表只对应一个程序。
    pub fn program(&mut self, program: ast::Program) -> Result<&mut Self> {
        if self.program.is_some() {
            return Err(BuildError::AlreadyLoaded);
        }
        self.program = Some(program);
        Ok(self)
    }

    /// 构建规则表。
    pub fn build(self) -> Result<Rules> {
        let program = self.program.ok_or(BuildError::NoProgram)?;
        let definitions = definitions(&program)?;
        let variables = variables(&program, &definitions)?;
        let pieces = pieces(&program, &definitions, &variables)?;
        let board = board(&program.board, &definitions)?;
        Ok(Rules {
            definitions,
            pieces,
            variables,
            board,
        })
    }

    /// 从程序直接构建规则表。
    pub fn build_rules(program: ast::Program) -> Result<Rules> {
        let mut builder = Self::new();
        builder.program(program)?;
        builder.build()
    }
}

fn definitions(program: &ast::Program) -> Result<Definitions> {
    let mut definitions = Definitions {
        players: program.players.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    };
    for piece in &program.pieces {
        let owner = definitions
            .player_id(&piece.owner)
            .ok_or_else(|| BuildError::UndefinedPlayer(piece.owner.clone()))?;
        definitions.pieces.push(PieceType {
            name: piece.name.clone(),
            owner,
        });
    }

    definitions.victories = vec![None; definitions.players.len()];
    for declaration in &program.declarations {
        match declaration.as_ref() {
            Declaration::Macro(m) => {
                definitions.macros.insert(m.name.clone(), m.clone());
            }
            Declaration::Predicate(p) => {
                definitions.predicates.insert(p.name.clone(), p.clone());
            }
            Declaration::Effect(e) => {
                definitions.effects.insert(e.name.clone(), e.clone());
            }
            Declaration::Victory(v) => {
                let player = definitions
                    .player_id(&v.player)
                    .ok_or_else(|| BuildError::UndefinedPlayer(v.player.clone()))?;
                definitions.victories[player.0] = Some(v.condition.clone());
            }
            Declaration::Rule(_) | Declaration::Variable(_) => {}
        }
    }
    Ok(definitions)
}

/// 变量按声明顺序求值，后声明的可以引用先声明的。
fn variables(program: &ast::Program, definitions: &Definitions) -> Result<Variables> {
    let mut variables = Variables::new();
    for declaration in &program.declarations {
        if let Declaration::Variable(v) = declaration.as_ref() {
            let value = Evaluator::new(definitions, &variables)
                .evaluate(&v.value, &Scope::root())
                .map_err(|source| BuildError::Variable {
                    name: v.name.clone(),
                    source,
                })?;
            variables.insert(v.name.clone(), Value::Int(value));
        }
    }
    Ok(variables)
}

fn pieces(
    program: &ast::Program,
    definitions: &Definitions,
    variables: &Variables,
) -> Result<Vec<BoardPiece>> {
    let resolver = Resolver::new(definitions, variables);
    definitions
        .pieces
        .iter()
        .map(|piece| {
            let dfa = match program.rules().find(|rule| rule.piece == piece.name) {
                Some(rule) => {
                    let pattern =
                        resolver
                            .compile(&rule.regex)
                            .map_err(|source| BuildError::Rule {
                                piece: piece.name.clone(),
                                source,
                            })?;
                    let nfa = Nfa::build(&pattern);
                    let dfa = Dfa::from_nfa(&nfa);
                    debug!(
                        piece = %piece.name,
                        nfa = nfa.len(),
                        dfa = dfa.len(),
                        "compiled piece rule"
                    );
                    dfa
                }
                None => {
                    debug!(piece = %piece.name, "piece has no rule");
                    Dfa::empty()
                }
            };
            Ok(BoardPiece {
                name: piece.name.clone(),
                owner: piece.owner,
                dfa: dfa.into(),
            })
        })
        .collect()
}

/// 格子自顶行起按行给出：第 `k` 格位于 `x = k % W`，`y = H - 1 - k / W`。
fn board(decl: &ast::BoardDecl, definitions: &Definitions) -> Result<Board> {
    let size_error = || BuildError::BoardSize {
        width: decl.width,
        height: decl.height,
    };
    let width = usize::try_from(decl.width)
        .ok()
        .filter(|&w| w > 0)
        .ok_or_else(size_error)?;
    let height = usize::try_from(decl.height)
        .ok()
        .filter(|&h| h > 0)
        .ok_or_else(size_error)?;
    let expected = width.checked_mul(height).ok_or_else(size_error)?;
    if decl.cells.len() != expected {
        return Err(BuildError::CellCount {
            expected,
            found: decl.cells.len(),
        });
    }

    let mut board = Board::new(width, height);
    for (k, cell) in decl.cells.iter().enumerate() {
        let piece = match cell.as_ref() {
            Cell::Empty => None,
            Cell::Piece { name, .. } => Some(
                definitions
                    .piece_id(name)
                    .ok_or_else(|| BuildError::UndefinedPiece(name.clone()))?,
            ),
        };
        let x = (k % width) as i64;
        let y = (height - 1 - k / width) as i64;
        board
            .set(x, y, piece)
            .map_err(|_| size_error())?;
    }
    Ok(board)
}
