//! 运行时：规则表、求值与对局引擎。

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    sync::Arc,
};

use crate::automaton::{Dfa, Letter};
use crate::frontend::ast;

pub mod builder;
pub mod engine;
pub mod eval;

pub use builder::{BuildError, RulesBuilder};
pub use engine::{EngineError, Game};
pub use eval::{EvalContext, EvalError, Evaluator, Scope};

/// Player ID
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct PlayerId(pub usize);

impl Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Piece ID
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct PieceId(pub usize);

impl PieceId {
    /// 在 `Board[x][y]` 中的编码，空格为 0。
    pub fn code(piece: Option<PieceId>) -> i64 {
        piece.map_or(0, |p| p.0 as i64 + 1)
    }
}

impl Display for PieceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 变量的值
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// 整数
    Int(i64),
    /// 以整数为键的映射
    Map(BTreeMap<i64, Value>),
}

impl Value {
    /// 读取整数值。
    pub fn as_int(&self, name: &str) -> Result<i64, EvalError> {
        match self {
            Value::Int(value) => Ok(*value),
            Value::Map(_) => Err(EvalError::NotAnInteger(name.to_string())),
        }
    }

    /// 写入 `self[path[0]][path[1]]... = value`，按需创建中间映射。
    pub fn store(&mut self, path: &[i64], value: i64, name: &str) -> Result<(), EvalError> {
        let mut slot = self;
        for (i, key) in path.iter().enumerate() {
            let map = match slot {
                Value::Map(map) => map,
                Value::Int(_) => return Err(EvalError::NotIndexable(name.to_string())),
            };
            let leaf = i + 1 == path.len();
            slot = map.entry(*key).or_insert_with(|| {
                if leaf {
                    Value::Int(0)
                } else {
                    Value::Map(BTreeMap::new())
                }
            });
        }
        *slot = Value::Int(value);
        Ok(())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{}", value),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// 全局变量环境
pub type Variables = BTreeMap<String, Value>;

/// 棋盘，按 `[x][y]` 存放棋子。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<Option<PieceId>>,
}

impl Board {
    /// 创建一个空棋盘。
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width * height],
        }
    }

    /// 宽度
    pub fn width(&self) -> usize {
        self.width
    }

    /// 高度
    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let x = usize::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = usize::try_from(y).ok().filter(|&y| y < self.height)?;
        Some(x * self.height + y)
    }

    /// 坐标是否在棋盘内。
    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.index(x, y).is_some()
    }

    /// 读取格子。
    pub fn get(&self, x: i64, y: i64) -> Result<Option<PieceId>, EvalError> {
        self.index(x, y)
            .map(|i| self.cells[i])
            .ok_or(EvalError::OutOfBoard { x, y })
    }

    /// 写入格子。
    pub fn set(&mut self, x: i64, y: i64, piece: Option<PieceId>) -> Result<(), EvalError> {
        let i = self.index(x, y).ok_or(EvalError::OutOfBoard { x, y })?;
        self.cells[i] = piece;
        Ok(())
    }

    /// 按 x 优先、y 其次的顺序遍历所有棋子。
    pub fn pieces(&self) -> impl Iterator<Item = ((i64, i64), PieceId)> + '_ {
        let height = self.height;
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.map(|piece| (((i / height) as i64, (i % height) as i64), piece))
        })
    }
}

/// 棋子种类
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceType {
    /// 名称
    pub name: String,
    /// 所属玩家
    pub owner: PlayerId,
}

/// 程序中的全部命名定义。
#[derive(Clone, Debug, Default)]
pub struct Definitions {
    /// 玩家，按行棋顺序
    pub players: Vec<String>,
    /// 棋子种类，按声明顺序
    pub pieces: Vec<PieceType>,
    /// 宏
    pub macros: HashMap<String, ast::Macro>,
    /// 谓词
    pub predicates: HashMap<String, ast::Predicate>,
    /// 副作用
    pub effects: HashMap<String, ast::Effect>,
    /// 每个玩家的胜利条件
    pub victories: Vec<Option<ast::Expr>>,
}

impl Definitions {
    /// 按名称查找棋子种类。
    pub fn piece_id(&self, name: &str) -> Option<PieceId> {
        self.pieces.iter().position(|p| p.name == name).map(PieceId)
    }

    /// 按名称查找玩家。
    pub fn player_id(&self, name: &str) -> Option<PlayerId> {
        self.players.iter().position(|p| p == name).map(PlayerId)
    }

    /// 棋子的所属玩家。
    pub fn owner(&self, piece: PieceId) -> PlayerId {
        self.pieces[piece.0].owner
    }

    /// 从 `Board[x][y]` 编码还原格子内容。
    pub fn piece_from_code(&self, code: i64) -> Result<Option<PieceId>, EvalError> {
        match usize::try_from(code) {
            Ok(0) => Ok(None),
            Ok(n) if n <= self.pieces.len() => Ok(Some(PieceId(n - 1))),
            _ => Err(EvalError::NotAPiece(code)),
        }
    }
}

/// 编译后的棋子：名称、所属玩家与走法自动机。
#[derive(Clone, Debug)]
pub struct BoardPiece {
    /// 名称
    pub name: String,
    /// 所属玩家
    pub owner: PlayerId,
    /// 走法自动机
    pub dfa: Arc<Dfa>,
}

/// 编译后的规则表，载入后不可变，可在多个对局间共享。
#[derive(Clone, Debug)]
pub struct Rules {
    /// 命名定义
    pub definitions: Definitions,
    /// 按棋子种类编号排列
    pub pieces: Vec<BoardPiece>,
    /// 变量初值
    pub variables: Variables,
    /// 初始棋盘
    pub board: Board,
}

/// 着法：起点与一条接受路径上的字母序列。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    /// 起点
    pub start: (i64, i64),
    /// 字母序列
    pub letters: Vec<Arc<Letter>>,
}

impl Move {
    /// 终点
    pub fn end(&self) -> (i64, i64) {
        self.letters
            .iter()
            .fold(self.start, |(x, y), l| (x + l.dx, y + l.dy))
    }
}

impl Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (x, y) = self.start;
        write!(f, "({}, {})", x, y)?;
        for letter in &self.letters {
            write!(f, " {}", letter)?;
        }
        Ok(())
    }
}

/// 对局状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    /// 未决
    Unresolved,
    /// 和局
    Draw,
    /// 某玩家获胜
    Win(PlayerId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_layout_is_x_major() {
        let mut board = Board::new(3, 2);
        board.set(2, 1, Some(PieceId(0))).unwrap();
        board.set(0, 1, Some(PieceId(1))).unwrap();
        assert_eq!(board.get(2, 1), Ok(Some(PieceId(0))));
        assert_eq!(board.get(1, 1), Ok(None));
        assert_eq!(
            board.pieces().collect::<Vec<_>>(),
            vec![((0, 1), PieceId(1)), ((2, 1), PieceId(0))]
        );
    }

    #[test]
    fn board_bounds() {
        let board = Board::new(2, 2);
        assert!(board.contains(1, 1));
        assert!(!board.contains(2, 0));
        assert!(!board.contains(0, -1));
        assert_eq!(board.get(-1, 0), Err(EvalError::OutOfBoard { x: -1, y: 0 }));
    }

    #[test]
    fn store_creates_nested_maps() {
        let mut value = Value::Map(BTreeMap::new());
        value.store(&[1, 2], 5, "m").unwrap();
        let Value::Map(outer) = &value else {
            panic!("expected map");
        };
        let Some(Value::Map(inner)) = outer.get(&1) else {
            panic!("expected nested map");
        };
        assert_eq!(inner.get(&2), Some(&Value::Int(5)));
        assert_eq!(value.to_string(), "{1: {2: 5}}");
    }

    #[test]
    fn store_into_integer_fails() {
        let mut value = Value::Int(3);
        assert_eq!(
            value.store(&[0], 1, "n"),
            Err(EvalError::NotIndexable("n".into()))
        );
        value.store(&[], 7, "n").unwrap();
        assert_eq!(value, Value::Int(7));
    }

    #[test]
    fn piece_codes() {
        let definitions = Definitions {
            pieces: vec![
                PieceType {
                    name: "P".into(),
                    owner: PlayerId(0),
                },
                PieceType {
                    name: "Q".into(),
                    owner: PlayerId(1),
                },
            ],
            ..Default::default()
        };
        assert_eq!(definitions.piece_from_code(0), Ok(None));
        assert_eq!(definitions.piece_from_code(2), Ok(Some(PieceId(1))));
        assert_eq!(definitions.piece_from_code(3), Err(EvalError::NotAPiece(3)));
        assert_eq!(PieceId::code(Some(PieceId(1))), 2);
    }
}
