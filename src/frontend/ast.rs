//! 抽象语法树

use std::fmt::Display;

use crate::utils::Span;

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 二元运算符
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        };
        f.write_str(op)
    }
}

/// 一元运算符
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Not => f.write_str("!"),
            UnaryOp::Neg => f.write_str("-"),
        }
    }
}

/// 整数表达式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// 字面量
    Literal(i64),
    /// 变量，可带一级字段 `a.b`
    ///
    /// 映射只以整数为键，字段只用于求值上下文：`this.x`、`this.y`、`this.player`。
    /// 其余变量的字段访问是求值错误，整数下标请写作 `a[i]`。
    Variable {
        /// 变量名
        name: String,
        /// 字段
        field: Option<String>,
    },
    /// 下标访问 `a[i][j]`
    Indexed {
        /// 变量名
        name: String,
        /// 下标
        indices: Vec<Expr>,
    },
    /// 二元运算
    Binary {
        /// 运算符
        op: BinaryOp,
        /// 左操作数
        left: Box<Expr>,
        /// 右操作数
        right: Box<Expr>,
    },
    /// 一元运算
    Unary {
        /// 运算符
        op: UnaryOp,
        /// 操作数
        operand: Box<Expr>,
    },
    /// 函数调用
    Call(Call),
}

impl Expr {
    /// 创建一个不带字段的变量。
    pub fn variable(name: impl Into<String>) -> Self {
        Expr::Variable {
            name: name.into(),
            field: None,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Variable { name, field: None } => write!(f, "{}", name),
            Expr::Variable {
                name,
                field: Some(field),
            } => write!(f, "{}.{}", name, field),
            Expr::Indexed { name, indices } => {
                write!(f, "{}", name)?;
                for index in indices {
                    write!(f, "[{}]", index)?;
                }
                Ok(())
            }
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Unary { op, operand } => write!(f, "{}{}", op, operand),
            Expr::Call(call) => write!(f, "{}", call),
        }
    }
}

/// 调用 `name(args)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// 被调用者
    pub name: String,
    /// 实参
    pub args: Vec<Expr>,
}

impl Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, join(&self.args))
    }
}

/// 字母的前置条件
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Precondition {
    /// 裸名称，如 `empty`
    Named(String),
    /// 调用，如 `inRange(1)`
    Call(Call),
}

impl Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precondition::Named(name) => write!(f, "{}", name),
            Precondition::Call(call) => write!(f, "{}", call),
        }
    }
}

/// 字母 `(dx, dy, precondition){effect}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Letter {
    /// 横向偏移
    pub dx: Expr,
    /// 纵向偏移
    pub dy: Expr,
    /// 前置条件
    pub precondition: Precondition,
    /// 副作用
    pub effect: Option<Call>,
}

impl Display for Letter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.dx, self.dy, self.precondition)?;
        if let Some(effect) = &self.effect {
            write!(f, "{{{}}}", effect)?;
        }
        Ok(())
    }
}

/// 走法正则表达式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Regex {
    /// 字母
    Letter(Letter),
    /// 连接
    Concat(Box<Regex>, Box<Regex>),
    /// 并
    Union(Box<Regex>, Box<Regex>),
    /// 零次或多次
    Star(Box<Regex>),
    /// 一次或多次
    Plus(Box<Regex>),
    /// 零次或一次
    Optional(Box<Regex>),
    /// 宏调用
    MacroCall(Call),
}

impl Display for Regex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regex::Letter(letter) => write!(f, "{}", letter),
            Regex::Concat(left, right) => write!(f, "{}{}", left, right),
            Regex::Union(left, right) => write!(f, "({} | {})", left, right),
            Regex::Star(inner) => write!(f, "({})*", inner),
            Regex::Plus(inner) => write!(f, "({})+", inner),
            Regex::Optional(inner) => write!(f, "({})?", inner),
            Regex::MacroCall(call) => write!(f, "{}", call),
        }
    }
}

/// 棋子声明 `Name(owner)`
#[derive(Debug, Clone, PartialEq)]
pub struct PieceDecl {
    /// 棋子名
    pub name: String,
    /// 所属玩家
    pub owner: String,
}

impl Display for PieceDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.owner)
    }
}

/// 棋子走法规则
#[derive(Debug, Clone, PartialEq)]
pub struct PieceRule {
    /// 棋子名
    pub piece: String,
    /// 走法
    pub regex: Regex,
}

/// 宏
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    /// 名称
    pub name: String,
    /// 形参
    pub params: Vec<String>,
    /// 宏体
    pub body: Regex,
}

/// 谓词
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// 名称
    pub name: String,
    /// 形参
    pub params: Vec<String>,
    /// 返回值
    pub body: Expr,
}

/// 赋值 `target[i][j] = value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// 目标变量
    pub target: String,
    /// 下标
    pub indices: Vec<Expr>,
    /// 值
    pub value: Expr,
}

impl Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.target)?;
        for index in &self.indices {
            write!(f, "[{}]", index)?;
        }
        write!(f, " = {};", self.value)
    }
}

/// 副作用
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    /// 名称
    pub name: String,
    /// 形参
    pub params: Vec<String>,
    /// 赋值序列
    pub assignments: Vec<Assignment>,
}

/// 变量声明
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    /// 名称
    pub name: String,
    /// 初值
    pub value: Expr,
}

/// 胜利条件
#[derive(Debug, Clone, PartialEq)]
pub struct Victory {
    /// 玩家
    pub player: String,
    /// 条件
    pub condition: Expr,
}

/// 声明
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Rule(PieceRule),
    Macro(Macro),
    Predicate(Predicate),
    Effect(Effect),
    Variable(VariableDecl),
    Victory(Victory),
}

impl Display for Declaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Declaration::Rule(rule) => write!(f, "rule {} = {};", rule.piece, rule.regex),
            Declaration::Macro(m) => {
                write!(f, "macro {}({}) = {};", m.name, join(&m.params), m.body)
            }
            Declaration::Predicate(p) => write!(
                f,
                "predicate {}({}) {{ return {}; }};",
                p.name,
                join(&p.params),
                p.body
            ),
            Declaration::Effect(e) => {
                write!(f, "effect {}({}) {{", e.name, join(&e.params))?;
                for assignment in &e.assignments {
                    write!(f, " {}", assignment)?;
                }
                write!(f, " }};")
            }
            Declaration::Variable(v) => write!(f, "variable {} = {};", v.name, v.value),
            Declaration::Victory(v) => {
                write!(f, "victory {} {{ return {}; }};", v.player, v.condition)
            }
        }
    }
}

/// 棋盘格
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// 空格 `None`
    Empty,
    /// 棋子，可显式写出所属玩家
    Piece {
        /// 棋子名
        name: String,
        /// 所属玩家
        owner: Option<String>,
    },
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => write!(f, "None"),
            Cell::Piece { name, owner: None } => write!(f, "{}", name),
            Cell::Piece {
                name,
                owner: Some(owner),
            } => write!(f, "{}({})", name, owner),
        }
    }
}

/// 初始棋盘
#[derive(Debug, Clone, PartialEq)]
pub struct BoardDecl {
    /// 宽度
    pub width: i64,
    /// 高度
    pub height: i64,
    /// 自顶行起按行排列的格子
    pub cells: Vec<Span<Cell>>,
}

/// 程序
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// 玩家，按行棋顺序
    pub players: Vec<Span<String>>,
    /// 棋子
    pub pieces: Vec<Span<PieceDecl>>,
    /// 声明
    pub declarations: Vec<Span<Declaration>>,
    /// 棋盘
    pub board: Span<BoardDecl>,
}

impl Program {
    /// 所有棋子走法规则。
    pub fn rules(&self) -> impl Iterator<Item = &PieceRule> {
        self.declarations.iter().filter_map(|d| match d.as_ref() {
            Declaration::Rule(rule) => Some(rule),
            _ => None,
        })
    }

    /// 所有宏。
    pub fn macros(&self) -> impl Iterator<Item = &Macro> {
        self.declarations.iter().filter_map(|d| match d.as_ref() {
            Declaration::Macro(m) => Some(m),
            _ => None,
        })
    }

    /// 所有谓词。
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.declarations.iter().filter_map(|d| match d.as_ref() {
            Declaration::Predicate(p) => Some(p),
            _ => None,
        })
    }

    /// 所有副作用。
    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.declarations.iter().filter_map(|d| match d.as_ref() {
            Declaration::Effect(e) => Some(e),
            _ => None,
        })
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "players = {};", join(&self.players))?;
        writeln!(f, "pieces = {};", join(&self.pieces))?;
        for declaration in &self.declarations {
            writeln!(f, "{}", declaration)?;
        }
        writeln!(f, "board_size = {}, {};", self.board.width, self.board.height)?;
        writeln!(f, "board = {};", join(&self.board.cells))
    }
}
