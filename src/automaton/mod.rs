//! 走法自动机：宏展开、NFA 构造与子集构造。

use std::fmt::Display;

use crate::frontend::ast::{Call, Expr};

pub mod dfa;
pub mod nfa;
pub mod resolve;

pub use dfa::Dfa;
pub use nfa::Nfa;
pub use resolve::Resolver;

/// 展开后的字母，自动机的转移标签。
///
/// 偏移已求值；前置条件与副作用的实参中，宏实参已代入并做了常量折叠，
/// 其余名称（如 `this.x`）留到运行时求值。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Letter {
    /// 横向偏移
    pub dx: i64,
    /// 纵向偏移
    pub dy: i64,
    /// 前置条件，在目标格上求值
    pub precondition: Expr,
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

/// 不含宏调用的走法正则表达式。
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Letter(Letter),
    Concat(Box<Pattern>, Box<Pattern>),
    Union(Box<Pattern>, Box<Pattern>),
    Star(Box<Pattern>),
    Plus(Box<Pattern>),
    Optional(Box<Pattern>),
}

impl Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Letter(letter) => write!(f, "{}", letter),
            Pattern::Concat(left, right) => write!(f, "{}{}", left, right),
            Pattern::Union(left, right) => write!(f, "({} | {})", left, right),
            Pattern::Star(inner) => write!(f, "({})*", inner),
            Pattern::Plus(inner) => write!(f, "({})+", inner),
            Pattern::Optional(inner) => write!(f, "({})?", inner),
        }
    }
}
