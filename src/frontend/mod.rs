//! 编译器前端

pub mod ast;
pub mod check;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod regex;

use thiserror::Error;

use crate::utils::SourceFile;
use lexer::{LexError, Position};
use parser::{ParseError, Parser};

/// 词法或语法错误。
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    /// 错误的位置。
    pub fn position(&self) -> Position {
        match self {
            SyntaxError::Lex(e) => e.position(),
            SyntaxError::Parse(e) => e.position,
        }
    }

    /// 生成带有源码标注的错误信息。
    pub fn to_snippet(&self, file: &SourceFile) -> String {
        let start = self.position().offset;
        match self {
            SyntaxError::Lex(e) => {
                let label = match e {
                    LexError::UnexpectedChar { .. } => "unrecognized character".to_string(),
                    LexError::IntegerOverflow { .. } => "integer literal is too large".to_string(),
                };
                file.snippet("lexical error", &label, start, start + e.len())
            }
            SyntaxError::Parse(e) => {
                let label = format!("expected {}", e.expected.join(" or "));
                file.snippet("syntax error", &label, start, start + 1)
            }
        }
    }
}

/// 分析整个程序。
pub fn parse(source: &str) -> Result<ast::Program, SyntaxError> {
    let tokens = lexer::lex(source)?;
    Ok(parser::parse(&tokens)?)
}

fn parse_all<T>(
    source: &str,
    production: impl FnOnce(&mut Parser) -> parser::PResult<T>,
) -> Result<T, SyntaxError> {
    let tokens = lexer::lex(source)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.attempt(|p| {
        let value = production(p)?;
        p.expect_eoi()?;
        Ok(value)
    });
    Ok(parser.finish(result)?)
}

/// 分析单个整数表达式。
pub fn parse_expression(source: &str) -> Result<ast::Expr, SyntaxError> {
    parse_all(source, |p| p.expression())
}

/// 分析单个走法正则表达式。
pub fn parse_regex(source: &str) -> Result<ast::Regex, SyntaxError> {
    parse_all(source, |p| p.regex())
}
