//! 词法分析。

use std::fmt::Display;

use thiserror::Error;

/// 源文本中的位置。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// 字节偏移
    pub offset: usize,
    /// 行号，从 1 开始
    pub line: usize,
    /// 列号，从 1 开始
    pub column: usize,
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// 词法单元的种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// 整数
    Integer,
    /// 标识符或关键字
    Word,
    /// 括号 `()[]{}`
    Symbol,
    /// 运算符
    Operator,
    /// `,`
    Delimiter,
    /// `;`
    Eol,
    /// 输入结束
    Eoi,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenKind::Integer => "integer",
            TokenKind::Word => "word",
            TokenKind::Symbol => "symbol",
            TokenKind::Operator => "operator",
            TokenKind::Delimiter => "`,`",
            TokenKind::Eol => "`;`",
            TokenKind::Eoi => "end of input",
        };
        f.write_str(name)
    }
}

/// 词法单元。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// 种类
    pub kind: TokenKind,
    /// 原文
    pub literal: String,
    /// 起始位置
    pub position: Position,
}

impl Token {
    /// 词法单元结束处的字节偏移。
    pub fn end(&self) -> usize {
        self.position.offset + self.literal.len()
    }

    /// 是否为给定种类与原文的词法单元。
    pub fn is(&self, kind: TokenKind, literal: &str) -> bool {
        self.kind == kind && self.literal == literal
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Eoi => write!(f, "end of input"),
            _ => write!(f, "`{}`", self.literal),
        }
    }
}

/// 词法错误。
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unrecognized character `{found}` at {position}")]
    UnexpectedChar { found: char, position: Position },

    #[error("integer literal `{literal}` is too large at {position}")]
    IntegerOverflow { literal: String, position: Position },
}

impl LexError {
    /// 错误的位置。
    pub fn position(&self) -> Position {
        match self {
            LexError::UnexpectedChar { position, .. } => *position,
            LexError::IntegerOverflow { position, .. } => *position,
        }
    }

    /// 错误覆盖的字节长度。
    pub fn len(&self) -> usize {
        match self {
            LexError::UnexpectedChar { found, .. } => found.len_utf8(),
            LexError::IntegerOverflow { literal, .. } => literal.len(),
        }
    }
}

/// Longest operators first.
const OPERATORS: &[&str] = &[
    "==", "!=", "&&", "||", "//", "<=", ">=", "=", "!", "|", "*", "+", "-", "/", "%", "?", ".",
    "<", ">",
];

struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self, len: usize) -> &'a str {
        let text = &self.source[self.offset..self.offset + len];
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += len;
        text
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let len = self
            .rest()
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(self.rest().len(), |(i, _)| i);
        self.bump(len)
    }

    fn token(&mut self, kind: TokenKind, len: usize) -> Token {
        let position = self.position();
        let literal = self.bump(len).to_string();
        Token {
            kind,
            literal,
            position,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        loop {
            self.take_while(char::is_whitespace);
            if self.rest().starts_with('#') {
                self.take_while(|c| c != '\n');
            } else {
                break;
            }
        }

        let Some(c) = self.rest().chars().next() else {
            return Ok(None);
        };
        let position = self.position();

        let token = if c.is_ascii_digit() {
            let literal = self.take_while(|c| c.is_ascii_digit());
            if literal.parse::<i64>().is_err() {
                return Err(LexError::IntegerOverflow {
                    literal: literal.to_string(),
                    position,
                });
            }
            Token {
                kind: TokenKind::Integer,
                literal: literal.to_string(),
                position,
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let literal = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            Token {
                kind: TokenKind::Word,
                literal: literal.to_string(),
                position,
            }
        } else if "()[]{}".contains(c) {
            self.token(TokenKind::Symbol, 1)
        } else if c == ',' {
            self.token(TokenKind::Delimiter, 1)
        } else if c == ';' {
            self.token(TokenKind::Eol, 1)
        } else if let Some(op) = OPERATORS.iter().find(|op| self.rest().starts_with(**op)) {
            self.token(TokenKind::Operator, op.len())
        } else {
            return Err(LexError::UnexpectedChar { found: c, position });
        };

        Ok(Some(token))
    }
}

/// 将源文本切分为词法单元，末尾总是 `Eoi`。
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    tokens.push(Token {
        kind: TokenKind::Eoi,
        literal: String::new(),
        position: lexer.position(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        lex(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.literal))
            .collect()
    }

    #[test]
    fn lex_declaration() {
        use TokenKind::*;
        assert_eq!(
            kinds("players = white, black;"),
            vec![
                (Word, "players".into()),
                (Operator, "=".into()),
                (Word, "white".into()),
                (Delimiter, ",".into()),
                (Word, "black".into()),
                (Eol, ";".into()),
                (Eoi, "".into()),
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        let tokens = kinds("a==b//c<=d|e");
        let ops: Vec<_> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::Operator)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(ops, vec!["==", "//", "<=", "|"]);
    }

    #[test]
    fn comments_and_positions() {
        let tokens = lex("# header\nrule  P").unwrap();
        assert_eq!(tokens[0].literal, "rule");
        assert_eq!(tokens[0].position.line, 2);
        assert_eq!(tokens[0].position.column, 1);
        assert_eq!(tokens[1].position.column, 7);
        assert!(tokens
            .windows(2)
            .all(|w| w[0].position.offset < w[1].position.offset));
    }

    #[test]
    fn letter_with_effect() {
        use TokenKind::*;
        let tokens = kinds("(-1,0,empty){kill(1)}*");
        assert_eq!(tokens[1], (Operator, "-".into()));
        assert_eq!(tokens[8], (Symbol, "{".into()));
        assert_eq!(tokens[tokens.len() - 2], (Operator, "*".into()));
    }

    #[test]
    fn unexpected_character() {
        let err = lex("players = a$;").unwrap_err();
        assert_eq!(
            err,
            LexError::UnexpectedChar {
                found: '$',
                position: Position {
                    offset: 11,
                    line: 1,
                    column: 12
                }
            }
        );
    }

    #[test]
    fn single_ampersand_is_rejected() {
        assert!(matches!(
            lex("a & b"),
            Err(LexError::UnexpectedChar { found: '&', .. })
        ));
    }

    #[test]
    fn integer_overflow() {
        assert!(matches!(
            lex("99999999999999999999"),
            Err(LexError::IntegerOverflow { .. })
        ));
    }
}
