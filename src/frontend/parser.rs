//! 语法分析

use thiserror::Error;

use super::ast::{
    Assignment, BoardDecl, Cell, Declaration, Effect, Expr, Macro, PieceDecl, PieceRule,
    Predicate, Program, VariableDecl, Victory,
};
use super::lexer::{Position, Token, TokenKind};
use crate::utils::Span;

/// 语法错误：在 `position` 处期望 `expected`，实际遇到 `found`。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {}, found {found} at {position}", .expected.join(" or "))]
pub struct ParseError {
    /// 位置
    pub position: Position,
    /// 期望的语法成分
    pub expected: Vec<String>,
    /// 实际遇到的词法单元
    pub found: String,
}

impl ParseError {
    fn merge(&mut self, other: &ParseError) {
        for expected in &other.expected {
            if !self.expected.contains(expected) {
                self.expected.push(expected.clone());
            }
        }
    }
}

pub(crate) type PResult<T> = Result<T, ParseError>;

static END: Token = Token {
    kind: TokenKind::Eoi,
    literal: String::new(),
    position: Position {
        offset: 0,
        line: 1,
        column: 1,
    },
};

/// 回溯式递归下降分析器。
///
/// 每个产生式要么成功并前移游标，要么恢复游标并返回 `ParseError`，
/// 以便调用者尝试其他候选。分析器记录到达过的最远失败位置。
pub struct Parser<'t> {
    tokens: &'t [Token],
    cursor: usize,
    furthest: Option<ParseError>,
}

impl<'t> Parser<'t> {
    /// 创建一个新的 `Parser`。
    pub fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            cursor: 0,
            furthest: None,
        }
    }

    pub(crate) fn peek(&self) -> &'t Token {
        self.tokens
            .get(self.cursor)
            .or_else(|| self.tokens.last())
            .unwrap_or(&END)
    }

    fn advance(&mut self) -> &'t Token {
        let token = self.peek();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    /// 上一个被消耗的词法单元结束处的偏移。
    fn last_end(&self) -> usize {
        match self.cursor.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(token) => token.end(),
            None => 0,
        }
    }

    /// 在当前位置构造失败，并记录最远失败。
    pub(crate) fn fail(&mut self, expected: &str) -> ParseError {
        let token = self.peek();
        let error = ParseError {
            position: token.position,
            expected: vec![expected.to_string()],
            found: token.to_string(),
        };
        let replace = match &mut self.furthest {
            Some(furthest) if furthest.position.offset > error.position.offset => false,
            Some(furthest) if furthest.position.offset == error.position.offset => {
                furthest.merge(&error);
                false
            }
            _ => true,
        };
        if replace {
            self.furthest = Some(error.clone());
        }
        error
    }

    /// 尝试一个产生式，失败时恢复游标。
    pub(crate) fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = self.cursor;
        let result = f(self);
        if result.is_err() {
            self.cursor = saved;
        }
        result
    }

    /// 重复一个产生式直到失败。
    pub(crate) fn many<T>(&mut self, mut f: impl FnMut(&mut Self) -> PResult<T>) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.attempt(&mut f) {
            items.push(item);
        }
        items
    }

    /// `f (',' f)*`
    pub(crate) fn separated<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> PResult<T>,
    ) -> PResult<Vec<T>> {
        self.attempt(|p| {
            let mut items = vec![f(p)?];
            items.extend(p.many(|p| {
                p.expect_delimiter()?;
                f(p)
            }));
            Ok(items)
        })
    }

    /// 为产生式的结果附上源码位置。
    pub(crate) fn spanned<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<Span<T>> {
        let start = self.peek().position.offset;
        let inner = self.attempt(f)?;
        Ok(Span::new(inner, start, self.last_end().max(start)))
    }

    fn expect(&mut self, kind: TokenKind, literal: Option<&str>) -> PResult<&'t Token> {
        let token = self.peek();
        let matched = token.kind == kind && literal.map_or(true, |l| token.literal == l);
        if matched {
            Ok(self.advance())
        } else {
            let expected = match literal {
                Some(literal) => format!("`{}`", literal),
                None => kind.to_string(),
            };
            Err(self.fail(&expected))
        }
    }

    pub(crate) fn expect_word(&mut self) -> PResult<String> {
        Ok(self.expect(TokenKind::Word, None)?.literal.clone())
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> PResult<()> {
        self.expect(TokenKind::Word, Some(keyword)).map(|_| ())
    }

    pub(crate) fn expect_symbol(&mut self, symbol: &str) -> PResult<()> {
        self.expect(TokenKind::Symbol, Some(symbol)).map(|_| ())
    }

    pub(crate) fn expect_operator(&mut self, op: &str) -> PResult<()> {
        self.expect(TokenKind::Operator, Some(op)).map(|_| ())
    }

    pub(crate) fn expect_delimiter(&mut self) -> PResult<()> {
        self.expect(TokenKind::Delimiter, None).map(|_| ())
    }

    pub(crate) fn expect_eol(&mut self) -> PResult<()> {
        self.expect(TokenKind::Eol, None).map(|_| ())
    }

    pub(crate) fn expect_eoi(&mut self) -> PResult<()> {
        self.expect(TokenKind::Eoi, None).map(|_| ())
    }

    pub(crate) fn expect_integer(&mut self) -> PResult<i64> {
        let token = self.expect(TokenKind::Integer, None)?;
        // The lexer already rejected literals that do not fit.
        token.literal.parse().map_err(|_| {
            self.cursor -= 1;
            self.fail("integer")
        })
    }

    /// 结束分析：失败时报告最远的失败位置。
    pub fn finish<T>(self, result: PResult<T>) -> Result<T, ParseError> {
        result.map_err(|error| self.furthest.unwrap_or(error))
    }

    /// `name (',' name)*`
    fn names(&mut self) -> PResult<Vec<String>> {
        self.separated(|p| p.expect_word())
    }

    /// `'(' names? ')'`
    fn params(&mut self) -> PResult<Vec<String>> {
        self.attempt(|p| {
            p.expect_symbol("(")?;
            let params = p.names().unwrap_or_default();
            p.expect_symbol(")")?;
            Ok(params)
        })
    }

    fn players(&mut self) -> PResult<Vec<Span<String>>> {
        self.attempt(|p| {
            p.expect_keyword("players")?;
            p.expect_operator("=")?;
            let players = p.separated(|p| p.spanned(|p| p.expect_word()))?;
            p.expect_eol()?;
            Ok(players)
        })
    }

    fn piece(&mut self) -> PResult<PieceDecl> {
        self.attempt(|p| {
            let name = p.expect_word()?;
            p.expect_symbol("(")?;
            let owner = p.expect_word()?;
            p.expect_symbol(")")?;
            Ok(PieceDecl { name, owner })
        })
    }

    fn pieces(&mut self) -> PResult<Vec<Span<PieceDecl>>> {
        self.attempt(|p| {
            p.expect_keyword("pieces")?;
            p.expect_operator("=")?;
            let pieces = p.separated(|p| p.spanned(|p| p.piece()))?;
            p.expect_eol()?;
            Ok(pieces)
        })
    }

    fn rule(&mut self) -> PResult<Declaration> {
        self.attempt(|p| {
            p.expect_keyword("rule")?;
            let piece = p.expect_word()?;
            p.expect_operator("=")?;
            let regex = p.regex()?;
            p.expect_eol()?;
            Ok(Declaration::Rule(PieceRule { piece, regex }))
        })
    }

    fn macro_decl(&mut self) -> PResult<Declaration> {
        self.attempt(|p| {
            p.expect_keyword("macro")?;
            let name = p.expect_word()?;
            let params = p.params()?;
            p.expect_operator("=")?;
            let body = p.regex()?;
            p.expect_eol()?;
            Ok(Declaration::Macro(Macro { name, params, body }))
        })
    }

    /// `'{' 'return' expr ';' '}' ';'`
    fn return_block(&mut self) -> PResult<Expr> {
        self.attempt(|p| {
            p.expect_symbol("{")?;
            p.expect_keyword("return")?;
            let expr = p.expression()?;
            p.expect_eol()?;
            p.expect_symbol("}")?;
            p.expect_eol()?;
            Ok(expr)
        })
    }

    fn predicate(&mut self) -> PResult<Declaration> {
        self.attempt(|p| {
            p.expect_keyword("predicate")?;
            let name = p.expect_word()?;
            let params = p.params()?;
            let body = p.return_block()?;
            Ok(Declaration::Predicate(Predicate { name, params, body }))
        })
    }

    /// `target ('[' expr ']')* '=' expr ';'`
    fn assignment(&mut self) -> PResult<Assignment> {
        self.attempt(|p| {
            let target = p.expect_word()?;
            let indices = p.many(|p| {
                p.expect_symbol("[")?;
                let index = p.expression()?;
                p.expect_symbol("]")?;
                Ok(index)
            });
            p.expect_operator("=")?;
            let value = p.expression()?;
            p.expect_eol()?;
            Ok(Assignment {
                target,
                indices,
                value,
            })
        })
    }

    fn effect(&mut self) -> PResult<Declaration> {
        self.attempt(|p| {
            p.expect_keyword("effect")?;
            let name = p.expect_word()?;
            let params = p.params()?;
            p.expect_symbol("{")?;
            let assignments = p.many(|p| p.assignment());
            p.expect_symbol("}")?;
            p.expect_eol()?;
            Ok(Declaration::Effect(Effect {
                name,
                params,
                assignments,
            }))
        })
    }

    fn variable_decl(&mut self) -> PResult<Declaration> {
        self.attempt(|p| {
            p.expect_keyword("variable")?;
            let name = p.expect_word()?;
            p.expect_operator("=")?;
            let value = p.expression()?;
            p.expect_eol()?;
            Ok(Declaration::Variable(VariableDecl { name, value }))
        })
    }

    fn victory(&mut self) -> PResult<Declaration> {
        self.attempt(|p| {
            p.expect_keyword("victory")?;
            let player = p.expect_word()?;
            let condition = p.return_block()?;
            Ok(Declaration::Victory(Victory { player, condition }))
        })
    }

    fn declaration(&mut self) -> PResult<Declaration> {
        let keyword = self.peek();
        if keyword.kind != TokenKind::Word {
            return Err(self.fail("declaration"));
        }
        match keyword.literal.as_str() {
            "rule" => self.rule(),
            "macro" => self.macro_decl(),
            "predicate" => self.predicate(),
            "effect" => self.effect(),
            "variable" => self.variable_decl(),
            "victory" => self.victory(),
            _ => Err(self.fail("declaration")),
        }
    }

    fn cell(&mut self) -> PResult<Cell> {
        self.attempt(|p| {
            let name = p.expect_word()?;
            if name == "None" {
                return Ok(Cell::Empty);
            }
            let owner = p
                .attempt(|p| {
                    p.expect_symbol("(")?;
                    let owner = p.expect_word()?;
                    p.expect_symbol(")")?;
                    Ok(owner)
                })
                .ok();
            Ok(Cell::Piece { name, owner })
        })
    }

    fn board(&mut self) -> PResult<BoardDecl> {
        self.attempt(|p| {
            p.expect_keyword("board_size")?;
            p.expect_operator("=")?;
            let width = p.expect_integer()?;
            p.expect_delimiter()?;
            let height = p.expect_integer()?;
            p.expect_eol()?;
            p.expect_keyword("board")?;
            p.expect_operator("=")?;
            let cells = p.separated(|p| p.spanned(|p| p.cell()))?;
            p.expect_eol()?;
            Ok(BoardDecl {
                width,
                height,
                cells,
            })
        })
    }

    /// 整个程序。
    pub fn program(&mut self) -> PResult<Program> {
        self.attempt(|p| {
            let players = p.players()?;
            let pieces = p.pieces()?;
            let declarations = p.many(|p| p.spanned(|p| p.declaration()));
            let board = p.spanned(|p| p.board())?;
            p.expect_eoi()?;
            Ok(Program {
                players,
                pieces,
                declarations,
                board,
            })
        })
    }
}

/// 从词法单元分析出程序。
pub fn parse(tokens: &[Token]) -> Result<Program, ParseError> {
    let mut parser = Parser::new(tokens);
    let result = parser.program();
    parser.finish(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{Expr, Precondition, Regex};
    use crate::frontend::lexer::lex;

    fn parse_str(source: &str) -> Result<Program, ParseError> {
        parse(&lex(source).unwrap())
    }

    const PROGRAM: &str = r#"
        players = white, black;
        pieces = Pawn(white), Rook(black);
        variable moves = 0;
        predicate forward(n) { return this.y + n < 8; };
        effect count(n) { moves = moves + n; counter[this.x] = 1; };
        macro Slide(dx, dy) = (dx, dy, empty)*(dx, dy, enemy)?;
        rule Pawn = (0, 1, empty){count(1)} | (1, 1, enemy);
        rule Rook = Slide(1, 0);
        victory white { return moves > 3; };
        board_size = 2, 2;
        board = Rook, None, Pawn(white), None;
    "#;

    #[test]
    fn parse_full_program() {
        let program = parse_str(PROGRAM).unwrap();
        assert_eq!(program.players.len(), 2);
        assert_eq!(*program.players[1], "black");
        assert_eq!(program.pieces[0].owner, "white");
        assert_eq!(program.declarations.len(), 7);
        assert_eq!(program.rules().count(), 2);
        assert_eq!(program.board.width, 2);
        assert_eq!(program.board.cells.len(), 4);
        assert_eq!(*program.board.cells[1], Cell::Empty);
        assert_eq!(
            *program.board.cells[2],
            Cell::Piece {
                name: "Pawn".into(),
                owner: Some("white".into())
            }
        );

        let Declaration::Effect(effect) = program.declarations[2].as_ref() else {
            panic!("expected effect");
        };
        assert_eq!(effect.assignments.len(), 2);
        assert_eq!(effect.assignments[1].target, "counter");
        assert_eq!(effect.assignments[1].indices.len(), 1);

        let pawn = program.rules().next().unwrap();
        let Regex::Union(left, _) = &pawn.regex else {
            panic!("expected union");
        };
        let Regex::Letter(letter) = left.as_ref() else {
            panic!("expected letter");
        };
        assert_eq!(letter.dx, Expr::Literal(0));
        assert_eq!(letter.precondition, Precondition::Named("empty".into()));
        assert_eq!(letter.effect.as_ref().unwrap().name, "count");
    }

    #[test]
    fn declaration_spans_cover_source() {
        let program = parse_str(PROGRAM).unwrap();
        let span = &program.declarations[0];
        assert_eq!(&PROGRAM[span.start..span.end], "variable moves = 0;");
    }

    #[test]
    fn variable_declaration_is_not_an_expression() {
        let program = parse_str(PROGRAM).unwrap();
        let Declaration::Variable(v) = program.declarations[0].as_ref() else {
            panic!("expected variable");
        };
        assert_eq!(v.name, "moves");
        assert_eq!(v.value, Expr::Literal(0));
    }

    #[test]
    fn display_reparses() {
        let program = parse_str(PROGRAM).unwrap();
        let printed = program.to_string();
        let reparsed = parse_str(&printed).unwrap();
        assert_eq!(reparsed.to_string(), printed);
    }

    #[test]
    fn missing_semicolon_reports_furthest_position() {
        let err = parse_str("players = a;\npieces = P(a)\nboard_size = 1, 1; board = P;")
            .unwrap_err();
        assert_eq!(err.position.line, 3);
        assert!(err.expected.contains(&"`;`".to_string()));
        assert_eq!(err.found, "`board_size`");
    }

    #[test]
    fn board_is_required() {
        let err = parse_str("players = a; pieces = P(a);").unwrap_err();
        assert_eq!(err.found, "end of input");
    }

    #[test]
    fn empty_parameter_list() {
        let program = parse_str(
            "players = a; pieces = P(a); predicate always() { return 1; }; \
             board_size = 1, 1; board = P;",
        )
        .unwrap();
        let Declaration::Predicate(p) = program.declarations[0].as_ref() else {
            panic!("expected predicate");
        };
        assert!(p.params.is_empty());
    }
}
