//! 对局引擎。

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use serde::Serialize;
use thiserror::Error;
use tracing::{trace, warn};

use crate::automaton::{nfa::StateId, Dfa, Letter};
use crate::options::Options;

use super::{
    eval::execute_effect, Board, EvalContext, EvalError, Evaluator, GameState, Move, PieceId,
    PlayerId, Rules, Scope, Value, Variables,
};

/// 引擎错误。
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("no move to undo")]
    EmptyMoveStack,

    #[error("no piece at ({x}, {y})")]
    EmptyTile { x: i64, y: i64 },

    #[error("failed to serialize the game: {0}")]
    Serialize(#[from] serde_json::Error),
}

type Result<T, E = EngineError> = std::result::Result<T, E>;

/// 撤销一个字母所需的信息。
#[derive(Debug, Clone)]
struct ChangeRecord {
    letter: Arc<Letter>,
    from: (i64, i64),
    displaced: Option<PieceId>,
    /// 执行副作用之前的变量与棋盘
    snapshot: Option<(Variables, Board)>,
}

/// 棋盘的 one-hot 表示，形状为 `[棋子种类, 宽, 高]`。
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRepresentation {
    /// 形状
    pub shape: [usize; 3],
    /// 按行优先展开的数据
    pub data: Vec<f32>,
}

impl BoardRepresentation {
    /// 读取一个元素。
    pub fn get(&self, piece: usize, x: usize, y: usize) -> f32 {
        let [_, width, height] = self.shape;
        debug_assert!(x < width);
        self.data[(piece * width + x) * height + y]
    }
}

#[derive(Serialize)]
struct GameView<'a> {
    player: &'a str,
    board: Vec<Vec<&'a str>>,
    moves: Vec<MoveView>,
}

#[derive(Serialize)]
struct MoveView {
    start: (i64, i64),
    letters: Vec<LetterView>,
}

#[derive(Serialize)]
struct LetterView {
    dx: i64,
    dy: i64,
    effect: Option<String>,
}

impl From<&Move> for MoveView {
    fn from(mv: &Move) -> Self {
        Self {
            start: mv.start,
            letters: mv
                .letters
                .iter()
                .map(|letter| LetterView {
                    dx: letter.dx,
                    dy: letter.dy,
                    effect: letter.effect.as_ref().map(|e| e.to_string()),
                })
                .collect(),
        }
    }
}

/// 一局对局。
///
/// 规则表是共享的，棋盘、变量与着法栈属于对局自身。
pub struct Game {
    rules: Arc<Rules>,
    board: Board,
    variables: Variables,
    turn: usize,
    changes: Vec<ChangeRecord>,
    moves: Vec<usize>,
    options: Options,
}

impl Game {
    /// 以规则表的初始局面开始一局。
    pub fn new(rules: Arc<Rules>, options: Options) -> Self {
        Self {
            board: rules.board.clone(),
            variables: rules.variables.clone(),
            rules,
            turn: 0,
            changes: Vec::new(),
            moves: Vec::new(),
            options,
        }
    }

    /// 规则表
    pub fn rules(&self) -> &Arc<Rules> {
        &self.rules
    }

    /// 当前棋盘
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// 当前变量
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// 读取变量。
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// 玩家名，按行棋顺序
    pub fn players(&self) -> &[String] {
        &self.rules.definitions.players
    }

    /// 玩家名
    pub fn player_name(&self, player: PlayerId) -> &str {
        &self.rules.definitions.players[player.0]
    }

    /// 先手玩家
    pub fn first_player(&self) -> PlayerId {
        PlayerId(0)
    }

    /// 当前行棋的玩家
    pub fn current_player(&self) -> PlayerId {
        PlayerId(self.turn)
    }

    /// 已执行的着法数
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    /// 生成当前玩家的全部着法。
    ///
    /// 着法按棋子位置（x 优先）与自动机中转移的声明顺序排列。
    /// 某个棋子的走法求值出错时，只放弃这个棋子的着法并记录警告。
    pub fn generate_moves(&mut self) -> Vec<Move> {
        let player = self.current_player();
        let owned: Vec<_> = self
            .board
            .pieces()
            .filter(|&(_, piece)| self.rules.definitions.owner(piece) == player)
            .collect();

        let mut moves = Vec::new();
        for (start, piece) in owned {
            let dfa = Arc::clone(&self.rules.pieces[piece.0].dfa);
            let (base, found) = (self.changes.len(), moves.len());
            let mut path = Vec::new();
            if let Err(e) = self.walk(&dfa, dfa.start(), start, start, &mut path, &mut moves) {
                warn!(
                    piece = %self.rules.pieces[piece.0].name,
                    x = start.0,
                    y = start.1,
                    "move generation aborted: {}",
                    e
                );
                moves.truncate(found);
                self.unwind(base);
            }
        }
        moves
    }

    fn walk(
        &mut self,
        dfa: &Dfa,
        state: StateId,
        position: (i64, i64),
        start: (i64, i64),
        path: &mut Vec<Arc<Letter>>,
        moves: &mut Vec<Move>,
    ) -> Result<()> {
        // an effect may have removed the piece itself
        let Some(piece) = self.board.get(position.0, position.1)? else {
            return Ok(());
        };
        if path.len() >= self.options.max_move_length {
            return Ok(());
        }
        let owner = self.rules.definitions.owner(piece);
        for (letter, target) in dfa.transitions(state) {
            let to = (position.0 + letter.dx, position.1 + letter.dy);
            if !self.precondition(letter, to, owner)? {
                continue;
            }
            path.push(Arc::clone(letter));
            if dfa.is_accepting(*target) {
                moves.push(Move {
                    start,
                    letters: path.clone(),
                });
            }
            self.apply_letter(position, letter)?;
            self.walk(dfa, *target, to, start, path, moves)?;
            self.undo_letter()?;
            path.pop();
        }
        Ok(())
    }

    /// 目标格在棋盘外时前置条件不成立。
    fn precondition(&self, letter: &Letter, to: (i64, i64), player: PlayerId) -> Result<bool> {
        if !self.board.contains(to.0, to.1) {
            return Ok(false);
        }
        Ok(self
            .evaluator(EvalContext::at(to.0, to.1, player))
            .truthy(&letter.precondition, &Scope::root())?)
    }

    fn evaluator(&self, context: EvalContext) -> Evaluator<'_> {
        Evaluator::new(&self.rules.definitions, &self.variables)
            .with_board(&self.board)
            .with_context(context)
    }

    /// 执行一个字母，返回棋子的新位置。
    ///
    /// 副作用失败时该字母不留下任何改变。
    fn apply_letter(&mut self, from: (i64, i64), letter: &Arc<Letter>) -> Result<(i64, i64)> {
        let to = (from.0 + letter.dx, from.1 + letter.dy);
        let piece = self
            .board
            .get(from.0, from.1)?
            .ok_or(EngineError::EmptyTile {
                x: from.0,
                y: from.1,
            })?;
        let displaced = self.board.get(to.0, to.1)?;
        self.board.set(from.0, from.1, None)?;
        self.board.set(to.0, to.1, Some(piece))?;

        let mut snapshot = None;
        if let Some(effect) = &letter.effect {
            let saved = (self.variables.clone(), self.board.clone());
            let context = EvalContext::at(to.0, to.1, self.rules.definitions.owner(piece));
            let result = execute_effect(
                &self.rules.definitions,
                &mut self.variables,
                &mut self.board,
                context,
                effect,
            );
            if let Err(e) = result {
                (self.variables, self.board) = saved;
                self.board.set(to.0, to.1, displaced)?;
                self.board.set(from.0, from.1, Some(piece))?;
                return Err(e.into());
            }
            snapshot = Some(saved);
        }

        self.changes.push(ChangeRecord {
            letter: Arc::clone(letter),
            from,
            displaced,
            snapshot,
        });
        Ok(to)
    }

    fn undo_letter(&mut self) -> Result<()> {
        let record = self.changes.pop().ok_or(EngineError::EmptyMoveStack)?;
        if let Some((variables, board)) = record.snapshot {
            self.variables = variables;
            self.board = board;
        }
        let (x, y) = record.from;
        let (tx, ty) = (x + record.letter.dx, y + record.letter.dy);
        let piece = self.board.get(tx, ty)?;
        self.board.set(tx, ty, record.displaced)?;
        self.board.set(x, y, piece)?;
        Ok(())
    }

    /// 撤销到只剩 `len` 条改变记录。
    fn unwind(&mut self, len: usize) {
        while self.changes.len() > len {
            if let Err(e) = self.undo_letter() {
                warn!("failed to undo a letter: {}", e);
                self.changes.truncate(len);
            }
        }
    }

    /// 执行一个着法并轮到下一位玩家。
    ///
    /// 任一字母失败时，已执行的字母全部撤销，局面保持不变。
    pub fn apply_move(&mut self, mv: &Move) -> Result<()> {
        let base = self.changes.len();
        let mut position = mv.start;
        for letter in &mv.letters {
            match self.apply_letter(position, letter) {
                Ok(to) => position = to,
                Err(e) => {
                    self.unwind(base);
                    return Err(e);
                }
            }
        }
        self.moves.push(mv.letters.len());
        if self.options.trace {
            trace!(player = %self.player_name(self.current_player()), "apply {}", mv);
        }
        self.turn = (self.turn + 1) % self.players().len().max(1);
        Ok(())
    }

    /// 撤销上一个着法。
    pub fn undo_move(&mut self) -> Result<()> {
        let length = self.moves.pop().ok_or(EngineError::EmptyMoveStack)?;
        for _ in 0..length {
            self.undo_letter()?;
        }
        let players = self.players().len().max(1);
        self.turn = (self.turn + players - 1) % players;
        if self.options.trace {
            trace!(player = %self.player_name(self.current_player()), "undo {} letters", length);
        }
        Ok(())
    }

    /// 撤销全部着法，回到初始局面。
    pub fn reset(&mut self) -> Result<()> {
        while !self.moves.is_empty() {
            self.undo_move()?;
        }
        Ok(())
    }

    /// 判定对局状态。
    ///
    /// 恰有一位玩家满足胜利条件时该玩家获胜；多位玩家同时满足，或当前玩家无着可走，为和局。
    pub fn evaluate_victory(&mut self) -> Result<GameState> {
        let mut winners = Vec::new();
        for (i, condition) in self.rules.definitions.victories.iter().enumerate() {
            let Some(condition) = condition else {
                continue;
            };
            let player = PlayerId(i);
            if self
                .evaluator(EvalContext::player(player))
                .truthy(condition, &Scope::root())?
            {
                winners.push(player);
            }
        }
        Ok(match winners.as_slice() {
            [winner] => GameState::Win(*winner),
            [] if !self.generate_moves().is_empty() => GameState::Unresolved,
            _ => GameState::Draw,
        })
    }

    /// 对局是否已结束。
    pub fn is_game_over(&mut self) -> Result<bool> {
        Ok(self.evaluate_victory()? != GameState::Unresolved)
    }

    /// 棋盘的 one-hot 表示。
    pub fn board_representation(&self) -> BoardRepresentation {
        let (width, height) = (self.board.width(), self.board.height());
        let shape = [self.rules.pieces.len(), width, height];
        let mut data = vec![0.0; shape.iter().product()];
        for ((x, y), piece) in self.board.pieces() {
            data[(piece.0 * width + x as usize) * height + y as usize] = 1.0;
        }
        BoardRepresentation { shape, data }
    }

    /// 以 JSON 输出当前玩家、棋盘与全部着法。
    ///
    /// 棋盘按 `[x][y]` 排列，空格为 `"None"`。
    pub fn serialize(&mut self) -> Result<serde_json::Value> {
        let moves = self.generate_moves();
        let board: Vec<Vec<&str>> = (0..self.board.width() as i64)
            .map(|x| {
                (0..self.board.height() as i64)
                    .map(|y| match self.board.get(x, y) {
                        Ok(Some(piece)) => self.rules.pieces[piece.0].name.as_str(),
                        _ => "None",
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        let view = GameView {
            player: self.player_name(self.current_player()),
            board,
            moves: moves.iter().map(MoveView::from).collect(),
        };
        Ok(serde_json::to_value(view)?)
    }

    /// 局面的哈希，包括棋盘、行棋方与变量。
    pub fn position_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.board.hash(&mut hasher);
        self.turn.hash(&mut hasher);
        self.variables.hash(&mut hasher);
        hasher.finish()
    }

    /// 统计 `depth` 层内的叶子局面数。
    pub fn perft(&mut self, depth: usize) -> Result<u64> {
        if depth == 0 {
            return Ok(1);
        }
        let moves = self.generate_moves();
        if depth == 1 {
            return Ok(moves.len() as u64);
        }
        let mut nodes = 0;
        for mv in &moves {
            self.apply_move(mv)?;
            nodes += self.perft(depth - 1)?;
            self.undo_move()?;
        }
        Ok(nodes)
    }
}
