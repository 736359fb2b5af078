//! 由 `Pattern` 构造 NFA。

use std::sync::Arc;

use super::{Letter, Pattern};

/// 状态编号，即状态在 arena 中的下标。
pub type StateId = usize;

/// 转移标签，`None` 为 ε。
pub type Label = Option<Arc<Letter>>;

#[derive(Debug, Clone, Default)]
struct State {
    out: Vec<(StateId, Label)>,
    inc: Vec<(StateId, Label)>,
}

/// 以 arena 存放状态的 NFA。
///
/// 被合并掉的状态留下空位，编号不会复用。
#[derive(Debug, Clone)]
pub struct Nfa {
    states: Vec<Option<State>>,
    start: StateId,
    accept: StateId,
}

struct Fragment {
    start: StateId,
    end: StateId,
}

fn push_unique(edges: &mut Vec<(StateId, Label)>, edge: (StateId, Label)) {
    if !edges.contains(&edge) {
        edges.push(edge);
    }
}

fn dedup_in_order(edges: &mut Vec<(StateId, Label)>) {
    let mut kept: Vec<(StateId, Label)> = Vec::with_capacity(edges.len());
    for edge in edges.drain(..) {
        push_unique(&mut kept, edge);
    }
    *edges = kept;
}

impl Nfa {
    /// 由展开后的走法构造 NFA。
    pub fn build(pattern: &Pattern) -> Self {
        let mut nfa = Nfa {
            states: Vec::new(),
            start: 0,
            accept: 0,
        };
        let fragment = nfa.fragment(pattern);
        nfa.start = fragment.start;
        nfa.accept = fragment.end;
        nfa
    }

    fn fragment(&mut self, pattern: &Pattern) -> Fragment {
        match pattern {
            Pattern::Letter(letter) => {
                let start = self.add_state();
                let end = self.add_state();
                self.add_transition(start, end, Some(Arc::new(letter.clone())));
                Fragment { start, end }
            }
            Pattern::Concat(left, right) => {
                let left = self.fragment(left);
                let right = self.fragment(right);
                self.merge_states(left.end, right.start);
                Fragment {
                    start: left.start,
                    end: right.end,
                }
            }
            Pattern::Union(left, right) => {
                let left = self.fragment(left);
                let right = self.fragment(right);
                let start = self.add_state();
                self.add_transition(start, left.start, None);
                self.add_transition(start, right.start, None);
                let end = self.merge_states(left.end, right.end);
                Fragment { start, end }
            }
            Pattern::Star(inner) => {
                let inner = self.fragment(inner);
                let end = self.add_state();
                self.add_transition(inner.end, end, None);
                // a start with incoming loops must not become the loop state
                let entry = if self.incoming(inner.start).is_empty() {
                    inner.start
                } else {
                    let entry = self.add_state();
                    self.add_transition(entry, inner.start, None);
                    entry
                };
                let start = self.merge_states(entry, inner.end);
                Fragment { start, end }
            }
            Pattern::Plus(inner) => {
                let inner = self.fragment(inner);
                let end = self.add_state();
                self.add_transition(inner.end, inner.start, None);
                self.add_transition(inner.end, end, None);
                Fragment {
                    start: inner.start,
                    end,
                }
            }
            Pattern::Optional(inner) => {
                let inner = self.fragment(inner);
                if self.incoming(inner.start).is_empty() {
                    self.add_transition(inner.start, inner.end, None);
                    return inner;
                }
                let start = self.add_state();
                self.add_transition(start, inner.start, None);
                self.add_transition(start, inner.end, None);
                Fragment {
                    start,
                    end: inner.end,
                }
            }
        }
    }

    /// 新建一个孤立状态。
    pub fn add_state(&mut self) -> StateId {
        self.states.push(Some(State::default()));
        self.states.len() - 1
    }

    /// 添加一条转移，相同端点与标签的转移只保留一条。
    pub fn add_transition(&mut self, from: StateId, to: StateId, label: Label) {
        if let Some(state) = self.states[from].as_mut() {
            push_unique(&mut state.out, (to, label.clone()));
        }
        if let Some(state) = self.states[to].as_mut() {
            push_unique(&mut state.inc, (from, label));
        }
    }

    /// 把 `a` 与 `b` 合并为一个新状态并返回它。
    ///
    /// 两者之间的转移成为新状态上的自环；`start` 与 `accept` 随之更新。
    pub fn merge_states(&mut self, a: StateId, b: StateId) -> StateId {
        if a == b {
            return a;
        }
        let merged = self.add_state();
        let redirect = |id: StateId| if id == a || id == b { merged } else { id };

        let mut fused = State::default();
        for old in [self.states[a].take(), self.states[b].take()]
            .into_iter()
            .flatten()
        {
            for (to, label) in old.out {
                push_unique(&mut fused.out, (redirect(to), label));
            }
            for (from, label) in old.inc {
                push_unique(&mut fused.inc, (redirect(from), label));
            }
        }

        // neighbours keep their edge order, only the endpoint changes
        let mut neighbours: Vec<StateId> = fused
            .out
            .iter()
            .chain(&fused.inc)
            .map(|(id, _)| *id)
            .filter(|&id| id != merged)
            .collect();
        neighbours.sort_unstable();
        neighbours.dedup();
        for id in neighbours {
            if let Some(state) = self.states[id].as_mut() {
                for (to, _) in state.out.iter_mut() {
                    *to = redirect(*to);
                }
                for (from, _) in state.inc.iter_mut() {
                    *from = redirect(*from);
                }
                dedup_in_order(&mut state.out);
                dedup_in_order(&mut state.inc);
            }
        }
        self.states[merged] = Some(fused);

        if self.start == a || self.start == b {
            self.start = merged;
        }
        if self.accept == a || self.accept == b {
            self.accept = merged;
        }
        merged
    }

    /// 初始状态
    pub fn start(&self) -> StateId {
        self.start
    }

    /// 接受状态
    pub fn accept(&self) -> StateId {
        self.accept
    }

    /// arena 的大小，含已合并掉的空位。
    pub fn capacity(&self) -> usize {
        self.states.len()
    }

    /// 存活的状态数
    pub fn len(&self) -> usize {
        self.states.iter().flatten().count()
    }

    /// 是否没有任何状态
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 状态是否存活
    pub fn is_live(&self, id: StateId) -> bool {
        matches!(self.states.get(id), Some(Some(_)))
    }

    /// 状态的出边，按添加顺序。
    pub fn transitions(&self, id: StateId) -> &[(StateId, Label)] {
        match self.states.get(id) {
            Some(Some(state)) => &state.out,
            _ => &[],
        }
    }

    /// 状态的入边
    pub fn incoming(&self, id: StateId) -> &[(StateId, Label)] {
        match self.states.get(id) {
            Some(Some(state)) => &state.inc,
            _ => &[],
        }
    }
}
