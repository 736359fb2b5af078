//! 子集构造：NFA 到 DFA。

use std::{collections::HashMap, fmt::Display, sync::Arc};

use indexmap::IndexMap;

use super::nfa::{Nfa, StateId};
use super::Letter;

/// DFA 状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfaState {
    transitions: Vec<(Arc<Letter>, StateId)>,
    accepting: bool,
}

/// 确定性的走法自动机。
///
/// 每个状态对同一字母至多有一条出边；出边按字母在规则中首次出现的顺序排列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dfa {
    states: Vec<DfaState>,
    start: StateId,
}

/// NFA 状态集合，以位图表示。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateSet(Vec<u64>);

impl StateSet {
    fn new(len: usize) -> Self {
        Self(vec![0; (len + 63) / 64])
    }

    /// 插入，返回此前是否不在集合中。
    fn insert(&mut self, id: usize) -> bool {
        let (word, bit) = (id / 64, 1u64 << (id % 64));
        let fresh = self.0[word] & bit == 0;
        self.0[word] |= bit;
        fresh
    }

    fn contains(&self, id: usize) -> bool {
        self.0
            .get(id / 64)
            .map_or(false, |word| word & (1u64 << (id % 64)) != 0)
    }
}

/// 按深度优先顺序重新编号后的 NFA。
struct Numbered<'a> {
    nfa: &'a Nfa,
    order: Vec<StateId>,
    index: HashMap<StateId, usize>,
}

impl<'a> Numbered<'a> {
    fn new(nfa: &'a Nfa) -> Self {
        let mut order = Vec::new();
        let mut index = HashMap::new();
        let mut stack = vec![nfa.start()];
        while let Some(id) = stack.pop() {
            if index.contains_key(&id) {
                continue;
            }
            index.insert(id, order.len());
            order.push(id);
            // reversed so that the first transition is visited first
            for (to, _) in nfa.transitions(id).iter().rev() {
                if !index.contains_key(to) {
                    stack.push(*to);
                }
            }
        }
        Self { nfa, order, index }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    /// ε 闭包，成员按加入顺序排列。
    fn closure(&self, seeds: impl IntoIterator<Item = usize>) -> (StateSet, Vec<usize>) {
        let mut set = StateSet::new(self.len());
        let mut members = Vec::new();
        let mut stack = Vec::new();
        for seed in seeds {
            if set.insert(seed) {
                members.push(seed);
                stack.push(seed);
            }
        }
        while let Some(member) = stack.pop() {
            for (to, label) in self.nfa.transitions(self.order[member]) {
                if label.is_some() {
                    continue;
                }
                let to = self.index[to];
                if set.insert(to) {
                    members.push(to);
                    stack.push(to);
                }
            }
        }
        (set, members)
    }
}

struct Builder<'a> {
    nfa: Numbered<'a>,
    accept: usize,
    memo: HashMap<StateSet, StateId>,
    states: Vec<DfaState>,
}

impl Builder<'_> {
    fn build_state(&mut self, seeds: Vec<usize>) -> StateId {
        let (set, members) = self.nfa.closure(seeds);
        if let Some(&id) = self.memo.get(&set) {
            return id;
        }
        let id = self.states.len();
        self.states.push(DfaState {
            transitions: Vec::new(),
            accepting: set.contains(self.accept),
        });
        self.memo.insert(set, id);

        let mut moves: IndexMap<Arc<Letter>, Vec<usize>> = IndexMap::new();
        for member in members {
            for (to, label) in self.nfa.nfa.transitions(self.nfa.order[member]) {
                if let Some(letter) = label {
                    moves
                        .entry(letter.clone())
                        .or_default()
                        .push(self.nfa.index[to]);
                }
            }
        }
        for (letter, targets) in moves {
            let target = self.build_state(targets);
            self.states[id].transitions.push((letter, target));
        }
        id
    }
}

impl Dfa {
    /// 不接受任何着法的 DFA，用于没有走法的棋子。
    pub fn empty() -> Self {
        Self {
            states: vec![DfaState {
                transitions: Vec::new(),
                accepting: false,
            }],
            start: 0,
        }
    }

    /// 子集构造。
    pub fn from_nfa(nfa: &Nfa) -> Self {
        let numbered = Numbered::new(nfa);
        let accept = match numbered.index.get(&nfa.accept()) {
            Some(&accept) => accept,
            // unreachable accept state: only the empty language remains
            None => numbered.len(),
        };
        let mut builder = Builder {
            nfa: numbered,
            accept,
            memo: HashMap::new(),
            states: Vec::new(),
        };
        let start = builder.build_state(vec![0]);
        Self {
            states: builder.states,
            start,
        }
    }

    /// 初始状态
    pub fn start(&self) -> StateId {
        self.start
    }

    /// 状态数
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// 总是至少有一个状态。
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// 是否为接受状态
    pub fn is_accepting(&self, id: StateId) -> bool {
        self.states[id].accepting
    }

    /// 出边
    pub fn transitions(&self, id: StateId) -> &[(Arc<Letter>, StateId)] {
        &self.states[id].transitions
    }
}

impl Display for Dfa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (id, state) in self.states.iter().enumerate() {
            write!(f, "{}", id)?;
            if id == self.start {
                write!(f, " start")?;
            }
            if state.accepting {
                write!(f, " accept")?;
            }
            writeln!(f)?;
            for (letter, to) in &state.transitions {
                writeln!(f, "  {} -> {}", letter, to)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::automaton::{Pattern, Resolver};
    use crate::frontend::parse_regex;
    use crate::runtime::{Definitions, Variables};

    fn compile(source: &str) -> Dfa {
        let definitions = Definitions::default();
        let variables = Variables::new();
        let pattern = Resolver::new(&definitions, &variables)
            .compile(&parse_regex(source).unwrap())
            .unwrap();
        Dfa::from_nfa(&Nfa::build(&pattern))
    }

    fn assert_deterministic(dfa: &Dfa) {
        for id in 0..dfa.len() {
            let mut seen = HashSet::new();
            for (letter, _) in dfa.transitions(id) {
                assert!(seen.insert(letter.clone()), "duplicate letter {}", letter);
            }
        }
    }

    /// `x`, `y`, `z` stand for the offsets `(1, 0)`, `(0, 1)`, `(1, 1)`.
    fn accepts(dfa: &Dfa, word: &str) -> bool {
        let mut state = dfa.start();
        for c in word.chars() {
            let offset = match c {
                'x' => (1, 0),
                'y' => (0, 1),
                _ => (1, 1),
            };
            match dfa
                .transitions(state)
                .iter()
                .find(|(l, _)| (l.dx, l.dy) == offset)
            {
                Some((_, to)) => state = *to,
                None => return false,
            }
        }
        dfa.is_accepting(state)
    }

    fn assert_language(source: &str, accepted: &[&str], rejected: &[&str]) {
        let dfa = compile(source);
        assert_deterministic(&dfa);
        for word in accepted {
            assert!(accepts(&dfa, word), "{} should accept {:?}", source, word);
        }
        for word in rejected {
            assert!(!accepts(&dfa, word), "{} should reject {:?}", source, word);
        }
    }

    const X: &str = "(1, 0, empty)";
    const Y: &str = "(0, 1, empty)";
    const Z: &str = "(1, 1, empty)";

    #[test]
    fn star_of_plus_needs_whole_words() {
        assert_language(
            &format!("({}+{})*", X, Y),
            &["", "xy", "xxy", "xyxxy"],
            &["x", "xx", "y", "xyx"],
        );
    }

    #[test]
    fn star_of_star_needs_whole_words() {
        assert_language(
            &format!("({}*{})*", X, Y),
            &["", "y", "xy", "yy", "xxyxy"],
            &["x", "xyx", "yx"],
        );
    }

    #[test]
    fn plus_of_union_then_letter() {
        assert_language(
            &format!("({}|{})+{}", X, Y, Z),
            &["xz", "yz", "xyxz"],
            &["", "z", "x", "xzz"],
        );
    }

    #[test]
    fn star_of_optional_prefix() {
        assert_language(
            &format!("({}?{})*", X, Y),
            &["", "y", "xy", "yxy"],
            &["x", "xxy", "xyx"],
        );
    }

    #[test]
    fn optional_of_plus_needs_whole_word() {
        assert_language(
            &format!("({}+{})?", X, Y),
            &["", "xy", "xxy"],
            &["x", "xx", "xyxy"],
        );
    }

    #[test]
    fn single_letter() {
        let dfa = compile("(1, 0, empty)");
        assert_eq!(dfa.len(), 2);
        assert!(!dfa.is_accepting(dfa.start()));
        let (letter, to) = &dfa.transitions(dfa.start())[0];
        assert_eq!(letter.dx, 1);
        assert!(dfa.is_accepting(*to));
        assert!(dfa.transitions(*to).is_empty());
    }

    #[test]
    fn star_collapses_to_one_state() {
        let dfa = compile("(1, 0, empty)*");
        assert_eq!(dfa.len(), 1);
        assert!(dfa.is_accepting(0));
        assert_eq!(dfa.transitions(0)[0].1, 0);
    }

    #[test]
    fn equal_letters_are_merged() {
        let dfa = compile("(1, 0, empty)(0, 1, empty) | (1, 0, empty)(0, 2, empty)");
        assert_deterministic(&dfa);
        assert_eq!(dfa.transitions(dfa.start()).len(), 1);
        let (_, middle) = dfa.transitions(dfa.start())[0].clone();
        let offsets: Vec<_> = dfa
            .transitions(middle)
            .iter()
            .map(|(l, _)| (l.dx, l.dy))
            .collect();
        assert_eq!(offsets, vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn closures_are_canonical() {
        // both branches reach the same closure after one step
        let dfa = compile("((1, 0, empty) | (0, 1, empty))*");
        assert_eq!(dfa.len(), 1);
        let targets: Vec<_> = dfa.transitions(0).iter().map(|(_, to)| *to).collect();
        assert_eq!(targets, vec![0, 0]);
    }

    #[test]
    fn ids_follow_declaration_order() {
        let dfa = compile("(1, 0, empty)(1, 0, empty)? | (0, 1, empty)");
        assert_eq!(dfa.start(), 0);
        let targets: Vec<_> = dfa.transitions(0).iter().map(|(_, to)| *to).collect();
        assert_eq!(targets, vec![1, 2]);
        assert!(dfa.is_accepting(1));
        assert_deterministic(&dfa);
    }

    #[test]
    fn construction_is_deterministic() {
        let source = "((1, 1, empty) | (1, -1, enemy))+(0, 1, true)?";
        assert_eq!(compile(source), compile(source));
    }

    #[test]
    fn empty_dfa_accepts_nothing() {
        let dfa = Dfa::empty();
        assert_eq!(dfa.len(), 1);
        assert!(!dfa.is_accepting(dfa.start()));
        assert!(dfa.transitions(dfa.start()).is_empty());
    }

    #[test]
    fn display_lists_transitions() {
        let dfa = Dfa::from_nfa(&Nfa::build(&Pattern::Letter(Letter {
            dx: 1,
            dy: 0,
            precondition: crate::frontend::ast::Expr::variable("empty"),
            effect: None,
        })));
        assert_eq!(dfa.to_string(), "0 start\n  (1, 0, empty) -> 1\n1 accept\n");
    }
}
