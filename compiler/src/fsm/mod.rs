//! A finite automaton over labeled predicate transitions. The same
//! representation backs both the nondeterministic automaton built from a
//! syntax tree and its determinized form.

pub mod dfa;
pub mod nfa;

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::ast::CharacterType;

/// An offset into an automaton's state array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(usize);

impl StateId {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Start,
    Finish,
    Intermediate,
}

/// The condition under which a transition may be taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// Taken without consuming input.
    Epsilon,
    Value(char),
    Range {
        left: char,
        right: char,
        invert: bool,
    },
    /// Any single character not in the set.
    Invert(Vec<char>),
    Any,
    Type(CharacterType),
    BeginAnchor,
    EndAnchor,
    StartCapture(String),
    EndCapture(String),
    PositiveLookahead(Vec<char>),
    NegativeLookahead(Vec<char>),
}

impl Predicate {
    pub fn is_epsilon(&self) -> bool {
        matches!(self, Predicate::Epsilon)
    }

    /// Evaluates the predicate against the input at a cursor, returning the
    /// cursor after the transition if it may be taken.
    pub fn step(&self, input: &[char], cursor: usize) -> Option<usize> {
        let next = input.get(cursor).copied();
        let consume = |accepted: bool| accepted.then_some(cursor + 1);

        match (self, next) {
            (Predicate::Epsilon, _)
            | (Predicate::StartCapture(_), _)
            | (Predicate::EndCapture(_), _) => Some(cursor),
            (Predicate::BeginAnchor, _) => (cursor == 0).then_some(cursor),
            (Predicate::EndAnchor, _) => (cursor == input.len()).then_some(cursor),
            (Predicate::PositiveLookahead(values), _) => {
                input[cursor..].starts_with(values).then_some(cursor)
            }
            (Predicate::NegativeLookahead(values), _) => {
                (!input[cursor..].starts_with(values)).then_some(cursor)
            }
            (_, None) => None,
            (Predicate::Value(value), Some(c)) => consume(*value == c),
            (
                Predicate::Range {
                    left,
                    right,
                    invert,
                },
                Some(c),
            ) => consume((*left..=*right).contains(&c) != *invert),
            (Predicate::Invert(values), Some(c)) => consume(!values.contains(&c)),
            (Predicate::Any, Some(_)) => consume(true),
            (Predicate::Type(ty), Some(c)) => consume(ty.contains(c)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Epsilon => write!(f, "ε"),
            Predicate::Value(c) => write!(f, "{:?}", c),
            Predicate::Range {
                left,
                right,
                invert: false,
            } => write!(f, "{:?}-{:?}", left, right),
            Predicate::Range {
                left,
                right,
                invert: true,
            } => write!(f, "^{:?}-{:?}", left, right),
            Predicate::Invert(values) => {
                write!(f, "[^{}]", values.iter().collect::<String>())
            }
            Predicate::Any => write!(f, "any"),
            Predicate::Type(ty) => write!(f, "[[:{}:]]", ty.name()),
            Predicate::BeginAnchor => write!(f, "\\A"),
            Predicate::EndAnchor => write!(f, "\\z"),
            Predicate::StartCapture(name) => write!(f, "start {}", name),
            Predicate::EndCapture(name) => write!(f, "end {}", name),
            Predicate::PositiveLookahead(values) => {
                write!(f, "(?={})", values.iter().collect::<String>())
            }
            Predicate::NegativeLookahead(values) => {
                write!(f, "(?!{})", values.iter().collect::<String>())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub target: StateId,
    pub predicate: Predicate,
}

impl Transition {
    pub fn new(target: StateId, predicate: Predicate) -> Self {
        Self { target, predicate }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    label: String,
    kind: StateKind,
    transitions: Vec<Transition>,
}

impl State {
    pub fn new(label: String, kind: StateKind) -> Self {
        Self {
            label,
            kind,
            transitions: vec![],
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn is_finish(&self) -> bool {
        self.kind == StateKind::Finish
    }

    /// Outgoing transitions in the order they were added, which is also the
    /// order they are attempted in.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

/// A graph of states connected by predicate transitions, with a single
/// start state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Automaton {
    start: Option<StateId>,
    states: Vec<State>,
}

impl Automaton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a state, returning its id. The first start state added
    /// becomes the automaton's start.
    pub fn add_state(&mut self, label: impl Into<String>, kind: StateKind) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(State::new(label.into(), kind));
        if kind == StateKind::Start && self.start.is_none() {
            self.start = Some(id);
        }

        id
    }

    pub fn connect(&mut self, from: StateId, to: StateId, predicate: Predicate) {
        self.states[from.0]
            .transitions
            .push(Transition::new(to, predicate));
    }

    pub fn set_label(&mut self, id: StateId, label: impl Into<String>) {
        self.states[id.0].label = label.into();
    }

    /// The entry state. An automaton without any start state reports the
    /// first state added.
    pub fn start(&self) -> StateId {
        self.start.unwrap_or(StateId(0))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(idx, state)| (StateId(idx), state))
    }

    pub fn finish_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states()
            .filter(|(_, state)| state.is_finish())
            .map(|(id, _)| id)
    }

    /// All states reachable from the start, in breadth-first order.
    pub fn reachable(&self) -> Vec<StateId> {
        if self.states.is_empty() {
            return vec![];
        }

        let mut seen = vec![false; self.states.len()];
        let mut order = vec![];
        let mut queue = VecDeque::from([self.start()]);
        seen[self.start().0] = true;

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for transition in self.state(id).transitions() {
                if !seen[transition.target.0] {
                    seen[transition.target.0] = true;
                    queue.push_back(transition.target);
                }
            }
        }

        order
    }

    /// The set of states reachable from the seeds through epsilon
    /// transitions alone, seeds included.
    pub fn epsilon_closure(&self, seeds: impl IntoIterator<Item = StateId>) -> BTreeSet<StateId> {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<StateId> = seeds.into_iter().collect();

        while let Some(id) = pending.pop() {
            if !closure.insert(id) {
                continue;
            }

            pending.extend(
                self.state(id)
                    .transitions()
                    .iter()
                    .filter(|transition| transition.predicate.is_epsilon())
                    .map(|transition| transition.target),
            );
        }

        closure
    }

    /// Reports whether any path from the start reaches a finish state when
    /// the input is searched from each possible starting offset. This walks
    /// the automaton directly and is independent of any compiled form.
    pub fn is_match(&self, input: &str) -> bool {
        let input: Vec<char> = input.chars().collect();
        if self.states.is_empty() {
            return false;
        }

        (0..=input.len()).any(|offset| {
            let mut seen = BTreeSet::new();
            let mut pending = vec![(self.start(), offset)];

            while let Some((id, cursor)) = pending.pop() {
                if !seen.insert((id, cursor)) {
                    continue;
                }

                let state = self.state(id);
                if state.is_finish() {
                    return true;
                }

                pending.extend(state.transitions().iter().filter_map(|transition| {
                    transition
                        .predicate
                        .step(&input, cursor)
                        .map(|next| (transition.target, next))
                }));
            }

            false
        })
    }
}

impl std::ops::Index<StateId> for Automaton {
    type Output = State;

    fn index(&self, id: StateId) -> &Self::Output {
        self.state(id)
    }
}

impl fmt::Display for Automaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, state) in self.states() {
            let kind = match state.kind() {
                StateKind::Start => " (start)",
                StateKind::Finish => " (finish)",
                StateKind::Intermediate => "",
            };
            writeln!(f, "{}{}:", state.label(), kind)?;

            for transition in state.transitions() {
                writeln!(
                    f,
                    "    --{}--> {}",
                    transition.predicate,
                    self.state(transition.target).label()
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_compute_epsilon_closure_through_chains() {
        let mut automaton = Automaton::new();
        let start = automaton.add_state("start", StateKind::Start);
        let one = automaton.add_state("1", StateKind::Intermediate);
        let two = automaton.add_state("2", StateKind::Intermediate);
        let finish = automaton.add_state("finish", StateKind::Finish);

        automaton.connect(start, one, Predicate::Epsilon);
        automaton.connect(one, two, Predicate::Epsilon);
        automaton.connect(two, one, Predicate::Epsilon);
        automaton.connect(two, finish, Predicate::Value('a'));

        assert_eq!(
            BTreeSet::from([start, one, two]),
            automaton.epsilon_closure([start])
        );
        assert_eq!(
            BTreeSet::from([finish]),
            automaton.epsilon_closure([finish])
        );
    }

    #[test]
    fn should_order_reachable_states_breadth_first() {
        let mut automaton = Automaton::new();
        let start = automaton.add_state("start", StateKind::Start);
        let orphan = automaton.add_state("orphan", StateKind::Intermediate);
        let one = automaton.add_state("1", StateKind::Intermediate);
        let two = automaton.add_state("2", StateKind::Intermediate);
        let finish = automaton.add_state("finish", StateKind::Finish);

        automaton.connect(start, two, Predicate::Value('a'));
        automaton.connect(start, one, Predicate::Value('b'));
        automaton.connect(one, finish, Predicate::Epsilon);
        automaton.connect(two, start, Predicate::Epsilon);
        automaton.connect(orphan, finish, Predicate::Epsilon);

        assert_eq!(vec![start, two, one, finish], automaton.reachable());
    }

    #[test]
    fn should_evaluate_predicates_against_cursor() {
        let input: Vec<char> = "ab1".chars().collect();

        assert_eq!(Some(1), Predicate::Value('a').step(&input, 0));
        assert_eq!(None, Predicate::Value('a').step(&input, 1));
        assert_eq!(
            Some(3),
            Predicate::Range {
                left: '0',
                right: '9',
                invert: false
            }
            .step(&input, 2)
        );
        assert_eq!(
            Some(1),
            Predicate::Range {
                left: '0',
                right: '9',
                invert: true
            }
            .step(&input, 0)
        );
        assert_eq!(None, Predicate::Any.step(&input, 3));
        assert_eq!(Some(3), Predicate::EndAnchor.step(&input, 3));
        assert_eq!(None, Predicate::BeginAnchor.step(&input, 1));
        assert_eq!(
            Some(1),
            Predicate::PositiveLookahead(vec!['b', '1']).step(&input, 1)
        );
        assert_eq!(
            None,
            Predicate::NegativeLookahead(vec!['b']).step(&input, 1)
        );
        assert_eq!(Some(2), Predicate::Invert(vec!['a']).step(&input, 1));
    }

    #[test]
    fn should_print_states_and_transitions() {
        let mut automaton = Automaton::new();
        let start = automaton.add_state("start", StateKind::Start);
        let finish = automaton.add_state("finish", StateKind::Finish);
        automaton.connect(
            start,
            finish,
            Predicate::Range {
                left: 'a',
                right: 'z',
                invert: false,
            },
        );

        assert_eq!(
            "start (start):\n    --'a'-'z'--> finish\nfinish (finish):\n",
            automaton.to_string()
        );
    }
}
