//! Determinizes an automaton via subset construction.
//!
//! Predicates are treated as opaque symbols: two transitions are merged only
//! when their predicates are equal. The result accepts exactly the inputs
//! the source automaton accepts.

use std::collections::{BTreeMap, BTreeSet};

use super::{Automaton, Predicate, StateId, StateKind};

pub fn build(nfa: &Automaton) -> Automaton {
    let mut dfa = Automaton::new();
    if nfa.is_empty() {
        return dfa;
    }

    let mut known: BTreeMap<BTreeSet<StateId>, StateId> = BTreeMap::new();
    let start_set = nfa.epsilon_closure([nfa.start()]);
    let start = dfa.add_state(label(nfa, &start_set), kind(nfa, &start_set, true));
    known.insert(start_set.clone(), start);

    let mut pending = vec![start_set];
    while let Some(set) = pending.pop() {
        let current = known[&set];

        let predicates: Vec<&Predicate> = set
            .iter()
            .flat_map(|&id| nfa.state(id).transitions())
            .map(|transition| &transition.predicate)
            .filter(|predicate| !predicate.is_epsilon())
            .collect();

        for predicate in predicates {
            let already_connected = dfa
                .state(current)
                .transitions()
                .iter()
                .any(|transition| &transition.predicate == predicate);
            if already_connected {
                continue;
            }

            let targets = set
                .iter()
                .flat_map(|&id| nfa.state(id).transitions())
                .filter(|transition| &transition.predicate == predicate)
                .map(|transition| transition.target);
            let next_set = nfa.epsilon_closure(targets);

            let next = match known.get(&next_set) {
                Some(&id) => id,
                None => {
                    let id = dfa.add_state(label(nfa, &next_set), kind(nfa, &next_set, false));
                    known.insert(next_set.clone(), id);
                    pending.push(next_set);
                    id
                }
            };

            dfa.connect(current, next, predicate.clone());
        }
    }

    log::debug!(
        "determinized {} nfa states into {} dfa states",
        nfa.len(),
        dfa.len()
    );
    dfa
}

fn label(nfa: &Automaton, set: &BTreeSet<StateId>) -> String {
    set.iter()
        .map(|&id| nfa.state(id).label())
        .collect::<Vec<_>>()
        .join(",")
}

fn kind(nfa: &Automaton, set: &BTreeSet<StateId>, is_start: bool) -> StateKind {
    if set.iter().any(|&id| nfa.state(id).is_finish()) {
        StateKind::Finish
    } else if is_start {
        StateKind::Start
    } else {
        StateKind::Intermediate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::nfa;
    use crate::parser::parse;

    fn automata(pattern: &str) -> (Automaton, Automaton) {
        let nfa = parse(pattern).and_then(|root| nfa::build(&root)).unwrap();
        let dfa = build(&nfa);
        (nfa, dfa)
    }

    #[test]
    fn should_merge_states_sharing_a_predicate() {
        let (_, dfa) = automata("ab|ac");

        // `a` leads to a single state that branches on `b` and `c`.
        let start = dfa.state(dfa.start());
        let after_start: Vec<_> = start.transitions().iter().collect();
        assert_eq!(1, after_start.len());

        let after_a: Vec<&Predicate> = dfa
            .state(after_start[0].target)
            .transitions()
            .iter()
            .map(|transition| &transition.predicate)
            .collect();
        assert_eq!(vec![&Predicate::Value('a')], after_a);

        let branch = dfa
            .state(dfa.state(after_start[0].target).transitions()[0].target)
            .transitions()
            .iter()
            .map(|transition| transition.predicate.clone())
            .collect::<Vec<_>>();
        assert_eq!(vec![Predicate::Value('b'), Predicate::Value('c')], branch);
    }

    #[test]
    fn should_never_share_a_predicate_between_outgoing_transitions() {
        for pattern in ["a*b|a+c", "(a|ab)(c|bcd)", "x(?:y|y)z", "[ab]a|\\w"] {
            let (_, dfa) = automata(pattern);

            for (_, state) in dfa.states() {
                let predicates: Vec<&Predicate> = state
                    .transitions()
                    .iter()
                    .map(|transition| &transition.predicate)
                    .collect();

                for (idx, predicate) in predicates.iter().enumerate() {
                    assert!(
                        !predicates[idx + 1..].contains(predicate),
                        "{} duplicates {} in {:?}",
                        pattern,
                        predicate,
                        state.label()
                    );
                }
            }
        }
    }

    #[test]
    fn should_label_states_by_their_subset() {
        let (_, dfa) = automata("a|b");

        let start = dfa.state(dfa.start());
        assert_eq!("start", start.label());
        assert_eq!(StateKind::Start, start.kind());

        let match_start = dfa.state(start.transitions()[0].target);
        assert_eq!("1", match_start.label());

        // both alternatives land in the same subset.
        let targets: Vec<StateId> = match_start
            .transitions()
            .iter()
            .map(|transition| transition.target)
            .collect();
        assert_eq!(2, targets.len());
        assert_eq!(targets[0], targets[1]);
        assert_eq!("2", dfa.state(targets[0]).label());
    }

    #[test]
    fn should_accept_the_same_inputs_as_the_source_automaton() {
        let patterns = ["a*b|a+c", "^(a|ab)(c|bcd)$", "x(?:y|yy)*z", "[ab]{1,2}$", "a?a"];
        let alphabet = ['a', 'b', 'c', 'd', 'x', 'y', 'z'];

        let mut inputs = vec![String::new()];
        for len in 1..=4 {
            let mut next = vec![];
            for prefix in inputs.iter().filter(|input| input.chars().count() == len - 1) {
                for c in alphabet {
                    next.push(format!("{}{}", prefix, c));
                }
            }
            inputs.extend(next);
        }

        for pattern in patterns {
            let (nfa, dfa) = automata(pattern);
            for input in &inputs {
                assert_eq!(
                    nfa.is_match(input),
                    dfa.is_match(input),
                    "{} on {:?}",
                    pattern,
                    input
                );
            }
        }
    }
}
