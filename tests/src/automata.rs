use pretty_assertions::assert_eq;
use regjit_compiler::fsm::{dfa, nfa};
use regjit_compiler::{compile_with_options, parse, CompileOptions};

use crate::strings_up_to;

const PATTERNS: [&str; 14] = [
    "ab|ac",
    "a*b",
    "(a|b)*c",
    "^a+$",
    "a{2,3}",
    "a{2,}b",
    "(?:ab)?c",
    "[a-c]+",
    "[^ab]c",
    "a(?=b)",
    "a(?!b)",
    "\\Aab|ba\\z",
    "(a*)*c",
    "",
];

#[test]
fn should_accept_the_same_language_with_and_without_determinization() {
    let inputs = strings_up_to(&['a', 'b', 'c', 'x'], 4);

    for (test_case, pattern) in PATTERNS.into_iter().enumerate() {
        let automaton = parse(pattern).and_then(|root| nfa::build(&root)).unwrap();
        let deterministic = dfa::build(&automaton);

        let expected: Vec<bool> = inputs.iter().map(|i| automaton.is_match(i)).collect();
        let got: Vec<bool> = inputs.iter().map(|i| deterministic.is_match(i)).collect();
        assert_eq!((test_case, pattern, expected), (test_case, pattern, got));
    }
}

#[test]
fn should_match_compiled_programs_against_their_automaton() {
    let inputs = strings_up_to(&['a', 'b', 'c', 'x'], 4);

    for deterministic in [false, true] {
        let options = CompileOptions::new().with_deterministic(deterministic);

        for (test_case, pattern) in PATTERNS.into_iter().enumerate() {
            let automaton = parse(pattern).and_then(|root| nfa::build(&root)).unwrap();
            let compiled = compile_with_options(pattern, options).unwrap();

            let expected: Vec<bool> = inputs.iter().map(|i| automaton.is_match(i)).collect();
            let got: Vec<bool> = inputs.iter().map(|i| compiled.is_match(i)).collect();
            assert_eq!(
                (test_case, deterministic, expected),
                (test_case, deterministic, got)
            );
        }
    }
}

#[test]
fn should_remove_epsilon_transitions_when_determinizing() {
    for pattern in PATTERNS {
        let automaton = parse(pattern).and_then(|root| nfa::build(&root)).unwrap();
        let deterministic = dfa::build(&automaton);

        assert!(deterministic
            .states()
            .flat_map(|(_, state)| state.transitions())
            .all(|transition| !transition.predicate.is_epsilon()));
    }
}
