//! Lowers a syntax tree into a nondeterministic automaton via Thompson
//! construction.

use super::{Automaton, Predicate, StateId, StateKind};
use crate::ast;
use crate::error::CompileError;

/// The name of the capture spanning the whole match.
pub const WHOLE_MATCH: &str = "$0";

/// Hands out unique, monotonically increasing state labels.
#[derive(Debug)]
pub struct LabelGenerator {
    next: usize,
}

impl Default for LabelGenerator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_label(&mut self) -> String {
        let label = self.next.to_string();
        self.next += 1;
        label
    }
}

/// Builds an automaton for the pattern. Quantifier bounds are validated
/// before any state is created.
pub fn build(root: &ast::Root) -> Result<Automaton, CompileError> {
    validate(&root.expressions)?;

    let mut builder = Builder::default();
    builder.root(root);

    log::debug!("built nfa with {} states", builder.automaton.len());
    Ok(builder.automaton)
}

fn validate(expressions: &[ast::Expression]) -> Result<(), CompileError> {
    expressions
        .iter()
        .flat_map(|expression| expression.items())
        .try_for_each(|item| match item {
            ast::Item::Group(ast::Group {
                expressions,
                quantifier,
            })
            | ast::Item::CaptureGroup(ast::CaptureGroup {
                expressions,
                quantifier,
                ..
            }) => validate_quantifier(quantifier).and_then(|_| validate(expressions)),
            ast::Item::Match(ast::Match { quantifier, .. }) => validate_quantifier(quantifier),
            ast::Item::Anchor(_) => Ok(()),
        })
}

fn validate_quantifier(quantifier: &ast::Quantifier) -> Result<(), CompileError> {
    match *quantifier {
        ast::Quantifier::Range(lower, upper) if lower > upper => {
            Err(CompileError::InvalidQuantifier { lower, upper })
        }
        _ => Ok(()),
    }
}

#[derive(Default)]
struct Builder {
    automaton: Automaton,
    labels: LabelGenerator,
    captures: usize,
}

impl Builder {
    fn fresh(&mut self) -> StateId {
        let label = self.labels.next_label();
        self.automaton.add_state(label, StateKind::Intermediate)
    }

    fn root(&mut self, root: &ast::Root) {
        let start = self.automaton.add_state("start", StateKind::Start);
        let finish = self.automaton.add_state("finish", StateKind::Finish);

        let match_start = self.fresh();
        self.automaton.connect(
            start,
            match_start,
            Predicate::StartCapture(WHOLE_MATCH.to_string()),
        );

        let current = if root.at_start {
            let anchored = self.fresh();
            self.automaton
                .connect(match_start, anchored, Predicate::BeginAnchor);
            anchored
        } else {
            match_start
        };

        // labeled once every inner state has been.
        let match_finish = self
            .automaton
            .add_state(String::new(), StateKind::Intermediate);
        self.alternation(&root.expressions, current, match_finish);
        let label = self.labels.next_label();
        self.automaton.set_label(match_finish, label);

        self.automaton.connect(
            match_finish,
            finish,
            Predicate::EndCapture(WHOLE_MATCH.to_string()),
        );
    }

    fn alternation(&mut self, expressions: &[ast::Expression], entry: StateId, exit: StateId) {
        for expression in expressions {
            self.expression(expression, entry, exit);
        }
    }

    fn expression(&mut self, expression: &ast::Expression, entry: StateId, exit: StateId) {
        let items = expression.items();
        if items.is_empty() {
            self.automaton.connect(entry, exit, Predicate::Epsilon);
            return;
        }

        let intermediates: Vec<StateId> = (1..items.len()).map(|_| self.fresh()).collect();
        let states: Vec<StateId> = std::iter::once(entry)
            .chain(intermediates)
            .chain(std::iter::once(exit))
            .collect();

        for (item, bounds) in items.iter().zip(states.windows(2)) {
            self.item(item, bounds[0], bounds[1]);
        }
    }

    fn item(&mut self, item: &ast::Item, entry: StateId, exit: StateId) {
        match item {
            ast::Item::Group(group) => {
                self.quantify(group.quantifier, entry, exit, &|builder, from, to| {
                    builder.alternation(&group.expressions, from, to)
                })
            }
            ast::Item::CaptureGroup(group) => {
                let name = match &group.name {
                    Some(name) => name.clone(),
                    None => {
                        self.captures += 1;
                        format!("${}", self.captures)
                    }
                };

                self.quantify(group.quantifier, entry, exit, &|builder, from, to| {
                    let capture_start = builder.fresh();
                    let capture_finish = builder.fresh();
                    builder.automaton.connect(
                        from,
                        capture_start,
                        Predicate::StartCapture(name.clone()),
                    );
                    builder.alternation(&group.expressions, capture_start, capture_finish);
                    builder.automaton.connect(
                        capture_finish,
                        to,
                        Predicate::EndCapture(name.clone()),
                    );
                })
            }
            ast::Item::Match(ast::Match { item, quantifier }) => {
                self.quantify(*quantifier, entry, exit, &|builder, from, to| {
                    builder.match_item(item, from, to)
                })
            }
            ast::Item::Anchor(anchor) => {
                let predicate = match anchor {
                    ast::Anchor::StartOfString => Predicate::BeginAnchor,
                    ast::Anchor::EndOfString | ast::Anchor::EndOfLine => Predicate::EndAnchor,
                };
                self.automaton.connect(entry, exit, predicate)
            }
        }
    }

    /// Wraps a sub-construction in the given quantifier. Loops are always
    /// built on fresh states so that back edges never reach a state shared
    /// with a sibling.
    fn quantify(
        &mut self,
        quantifier: ast::Quantifier,
        entry: StateId,
        exit: StateId,
        inner: &dyn Fn(&mut Self, StateId, StateId),
    ) {
        match quantifier {
            ast::Quantifier::Once => inner(self, entry, exit),
            ast::Quantifier::ZeroOrMore | ast::Quantifier::AtLeast(0) => {
                let looped = self.fresh();
                self.automaton.connect(entry, looped, Predicate::Epsilon);
                inner(self, looped, looped);
                self.automaton.connect(looped, exit, Predicate::Epsilon);
            }
            ast::Quantifier::OneOrMore => {
                let body_start = self.fresh();
                let body_finish = self.fresh();
                self.automaton.connect(entry, body_start, Predicate::Epsilon);
                inner(self, body_start, body_finish);
                self.automaton
                    .connect(body_finish, body_start, Predicate::Epsilon);
                self.automaton.connect(body_finish, exit, Predicate::Epsilon);
            }
            ast::Quantifier::Optional => {
                inner(self, entry, exit);
                self.automaton.connect(entry, exit, Predicate::Epsilon);
            }
            ast::Quantifier::Exact(0) | ast::Quantifier::Range(_, 0) => {
                self.automaton.connect(entry, exit, Predicate::Epsilon)
            }
            ast::Quantifier::Exact(count) => {
                let states = self.chain(entry, exit, count);
                for bounds in states.windows(2) {
                    inner(self, bounds[0], bounds[1]);
                }
            }
            ast::Quantifier::AtLeast(count) => {
                let chain: Vec<StateId> = (0..=count).map(|_| self.fresh()).collect();
                self.automaton.connect(entry, chain[0], Predicate::Epsilon);
                for bounds in chain.windows(2) {
                    inner(self, bounds[0], bounds[1]);
                }

                let last = chain[count];
                self.automaton
                    .connect(last, chain[count - 1], Predicate::Epsilon);
                self.automaton.connect(last, exit, Predicate::Epsilon);
            }
            ast::Quantifier::Range(lower, upper) => {
                let states = self.chain(entry, exit, upper);
                for bounds in states.windows(2) {
                    inner(self, bounds[0], bounds[1]);
                }

                for &state in &states[lower..upper] {
                    self.automaton.connect(state, exit, Predicate::Epsilon);
                }
            }
        }
    }

    /// `count + 1` states from entry to exit with fresh states between.
    fn chain(&mut self, entry: StateId, exit: StateId, count: usize) -> Vec<StateId> {
        let intermediates: Vec<StateId> = (1..count).map(|_| self.fresh()).collect();
        std::iter::once(entry)
            .chain(intermediates)
            .chain(std::iter::once(exit))
            .collect()
    }

    fn match_item(&mut self, item: &ast::MatchItem, entry: StateId, exit: StateId) {
        for predicate in predicates(item) {
            self.automaton.connect(entry, exit, predicate);
        }
    }
}

fn range(left: char, right: char) -> Predicate {
    Predicate::Range {
        left,
        right,
        invert: false,
    }
}

fn inverted_range(left: char, right: char) -> Predicate {
    Predicate::Range {
        left,
        right,
        invert: true,
    }
}

/// The parallel transitions a single match item lowers to.
fn predicates(item: &ast::MatchItem) -> Vec<Predicate> {
    use ast::CharacterClass;

    match item {
        ast::MatchItem::Character(ast::Char(c)) => vec![Predicate::Value(*c)],
        ast::MatchItem::Period => vec![Predicate::Any],
        ast::MatchItem::CharacterType(ty) => vec![Predicate::Type(*ty)],
        ast::MatchItem::PositiveLookahead(values) => {
            vec![Predicate::PositiveLookahead(values.clone())]
        }
        ast::MatchItem::NegativeLookahead(values) => {
            vec![Predicate::NegativeLookahead(values.clone())]
        }
        ast::MatchItem::CharacterClass(class) => match class {
            CharacterClass::Word => vec![
                range('a', 'z'),
                range('A', 'Z'),
                range('0', '9'),
                Predicate::Value('_'),
            ],
            CharacterClass::NonWord => {
                let mut values: Vec<char> = ('a'..='z')
                    .chain('A'..='Z')
                    .chain('0'..='9')
                    .chain(std::iter::once('_'))
                    .collect();
                values.sort_unstable();
                vec![Predicate::Invert(values)]
            }
            CharacterClass::Digit => vec![range('0', '9')],
            CharacterClass::NonDigit => vec![inverted_range('0', '9')],
            CharacterClass::Hex => vec![range('a', 'f'), range('A', 'F'), range('0', '9')],
            CharacterClass::NonHex => {
                let mut values: Vec<char> =
                    ('a'..='f').chain('A'..='F').chain('0'..='9').collect();
                values.sort_unstable();
                vec![Predicate::Invert(values)]
            }
            CharacterClass::Space => [' ', '\t', '\r', '\n', '\x0B', '\x0C']
                .into_iter()
                .map(Predicate::Value)
                .collect(),
            CharacterClass::NonSpace => {
                let mut values = vec![' ', '\t', '\r', '\n', '\x0B', '\x0C'];
                values.sort_unstable();
                vec![Predicate::Invert(values)]
            }
        },
        ast::MatchItem::CharacterGroup(group) if group.invert => {
            let mut values: Vec<char> = group
                .items
                .iter()
                .flat_map(|item| match item {
                    ast::CharacterGroupItem::Character(ast::Char(c)) => vec![*c],
                    ast::CharacterGroupItem::Range(range) => range.values().collect(),
                })
                .collect();
            values.sort_unstable();
            values.dedup();
            vec![Predicate::Invert(values)]
        }
        ast::MatchItem::CharacterGroup(group) => group
            .items
            .iter()
            .map(|item| match item {
                ast::CharacterGroupItem::Character(ast::Char(c)) => Predicate::Value(*c),
                ast::CharacterGroupItem::Range(r) => range(r.left, r.right),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn nfa(pattern: &str) -> Automaton {
        parse(pattern).and_then(|root| build(&root)).unwrap()
    }

    #[test]
    fn should_generate_increasing_labels() {
        let mut labels = LabelGenerator::new();

        assert_eq!(
            vec!["1", "2", "3"],
            (0..3).map(|_| labels.next_label()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn should_wrap_pattern_in_whole_match_capture() {
        let automaton = nfa("a");

        assert_eq!(
            "start (start):
    --start $0--> 1
finish (finish):
1:
    --'a'--> 2
2:
    --end $0--> finish
",
            automaton.to_string()
        );
    }

    #[test]
    fn should_anchor_to_start_of_input() {
        let automaton = nfa("^a");

        assert_eq!(
            "start (start):
    --start $0--> 1
finish (finish):
1:
    --\\A--> 2
2:
    --'a'--> 3
3:
    --end $0--> finish
",
            automaton.to_string()
        );
    }

    #[test]
    fn should_reject_inverted_quantifier_bounds() {
        assert_eq!(
            Err(CompileError::InvalidQuantifier { lower: 3, upper: 1 }),
            parse("(?:a{3,1})").and_then(|root| build(&root))
        );
    }

    #[test]
    fn should_name_unnamed_captures_in_order() {
        let automaton = nfa("(a)(?<x>b)(c)");
        let captures: Vec<String> = automaton
            .states()
            .flat_map(|(_, state)| state.transitions())
            .filter_map(|transition| match &transition.predicate {
                Predicate::StartCapture(name) => Some(name.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(vec!["$0", "$1", "x", "$2"], captures);
    }

    #[test]
    fn should_match_quantified_items() {
        let cases = vec![
            ("^a*$", vec!["", "aaa"], vec!["ab"]),
            ("^a+$", vec!["a", "aaa"], vec![""]),
            ("^a?$", vec!["", "a"], vec!["aa"]),
            ("^a{2}$", vec!["aa"], vec!["a", "aaa"]),
            ("^a{2,}$", vec!["aa", "aaaa"], vec!["a"]),
            ("^a{1,3}$", vec!["a", "aaa"], vec!["", "aaaa"]),
            ("^a{0}b$", vec!["b"], vec!["ab"]),
            ("^(?:ab){2}$", vec!["abab"], vec!["ab", "ababab"]),
        ];

        for (pattern, accepted, rejected) in cases {
            let automaton = nfa(pattern);
            for input in accepted {
                assert!(automaton.is_match(input), "{} on {:?}", pattern, input);
            }
            for input in rejected {
                assert!(!automaton.is_match(input), "{} on {:?}", pattern, input);
            }
        }
    }

    #[test]
    fn should_not_leak_loops_into_sibling_alternatives() {
        // the loop on `a` must not allow `b` to repeat.
        let automaton = nfa("^(?:a*|b)$");

        assert!(automaton.is_match("aaa"));
        assert!(automaton.is_match("b"));
        assert!(!automaton.is_match("bb"));
        assert!(!automaton.is_match("ab"));
    }

    #[test]
    fn should_lower_classes_to_parallel_transitions() {
        let cases = vec![
            ("^\\w$", vec!["a", "Z", "5", "_"], vec!["-", " "]),
            ("^\\W$", vec!["-", " "], vec!["a", "_"]),
            ("^\\h$", vec!["f", "A", "0"], vec!["g"]),
            ("^\\H$", vec!["g", "z"], vec!["a", "F"]),
            ("^\\s$", vec![" ", "\t", "\n"], vec!["a"]),
            ("^[^a-c]$", vec!["d"], vec!["b"]),
            ("^[[:upper:]]$", vec!["Q"], vec!["q"]),
        ];

        for (pattern, accepted, rejected) in cases {
            let automaton = nfa(pattern);
            for input in accepted {
                assert!(automaton.is_match(input), "{} on {:?}", pattern, input);
            }
            for input in rejected {
                assert!(!automaton.is_match(input), "{} on {:?}", pattern, input);
            }
        }
    }
}
