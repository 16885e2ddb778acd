use pretty_assertions::assert_eq;
use regjit_compiler::{compile, Backend, CompileError};

fn compile_error(pattern: &str) -> Option<CompileError> {
    compile(pattern, Backend::Interpreter).err()
}

#[test]
fn should_report_syntax_errors_with_position() {
    let input_output = [
        ("a\u{1}", (1, '\u{1}')),
        ("ab\\y", (3, 'y')),
        ("ab\\", (2, '\\')),
    ];

    for (test_case, (pattern, (position, character))) in input_output.into_iter().enumerate() {
        assert_eq!(
            (
                test_case,
                Some(CompileError::Syntax {
                    position,
                    character
                })
            ),
            (test_case, compile_error(pattern))
        );
    }
}

#[test]
fn should_report_parse_errors_with_position() {
    let input_output = [("a)", 1), ("(a", 0), ("*a", 0), ("a{2", 1), ("[a", 0)];

    for (test_case, (pattern, expected)) in input_output.into_iter().enumerate() {
        let position = match compile_error(pattern) {
            Some(CompileError::Parse { position, .. }) => Some(position),
            _ => None,
        };

        assert_eq!((test_case, Some(expected)), (test_case, position));
    }
}

#[test]
fn should_reject_inverted_quantifier_bounds() {
    assert_eq!(
        Some(CompileError::InvalidQuantifier { lower: 5, upper: 2 }),
        compile_error("(ab){5,2}")
    );
    assert_eq!(None, compile_error("(ab){2,2}"));
}

#[test]
fn should_render_errors_for_display() {
    assert_eq!(
        "invalid quantifier: lower bound 3 exceeds upper bound 1",
        CompileError::InvalidQuantifier { lower: 3, upper: 1 }.to_string()
    );
    assert_eq!(
        "invalid character 'y' at position 3",
        compile_error("ab\\y").map(|e| e.to_string()).unwrap_or_default()
    );
}
