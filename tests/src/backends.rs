use pretty_assertions::assert_eq;
use regjit_compiler::{compile_with_options, Backend, CompileOptions};

use crate::strings_up_to;

const PATTERNS: [&str; 18] = [
    "a",
    "ab|ac",
    "^abc",
    "abc$",
    "\\Aa|b\\z",
    "a{2,3}b",
    "(a|b)*c",
    "(?:ab)+",
    "\\d+\\D",
    "\\w\\W",
    "\\h\\H",
    "\\s\\S",
    "[^a-c]",
    "[[:lower:]][[:upper:]]",
    ".b",
    "a(?=bc)",
    "a(?!b)",
    "(a*)*b",
];

fn backends() -> Vec<Backend> {
    let mut backends = vec![Backend::Interpreter, Backend::Source];
    if cfg!(target_arch = "x86_64") {
        backends.push(Backend::Native);
    }
    backends
}

#[test]
fn should_agree_on_every_input_across_backends() {
    let inputs = strings_up_to(&['a', 'b', 'c', 'A', '1', ' '], 4);

    for deterministic in [false, true] {
        for (test_case, pattern) in PATTERNS.into_iter().enumerate() {
            let options = CompileOptions::new().with_deterministic(deterministic);
            let reference = compile_with_options(pattern, options).unwrap();
            let expected: Vec<bool> = inputs.iter().map(|i| reference.is_match(i)).collect();

            for backend in backends() {
                let lowered = reference.with_backend(backend).unwrap();
                let got: Vec<bool> = inputs.iter().map(|i| lowered.is_match(i)).collect();

                assert_eq!(
                    (test_case, deterministic, backend, &expected),
                    (test_case, deterministic, backend, &got)
                );
            }
        }
    }
}

#[test]
fn should_agree_on_long_inputs_across_backends() {
    let inputs = [
        "a".repeat(300),
        format!("{}b", "a".repeat(300)),
        "xy".repeat(200) + "ab",
        "ab".repeat(150),
    ];

    for pattern in ["^(?:a|aa)*b", "(?:ab)+$", "(a*)*b", "x(?:y|x)*ab"] {
        let reference = compile_with_options(pattern, CompileOptions::new()).unwrap();

        for backend in backends() {
            let lowered = reference.with_backend(backend).unwrap();
            for input in inputs.iter() {
                assert_eq!(
                    (pattern, backend, reference.is_match(input)),
                    (pattern, backend, lowered.is_match(input))
                );
            }
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[test]
fn should_reject_native_backend_off_x86_64() {
    use regjit_compiler::CompileError;

    assert_eq!(
        Err(CompileError::UnsupportedBackend(Backend::Native)),
        compile_with_options("a", CompileOptions::new().with_backend(Backend::Native))
            .map(|_| ())
    );
}
