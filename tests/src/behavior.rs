use regjit_compiler::{compile, Backend};

fn assert_matches(pattern: &str, accepted: &[&str], rejected: &[&str]) {
    let compiled = compile(pattern, Backend::Interpreter).unwrap();

    for input in accepted {
        assert!(compiled.is_match(input), "{} should match {:?}", pattern, input);
    }
    for input in rejected {
        assert!(!compiled.is_match(input), "{} should reject {:?}", pattern, input);
    }
}

#[test]
fn should_respect_quantifier_boundaries() {
    assert_matches("^a{2}$", &["aa"], &["a", "aaa"]);
    assert_matches("a{2}", &["aa", "baab"], &["a", "aba"]);
    assert_matches("a{2,}", &["aa", "aaaa"], &["a"]);
    assert_matches("^a{2,5}$", &["aa", "aaa", "aaaaa"], &["a", "aaaaaa"]);
    assert_matches("a{2,5}", &["aaa", "aaaaa"], &["a"]);
    assert_matches("^ab?c$", &["ac", "abc"], &["abbc"]);
    assert_matches("^ab*c$", &["ac", "abbbc"], &["abd"]);
    assert_matches("^ab+c$", &["abc", "abbc"], &["ac"]);
    assert_matches("^a{0}b$", &["b"], &["ab"]);
}

#[test]
fn should_respect_anchors() {
    for pattern in ["^abc", "\\Aabc"] {
        assert_matches(pattern, &["abc", "abcd"], &["!abc"]);
    }
    for pattern in ["abc$", "abc\\z"] {
        assert_matches(pattern, &["abc", "!abc"], &["abc!"]);
    }
    assert_matches("^$", &[""], &["a"]);
}

#[test]
fn should_match_character_classes() {
    assert_matches("\\d", &["0", "a9"], &["a", ""]);
    assert_matches("\\D", &["a"], &["0", "123"]);
    assert_matches("\\w", &["a", "_", "Z", "5"], &["!", " "]);
    assert_matches("\\W", &["!", " "], &["a", "_"]);
    assert_matches("^\\h+$", &["deadBEEF09"], &["xyz", "g"]);
    assert_matches("^\\H$", &["g", "-"], &["a", "F", "0"]);
    assert_matches("\\s", &[" ", "\t", "a\nb"], &["ab"]);
    assert_matches("^\\S+$", &["ab!"], &["a b"]);
}

#[test]
fn should_match_character_groups() {
    assert_matches("^[a-cx]+$", &["abcx", "x"], &["abd"]);
    assert_matches("^[^a-c]$", &["d", "!"], &["a", "c", ""]);
    assert_matches("^[.*]$", &[".", "*"], &["a"]);
}

#[test]
fn should_match_posix_character_types() {
    assert_matches("^[[:alnum:]]+$", &["ab12"], &["a-b"]);
    assert_matches("^[[:alpha:]]+$", &["abXY"], &["ab1"]);
    assert_matches("^[[:lower:]]$", &["q"], &["Q"]);
    assert_matches("^[[:upper:]]$", &["Q"], &["q"]);
}

#[test]
fn should_backtrack_through_alternations() {
    assert_matches("ab|ac", &["ab", "ac", "xxac"], &["bc", "a"]);
    assert_matches("^(?:a|ab)c$", &["ac", "abc"], &["abbc"]);
    assert_matches("^(a|b)*abb$", &["abb", "babb", "aababb"], &["ab"]);
    assert_matches("a|", &["", "b"], &[]);
}

#[test]
fn should_match_any_character() {
    assert_matches("^a.c$", &["abc", "a c", "a\nc"], &["ac", "abbc"]);
}

#[test]
fn should_match_lookaheads_without_consuming() {
    assert_matches("a(?=bc)", &["abc"], &["abd", "a"]);
    assert_matches("^a(?=b)b$", &["ab"], &["a"]);
    assert_matches("a(?!b)", &["ac", "a", "aba"], &["ab"]);
}

#[test]
fn should_match_escaped_metacharacters() {
    assert_matches("^\\(a\\)\\.\\*$", &["(a).*"], &["(a)x*"]);
    assert_matches("a\\tb", &["a\tb"], &["a b"]);
}

#[test]
fn should_record_capture_spans() {
    let compiled = compile("(?<key>\\w+)=(\\d+)", Backend::Interpreter).unwrap();
    let captures = compiled.captures("set a1=42;").unwrap();

    let span = |name: &str| captures.get(name).map(|span| (span.start, span.end));
    assert_eq!(Some((4, 9)), span("$0"));
    assert_eq!(Some((4, 6)), span("key"));
    assert_eq!(Some((7, 9)), span("$1"));
    assert_eq!(None, compiled.captures("a1="));
}
