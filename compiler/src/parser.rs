use parcel::parsers::character::{digit, expect_character};
use parcel::prelude::v1::*;

use super::ast;
use crate::error::CompileError;

/// Characters that carry meaning outside of a character group and must be
/// escaped to be matched literally.
const METACHARACTERS: [char; 14] = [
    '(', ')', '[', ']', '{', '}', '*', '+', '?', '.', '|', '^', '$', '\\',
];

/// Parses a pattern into its syntax tree.
///
/// The pattern is first scanned for characters that can never appear in a
/// valid pattern, reported as [CompileError::Syntax], before the grammar is
/// applied. Anything the grammar can't consume is a [CompileError::Parse].
pub fn parse(pattern: &str) -> Result<ast::Root, CompileError> {
    let input = scan(pattern)?;
    if input.is_empty() {
        return Ok(ast::Root::new(vec![ast::Expression::default()], false));
    }

    let status = root()
        .parse(&input[..])
        .map_err(|err| CompileError::Parse {
            position: 0,
            reason: format!("unspecified parse error occured: {}", err),
        })?;

    match status {
        MatchStatus::Match {
            remainder, inner, ..
        } => match remainder.first() {
            None => Ok(inner),
            Some(&(position, c)) => Err(CompileError::Parse {
                position,
                reason: format!("unexpected character {:?}", c),
            }),
        },
        MatchStatus::NoMatch(remainder) => Err(CompileError::Parse {
            position: remainder.first().map(|(pos, _)| *pos).unwrap_or(input.len()),
            reason: "provided pattern is invalid".to_string(),
        }),
    }
}

/// Enumerates the characters of a pattern, rejecting control characters and
/// escapes that name nothing.
fn scan(pattern: &str) -> Result<Vec<(usize, char)>, CompileError> {
    let input: Vec<(usize, char)> = pattern.chars().enumerate().collect();

    let mut iter = input.iter().copied();
    while let Some((position, character)) = iter.next() {
        if is_forbidden_control(character) {
            return Err(CompileError::Syntax {
                position,
                character,
            });
        }

        if character == '\\' {
            match iter.next() {
                Some((_, escaped)) if is_known_escape(escaped) => (),
                Some((position, character)) => {
                    return Err(CompileError::Syntax {
                        position,
                        character,
                    })
                }
                None => {
                    return Err(CompileError::Syntax {
                        position,
                        character,
                    })
                }
            }
        }
    }

    Ok(input)
}

fn is_forbidden_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0B' | '\x0C')
}

fn is_known_escape(c: char) -> bool {
    matches!(
        c,
        'w' | 'W' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' | 'A' | 'z' | 'n' | 't' | 'r' | 'f' | 'v'
    ) || c.is_ascii_punctuation()
}

/// The character an escape sequence stands for when it names a single
/// character rather than a class or anchor.
fn escaped_character(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'f' => Some('\x0C'),
        'v' => Some('\x0B'),
        c if c.is_ascii_punctuation() => Some(c),
        _ => None,
    }
}

fn root<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Root> {
    parcel::join(
        parcel::optional(expect_character('^')).map(|anchored| anchored.is_some()),
        alternation(),
    )
    .map(|(at_start, expressions)| ast::Root::new(expressions, at_start))
}

// Expression

fn alternation<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], Vec<ast::Expression>> {
    parcel::join(
        expression(),
        parcel::zero_or_more(parcel::right(parcel::join(
            expect_character('|'),
            expression(),
        ))),
    )
    .map(|(head, tail)| vec![head].into_iter().chain(tail).collect())
}

fn expression<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Expression> {
    parcel::zero_or_more(item()).map(ast::Expression)
}

fn item<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Item> {
    parcel::or(r#match().map(Into::into), || {
        parcel::or(group(), || anchor().map(Into::into))
    })
}

// Group

#[derive(Debug, Clone, PartialEq)]
enum GroupModifier {
    NonCapturing,
    Named(String),
}

fn group<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Item> {
    parcel::right(parcel::join(
        expect_character('('),
        parcel::optional(group_modifier()),
    ))
    .and_then(|modifier| {
        parcel::join(
            alternation(),
            parcel::right(parcel::join(
                expect_character(')'),
                parcel::optional(quantifier()),
            )),
        )
        .map(move |(expressions, quantifier)| {
            let quantifier = quantifier.unwrap_or(ast::Quantifier::Once);

            match modifier.clone() {
                Some(GroupModifier::NonCapturing) => {
                    ast::Group::new(expressions, quantifier).into()
                }
                Some(GroupModifier::Named(name)) => {
                    ast::CaptureGroup::new(expressions, quantifier, Some(name)).into()
                }
                None => ast::CaptureGroup::new(expressions, quantifier, None).into(),
            }
        })
    })
}

fn group_modifier<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], GroupModifier> {
    parcel::or(
        parcel::join(expect_character('?'), expect_character(':'))
            .map(|_| GroupModifier::NonCapturing),
        || {
            parcel::right(parcel::join(
                parcel::join(expect_character('?'), expect_character('<')),
                parcel::left(parcel::join(
                    parcel::one_or_more(character_matching(|c| {
                        c.is_ascii_alphanumeric() || c == '_'
                    })),
                    expect_character('>'),
                )),
            ))
            .map(|name| GroupModifier::Named(name.into_iter().collect()))
        },
    )
}

// Matchers

fn r#match<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Match> {
    parcel::join(match_item(), parcel::optional(quantifier())).map(|(item, quantifier)| {
        ast::Match::new(item, quantifier.unwrap_or(ast::Quantifier::Once))
    })
}

fn match_item<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::MatchItem> {
    parcel::or(lookahead(), || {
        parcel::or(character_type().map(Into::into), || {
            parcel::or(character_group().map(Into::into), || {
                parcel::or(character_class().map(Into::into), || {
                    parcel::or(expect_character('.').map(|_| ast::MatchItem::Period), || {
                        literal().map(ast::Char).map(Into::into)
                    })
                })
            })
        })
    })
}

fn lookahead<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::MatchItem> {
    parcel::right(parcel::join(
        parcel::join(expect_character('('), expect_character('?')),
        parcel::join(
            parcel::or(expect_character('=').map(|_| true), || {
                expect_character('!').map(|_| false)
            }),
            parcel::left(parcel::join(
                parcel::one_or_more(literal()),
                expect_character(')'),
            )),
        ),
    ))
    .map(|(positive, values)| match positive {
        true => ast::MatchItem::PositiveLookahead(values),
        false => ast::MatchItem::NegativeLookahead(values),
    })
}

fn character_type<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::CharacterType> {
    parcel::or(character_type_named(ast::CharacterType::Alnum), || {
        parcel::or(character_type_named(ast::CharacterType::Alpha), || {
            parcel::or(character_type_named(ast::CharacterType::Lower), || {
                character_type_named(ast::CharacterType::Upper)
            })
        })
    })
}

fn character_type_named<'a>(
    ty: ast::CharacterType,
) -> impl parcel::Parser<'a, &'a [(usize, char)], ast::CharacterType> {
    move |input: &'a [(usize, char)]| {
        let expected: Vec<char> = format!("[[:{}:]]", ty.name()).chars().collect();
        let matches_expected = input.len() >= expected.len()
            && input
                .iter()
                .zip(expected.iter())
                .all(|((_, actual), expected)| actual == expected);

        match (matches_expected, input.first()) {
            (true, Some(&(start, _))) => Ok(MatchStatus::Match {
                span: start..start + expected.len(),
                remainder: &input[expected.len()..],
                inner: ty,
            }),
            _ => Ok(MatchStatus::NoMatch(input)),
        }
    }
}

// Character Groups

fn character_group<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::CharacterGroup> {
    parcel::join(
        parcel::right(parcel::join(
            expect_character('['),
            parcel::optional(expect_character('^')).map(|negation| negation.is_some()),
        )),
        parcel::left(parcel::join(
            parcel::one_or_more(character_group_item()),
            expect_character(']'),
        )),
    )
    .map(|(invert, items)| ast::CharacterGroup::new(items, invert))
}

fn character_group_item<'a>(
) -> impl parcel::Parser<'a, &'a [(usize, char)], ast::CharacterGroupItem> {
    parcel::or(character_range().map(Into::into), || {
        group_character().map(ast::Char).map(Into::into)
    })
}

fn character_range<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::CharacterRange> {
    parcel::join(
        group_character(),
        parcel::right(parcel::join(expect_character('-'), group_character())),
    )
    .map(|(left, right)| ast::CharacterRange::new(ast::Char(left), ast::Char(right)))
}

// Character Classes

fn character_class<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::CharacterClass> {
    use ast::CharacterClass;

    parcel::or(escape('w').map(|_| CharacterClass::Word), || {
        parcel::or(escape('W').map(|_| CharacterClass::NonWord), || {
            parcel::or(escape('d').map(|_| CharacterClass::Digit), || {
                parcel::or(escape('D').map(|_| CharacterClass::NonDigit), || {
                    parcel::or(escape('h').map(|_| CharacterClass::Hex), || {
                        parcel::or(escape('H').map(|_| CharacterClass::NonHex), || {
                            parcel::or(escape('s').map(|_| CharacterClass::Space), || {
                                escape('S').map(|_| CharacterClass::NonSpace)
                            })
                        })
                    })
                })
            })
        })
    })
}

// Anchors

fn anchor<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Anchor> {
    parcel::or(escape('A').map(|_| ast::Anchor::StartOfString), || {
        parcel::or(escape('z').map(|_| ast::Anchor::EndOfString), || {
            expect_character('$').map(|_| ast::Anchor::EndOfLine)
        })
    })
}

// Quantifiers

fn quantifier<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Quantifier> {
    parcel::or(expect_character('*').map(|_| ast::Quantifier::ZeroOrMore), || {
        parcel::or(expect_character('+').map(|_| ast::Quantifier::OneOrMore), || {
            parcel::or(expect_character('?').map(|_| ast::Quantifier::Optional), || {
                range_quantifier()
            })
        })
    })
}

fn range_quantifier<'a>() -> impl parcel::Parser<'a, &'a [(usize, char)], ast::Quantifier> {
    parcel::left(parcel::join(
        parcel::right(parcel::join(
            expect_character('{'),
            parcel::join(
                integer(),
                parcel::optional(parcel::right(parcel::join(
                    expect_character(','),
                    parcel::optional(integer()),
                ))),
            ),
        )),
        expect_character('}'),
    ))
    .map(|(lower, upper)| match upper {
        None => ast::Quantifier::Exact(lower),
        Some(None) => ast::Quantifier::AtLeast(lower),
        Some(Some(upper)) => ast::Quantifier::Range(lower, upper),
    })
}

// Terminals

fn integer<'a>() -> impl Parser<'a, &'a [(usize, char)], usize> {
    move |input: &'a [(usize, char)]| {
        let preparsed_input = input;
        let res = parcel::one_or_more(digit(10))
            .map(|digits| digits.into_iter().collect::<String>().parse::<usize>())
            .parse(input);

        match res {
            Ok(MatchStatus::Match {
                span,
                remainder,
                inner: Ok(int),
            }) => Ok(MatchStatus::Match {
                span,
                remainder,
                inner: int,
            }),

            Ok(MatchStatus::Match { inner: Err(_), .. }) => {
                Ok(MatchStatus::NoMatch(preparsed_input))
            }

            Ok(MatchStatus::NoMatch(remainder)) => Ok(MatchStatus::NoMatch(remainder)),
            Err(e) => Err(e),
        }
    }
}

/// A backslash followed by the given character.
fn escape<'a>(c: char) -> impl Parser<'a, &'a [(usize, char)], (char, char)> {
    parcel::join(expect_character('\\'), expect_character(c))
}

/// A character outside of a group, either escaped or any character that
/// isn't a metacharacter.
fn literal<'a>() -> impl Parser<'a, &'a [(usize, char)], char> {
    any_character_escaped(|c| !METACHARACTERS.contains(&c))
}

/// A character inside of a group, where only the closing bracket needs
/// escaping.
fn group_character<'a>() -> impl Parser<'a, &'a [(usize, char)], char> {
    any_character_escaped(|c| c != ']' && c != '\\')
}

fn any_character_escaped<'a, F>(unescaped: F) -> impl Parser<'a, &'a [(usize, char)], char>
where
    F: Fn(char) -> bool,
{
    move |input: &'a [(usize, char)]| match input.get(0..2) {
        Some(&[(escape_pos, '\\'), (_, to_escape)]) => match escaped_character(to_escape) {
            Some(escaped) => Ok(MatchStatus::Match {
                span: escape_pos..escape_pos + 2,
                remainder: &input[2..],
                inner: escaped,
            }),
            None => Ok(MatchStatus::NoMatch(input)),
        },
        _ => match input.first() {
            Some(&(pos, c)) if c != '\\' && unescaped(c) => Ok(MatchStatus::Match {
                span: pos..pos + 1,
                remainder: &input[1..],
                inner: c,
            }),
            _ => Ok(MatchStatus::NoMatch(input)),
        },
    }
}

fn character_matching<'a, F>(predicate: F) -> impl Parser<'a, &'a [(usize, char)], char>
where
    F: Fn(char) -> bool,
{
    move |input: &'a [(usize, char)]| match input.first() {
        Some(&(pos, c)) if predicate(c) => Ok(MatchStatus::Match {
            span: pos..pos + 1,
            remainder: &input[1..],
            inner: c,
        }),
        _ => Ok(MatchStatus::NoMatch(input)),
    }
}
