use crate::backend::Backend;

/// Every failure that can occur between reading a pattern and producing a
/// runnable matcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("invalid character {character:?} at position {position}")]
    Syntax { position: usize, character: char },
    #[error("unable to parse pattern at position {position}: {reason}")]
    Parse { position: usize, reason: String },
    #[error("invalid quantifier: lower bound {lower} exceeds upper bound {upper}")]
    InvalidQuantifier { lower: usize, upper: usize },
    #[error("unable to lower program: {0}")]
    BackendLowering(String),
    #[error("the {0} backend is not supported on this target")]
    UnsupportedBackend(Backend),
    #[error("unable to allocate executable memory: {0}")]
    CodeBuffer(String),
}
