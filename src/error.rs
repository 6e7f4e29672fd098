use std::path::PathBuf;
use thiserror::Error;

use crate::core::types::TargetId;

/// Configuration loading failures. Loading is all-or-nothing: any of these
/// leaves the caller with no config instead of a half-populated one.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config root must be a flat key/value object")]
    NotAnObject,

    #[error("unknown config key `{0}`")]
    UnknownKey(String),

    #[error("invalid value for config key `{0}`")]
    InvalidValue(String),

    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("score bins must be strictly ascending")]
    BinsNotAscending,
}

/// Precondition failures raised by the extractor. A failed call emits
/// nothing: the consumer is left exactly as it was.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("span [{start}, {end}] outside context of length {len}")]
    SpanOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("candidate list is empty")]
    NoTranslations,

    #[error("target id {0} is not in the target index")]
    UnknownTargetId(TargetId),

    #[error("alignment pair ({src}, {tgt}) outside phrase bounds")]
    AlignmentOutOfBounds { src: usize, tgt: usize },

    #[error("factor {factor} out of range, words carry {count} factors")]
    FactorOutOfBounds { factor: usize, count: usize },

    #[error("score index {index} out of range for {len} scores")]
    ScoreIndexOutOfBounds { index: usize, len: usize },

    #[error("position {0} appears in both the terminal and non-terminal alignment")]
    OverlappingAlignments(usize),
}

/// Failures while saving or loading the shared target index.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("index encoding failed: {0}")]
    Codec(#[from] bincode::Error),
}
