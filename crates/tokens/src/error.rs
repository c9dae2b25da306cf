use thiserror::Error;

/// Errors raised while decoding a serialized `token:frequency` list.
///
/// Each variant carries the offending frame so callers can log it verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame `{frame}` must contain exactly one `:` separating token and frequency")]
    FieldCount { frame: String },
    #[error("frame `{frame}` has a frequency that is not a non-negative integer")]
    Frequency { frame: String },
}

/// Errors that can occur while tokenizing blocks or reading token files.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("malformed block line: {reason}")]
    MalformedLine { reason: String },
    #[error("block `{block_id}` declares {declared} tokens but carries {actual}")]
    CountMismatch {
        block_id: String,
        declared: u64,
        actual: u64,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl TokenError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        TokenError::MalformedLine {
            reason: reason.into(),
        }
    }
}
