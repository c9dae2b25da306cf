//! The `token:frequency` wire format used by the forward index.
//!
//! A serialized list is a sequence of frames joined by `::`, each frame being
//! `token:frequency`. Tokens never contain `:` because [`strip_token`] removes
//! it (together with quotes and backslashes) before anything is written.

use std::borrow::Cow;
use std::str::Split;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Separator between two frames.
pub const FRAME_SEPARATOR: &str = "::";
/// Separator between the token and its frequency inside a frame.
pub const FIELD_SEPARATOR: char = ':';

const STRIPPED: [char; 4] = ['\'', '"', '\\', ':'];

/// One `(token, frequency)` entry of a serialized token list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TokenFrame {
    pub token: String,
    pub frequency: u32,
}

impl TokenFrame {
    pub fn new(token: impl Into<String>, frequency: u32) -> Self {
        Self {
            token: token.into(),
            frequency,
        }
    }
}

/// Borrowed view of a frame, produced by [`frames`] without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef<'a> {
    pub token: &'a str,
    pub frequency: u32,
}

/// Removes `'`, `"`, `\` and `:` from a raw token.
///
/// Borrows when the token is already clean.
pub fn strip_token(raw: &str) -> Cow<'_, str> {
    if raw.contains(STRIPPED) {
        Cow::Owned(raw.chars().filter(|c| !STRIPPED.contains(c)).collect())
    } else {
        Cow::Borrowed(raw)
    }
}

/// Serializes frames in the given order. Tokens are stripped on the way out.
pub fn encode_frames<'a, I>(frames: I) -> String
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let mut out = String::new();
    for (idx, (token, frequency)) in frames.into_iter().enumerate() {
        if idx > 0 {
            out.push_str(FRAME_SEPARATOR);
        }
        out.push_str(&strip_token(token));
        out.push(FIELD_SEPARATOR);
        out.push_str(&frequency.to_string());
    }
    out
}

/// Lazily decodes a serialized token list.
///
/// Frames are parsed on demand so a scan that stops early never touches the
/// remainder of the list. An empty input yields no frames.
pub fn frames(serialized: &str) -> Frames<'_> {
    Frames {
        inner: if serialized.is_empty() {
            None
        } else {
            Some(serialized.split(FRAME_SEPARATOR))
        },
    }
}

/// Eagerly decodes a serialized token list, failing on the first bad frame.
pub fn parse_frames(serialized: &str) -> Result<Vec<TokenFrame>, FrameError> {
    frames(serialized)
        .map(|frame| frame.map(|f| TokenFrame::new(f.token, f.frequency)))
        .collect()
}

/// Iterator returned by [`frames`].
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    inner: Option<Split<'a, &'static str>>,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<FrameRef<'a>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.inner.as_mut()?.next()?;
        Some(parse_frame(raw))
    }
}

fn parse_frame(raw: &str) -> Result<FrameRef<'_>, FrameError> {
    let mut fields = raw.split(FIELD_SEPARATOR);
    let (Some(token), Some(frequency), None) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(FrameError::FieldCount {
            frame: raw.to_string(),
        });
    };
    let frequency = frequency
        .parse::<u32>()
        .map_err(|_| FrameError::Frequency {
            frame: raw.to_string(),
        })?;
    Ok(FrameRef { token, frequency })
}
