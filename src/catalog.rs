//! Client-side view of the server's song catalog.
//!
//! The catalog is built once, from the LIST response fetched at startup, and is
//! only used to reject song indices locally before any connection is made.

use crate::command::Verb;
use jukebox_protocol::Frame;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Lines of a LIST payload that do not correspond to an index:
/// the title line, the trailing blank line, and one for zero-based indexing.
pub const FRAMING_OVERHEAD_LINES: usize = 3;

static LINE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r\n|\r|\n").expect("line separator pattern is valid"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} for which song?")]
    MissingIndex(Verb),

    #[error("Invalid song request, please try again.")]
    InvalidIndex(String),
}

/// Immutable snapshot of the valid song-index range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    max_index: Option<u32>,
}

impl Catalog {
    /// Catalog that rejects every index, used when the startup LIST failed
    pub fn unavailable() -> Self {
        Self { max_index: None }
    }

    pub fn from_frame(frame: &Frame) -> Self {
        Self::from_listing(&frame.text())
    }

    /// Derive the catalog from a LIST payload: `line count - FRAMING_OVERHEAD_LINES`
    pub fn from_listing(listing: &str) -> Self {
        let max_index = count_lines(listing)
            .checked_sub(FRAMING_OVERHEAD_LINES)
            .and_then(|max| u32::try_from(max).ok());
        Self { max_index }
    }

    /// Highest accepted index, `None` when no index is valid
    pub fn max_index(&self) -> Option<u32> {
        self.max_index
    }

    pub fn is_available(&self) -> bool {
        self.max_index.is_some()
    }

    /// Validate the index argument of an INFO or PLAY command
    pub fn validate(&self, verb: Verb, argument: Option<&str>) -> Result<u32, ValidationError> {
        let raw = argument.ok_or(ValidationError::MissingIndex(verb))?;
        let index: u32 = raw
            .parse()
            .map_err(|_| ValidationError::InvalidIndex(raw.to_string()))?;

        match self.max_index {
            Some(max) if index <= max => Ok(index),
            _ => Err(ValidationError::InvalidIndex(raw.to_string())),
        }
    }
}

/// Count lines on any of `\r\n`, `\r` or `\n`, ignoring trailing empty lines
fn count_lines(text: &str) -> usize {
    let mut lines: Vec<&str> = LINE_SEPARATOR.split(text).collect();
    while lines.len() > 1 && lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.len()
}
