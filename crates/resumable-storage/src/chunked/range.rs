//! Byte-range descriptor codec.
//!
//! Chunks are described with the partial-content notation
//! `bytes <from>-<to>/<total>`. The server decodes the descriptor sent in
//! `Content-Range`; clients use [`encode`] to build it.

use std::fmt;
use std::str::FromStr;

use resumable_core::error::AppError;
use resumable_core::result::AppResult;

const UNIT_PREFIX: &str = "bytes ";

/// A decoded byte-range descriptor.
///
/// Only parseability is guaranteed here; whether `from`, `to` and `total`
/// make sense for a session is decided by the ingestion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Offset of the first byte of the chunk.
    pub from: u64,
    /// End offset of the chunk as declared by the client.
    pub to: u64,
    /// Declared size of the complete file.
    pub total: u64,
}

impl ContentRange {
    /// Create a range descriptor.
    pub fn new(from: u64, to: u64, total: u64) -> Self {
        Self { from, to, total }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{UNIT_PREFIX}{}-{}/{}", self.from, self.to, self.total)
    }
}

impl FromStr for ContentRange {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Decode `bytes <from>-<to>/<total>` into its numeric parts.
pub fn decode(descriptor: &str) -> AppResult<ContentRange> {
    let rest = descriptor.trim().strip_prefix(UNIT_PREFIX).ok_or_else(|| {
        AppError::malformed_range(format!(
            "Range descriptor '{descriptor}' must start with 'bytes '"
        ))
    })?;

    let (span, total) = rest.split_once('/').ok_or_else(|| {
        AppError::malformed_range(format!(
            "Range descriptor '{descriptor}' is missing the '/' separator"
        ))
    })?;

    let (from, to) = span.split_once('-').ok_or_else(|| {
        AppError::malformed_range(format!(
            "Range descriptor '{descriptor}' is missing the '-' separator"
        ))
    })?;

    Ok(ContentRange {
        from: parse_offset(from, "from", descriptor)?,
        to: parse_offset(to, "to", descriptor)?,
        total: parse_offset(total, "total", descriptor)?,
    })
}

/// Build the descriptor for chunk `index` of a file split client-side.
///
/// The first chunk is described as `bytes 0-<part_size>/<total>`; every
/// later chunk as `bytes <index*chunk_size>-<(index+1)*chunk_size>/<total>`.
/// The end offset of the last chunk may run past `total`, which the server
/// accepts as completion.
pub fn encode(index: u64, chunk_size: u64, part_size: u64, total_size: u64) -> String {
    if index == 0 {
        ContentRange::new(0, part_size, total_size).to_string()
    } else {
        let from = chunk_size.saturating_mul(index);
        let to = chunk_size.saturating_mul(index + 1);
        ContentRange::new(from, to, total_size).to_string()
    }
}

fn parse_offset(raw: &str, field: &str, descriptor: &str) -> AppResult<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::malformed_range(format!(
            "Range descriptor '{descriptor}' has a non-numeric '{field}' value"
        )));
    }
    raw.parse::<u64>().map_err(|_| {
        AppError::malformed_range(format!(
            "Range descriptor '{descriptor}' has an out-of-range '{field}' value"
        ))
    })
}
