//! Single contiguous byte ranges (`Range: bytes=<start>-<end>`).

use axum::http::{HeaderMap, header};

/// A closed byte interval `[offset, offset + length - 1]`.
///
/// `length` is always at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub offset: u64,
    pub length: u64,
}

impl RangeSpec {
    /// Read the `Range` header, if any, and parse it.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    /// Parse `bytes=<start>-<end>` with both bounds present.
    ///
    /// Open-ended (`bytes=10-`), suffix (`bytes=-10`) and multi-range values
    /// yield `None`, as does `end < start`. Callers serve the full object in
    /// that case.
    pub fn parse(value: &str) -> Option<Self> {
        let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
        let offset = parse_digits(start)?;
        let end = parse_digits(end)?;
        let length = end.checked_sub(offset)?.checked_add(1)?;
        Some(Self { offset, length })
    }

    /// Last requested byte, clamped to the final byte of an object of `size`
    /// bytes.
    pub fn last_byte(&self, size: u64) -> u64 {
        (self.offset + (self.length - 1)).min(size.saturating_sub(1))
    }

    /// Number of bytes actually served from an object of `size` bytes, or
    /// `None` when the range starts at or past the end of the object.
    pub fn satisfiable_len(&self, size: u64) -> Option<u64> {
        if self.offset >= size {
            return None;
        }
        Some(self.last_byte(size) - self.offset + 1)
    }
}

fn parse_digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
