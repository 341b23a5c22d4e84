//! Represents an object (blob) as read from the backing store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sqlx::FromRow;
use std::{fmt, io};

/// A single row of the `objects` metadata table.
///
/// The row describes the payload stored on disk; it never carries content
/// bytes itself. Soft-deleted rows are filtered out in SQL and never reach
/// this type.
#[derive(Clone, FromRow, Debug)]
pub struct ObjectRecord {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Full payload size in bytes.
    pub size_bytes: i64,

    /// Content hash, stored without surrounding quotes.
    pub etag: String,

    /// Upload time, millisecond precision.
    pub last_modified: DateTime<Utc>,

    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub cache_expiry: Option<DateTime<Utc>>,
}

/// HTTP metadata recorded alongside an object at upload time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpMetadata {
    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub cache_expiry: Option<DateTime<Utc>>,
}

/// A streamed object payload together with the exact number of bytes the
/// stream will yield.
pub struct ObjectBody {
    pub stream: BoxStream<'static, io::Result<Bytes>>,
    pub length: u64,
}

impl ObjectBody {
    #[cfg(test)]
    pub fn from_bytes(bytes: Bytes) -> Self {
        use futures::StreamExt;

        let length = bytes.len() as u64;
        Self {
            stream: futures::stream::once(async move { Ok(bytes) }).boxed(),
            length,
        }
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Per-request snapshot of an object returned by the store.
///
/// `size` is always the full object size, even when `body` only covers a
/// byte range. `body` is `None` for head lookups and for conditional fetches
/// whose preconditions did not hold.
#[derive(Debug)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub uploaded: DateTime<Utc>,
    pub http_metadata: HttpMetadata,
    pub body: Option<ObjectBody>,
}

impl StoredObject {
    /// The etag wrapped in double quotes, as sent in the `etag` header.
    pub fn http_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}

impl From<ObjectRecord> for StoredObject {
    fn from(record: ObjectRecord) -> Self {
        Self {
            key: record.key,
            size: u64::try_from(record.size_bytes).unwrap_or(0),
            etag: record.etag,
            uploaded: record.last_modified,
            http_metadata: HttpMetadata {
                content_type: record.content_type,
                content_language: record.content_language,
                content_disposition: record.content_disposition,
                content_encoding: record.content_encoding,
                cache_control: record.cache_control,
                cache_expiry: record.cache_expiry,
            },
            body: None,
        }
    }
}
