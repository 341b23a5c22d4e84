//! Prefix listings returned by the store.

use chrono::{DateTime, Utc};

/// Parameters of a single-level prefix listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: String,
    pub delimiter: String,
    pub limit: usize,
}

/// An object entry of a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
}

/// Result of a delimited listing, both sequences ordered by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingResult {
    /// Common prefixes one delimiter below the requested prefix, each ending
    /// in the delimiter.
    pub delimited_prefixes: Vec<String>,
    pub objects: Vec<ListedObject>,
    /// More entries exist past the listing limit.
    pub truncated: bool,
}

impl ListingResult {
    /// Number of entries: each common prefix counts once.
    pub fn len(&self) -> usize {
        self.delimited_prefixes.len() + self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delimited_prefixes.is_empty() && self.objects.is_empty()
    }
}
