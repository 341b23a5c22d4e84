//! In-memory `ObjectStore` used by the resolver and handler tests.
//!
//! Mirrors the SQLite store's semantics (preconditions, ranges, delimited
//! listing) and records every call so tests can assert on store traffic.

use crate::{
    models::{
        listing::{ListOptions, ListedObject, ListingResult},
        object::{HttpMetadata, ObjectBody, StoredObject},
    },
    services::{
        object_store::{GetOptions, ObjectStore, StorageError, StorageResult},
        storage_service::compute_common_prefix,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::{collections::BTreeMap, sync::Mutex};

#[derive(Clone, Debug)]
struct Entry {
    bytes: Bytes,
    etag: String,
    uploaded: DateTime<Utc>,
    http_metadata: HttpMetadata,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: BTreeMap<String, Entry>,
    calls: Mutex<Vec<String>>,
    fail_with: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with an I/O error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn uploaded() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    pub fn with(self, key: &str, body: &str) -> Self {
        self.with_meta(key, body, HttpMetadata::default())
    }

    pub fn with_meta(mut self, key: &str, body: &str, http_metadata: HttpMetadata) -> Self {
        self.objects.insert(
            key.to_string(),
            Entry {
                bytes: Bytes::copy_from_slice(body.as_bytes()),
                etag: format!("etag-{}", key.replace('/', "-")),
                uploaded: Self::uploaded(),
                http_metadata,
            },
        );
        self
    }

    /// Calls recorded so far, formatted as `get <key>`, `head <key>` or
    /// `list <prefix>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> StorageResult<()> {
        self.calls.lock().unwrap().push(call);
        match &self.fail_with {
            Some(message) => Err(StorageError::Io(std::io::Error::other(message.clone()))),
            None => Ok(()),
        }
    }

    fn object(key: &str, entry: &Entry) -> StoredObject {
        StoredObject {
            key: key.to_string(),
            size: entry.bytes.len() as u64,
            etag: entry.etag.clone(),
            uploaded: entry.uploaded,
            http_metadata: entry.http_metadata.clone(),
            body: None,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str, options: &GetOptions) -> StorageResult<Option<StoredObject>> {
        self.record(format!("get {}", key))?;
        let Some(entry) = self.objects.get(key) else {
            return Ok(None);
        };
        let mut object = Self::object(key, entry);

        if let Some(only_if) = &options.only_if {
            if !only_if.is_satisfied_by(&entry.etag, entry.uploaded) {
                return Ok(Some(object));
            }
        }

        let bytes = match options.range {
            Some(range) => {
                let len = range
                    .satisfiable_len(object.size)
                    .ok_or(StorageError::RangeNotSatisfiable)?;
                let start = range.offset as usize;
                entry.bytes.slice(start..start + len as usize)
            }
            None => entry.bytes.clone(),
        };
        object.body = Some(ObjectBody::from_bytes(bytes));
        Ok(Some(object))
    }

    async fn head(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        self.record(format!("head {}", key))?;
        Ok(self.objects.get(key).map(|entry| Self::object(key, entry)))
    }

    async fn list(&self, options: &ListOptions) -> StorageResult<ListingResult> {
        self.record(format!("list {}", options.prefix))?;
        let mut result = ListingResult::default();
        let mut folded: Option<String> = None;
        for (key, entry) in self.objects.range(options.prefix.clone()..) {
            if !key.starts_with(&options.prefix) {
                break;
            }
            if folded.as_deref().is_some_and(|prefix| key.starts_with(prefix)) {
                continue;
            }
            if result.len() == options.limit {
                result.truncated = true;
                break;
            }
            match compute_common_prefix(key, &options.prefix, &options.delimiter) {
                Some(prefix) => {
                    result.delimited_prefixes.push(prefix.clone());
                    folded = Some(prefix);
                }
                None => result.objects.push(ListedObject {
                    key: key.clone(),
                    size: entry.bytes.len() as u64,
                    uploaded: entry.uploaded,
                }),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_options(prefix: &str, limit: usize) -> ListOptions {
        ListOptions {
            prefix: prefix.into(),
            delimiter: "/".into(),
            limit,
        }
    }

    #[tokio::test]
    async fn test_should_count_common_prefix_once_toward_limit() {
        let store = (0..1001)
            .fold(MemoryStore::new(), |store, n| {
                store.with(&format!("reports/2024/{:04}.pdf", n), "x")
            })
            .with("reports/zeta.csv", "x");

        let listing = store.list(&list_options("reports/", 1000)).await.unwrap();
        assert_eq!(listing.delimited_prefixes, vec!["reports/2024/".to_string()]);
        assert_eq!(listing.objects.len(), 1);
        assert_eq!(listing.objects[0].key, "reports/zeta.csv");
        assert!(!listing.truncated);

        let listing = store.list(&list_options("reports/", 1)).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing.truncated);
    }
}
