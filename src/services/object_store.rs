//! The object store seam consumed by the gateway.
//!
//! The gateway only ever reads: `get` (optionally range- and
//! condition-qualified), `head`, and single-level prefix listings.

use crate::models::{
    conditional::ConditionalSpec,
    listing::{ListOptions, ListingResult},
    object::StoredObject,
    range::RangeSpec,
};
use async_trait::async_trait;
use serde::Serialize;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("The requested range is not satisfiable")]
    RangeNotSatisfiable,
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Qualifiers for a `get`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub range: Option<RangeSpec>,
    pub only_if: Option<ConditionalSpec>,
}

/// Outcome of one readiness probe, as reported by `/readyz`.
#[derive(Clone, Debug, Serialize)]
pub struct ReadinessCheck {
    #[serde(skip)]
    pub name: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

impl ReadinessCheck {
    pub fn ok(name: &'static str) -> Self {
        Self {
            name,
            ok: true,
            error: None,
        }
    }

    pub fn failed(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object with its body.
    ///
    /// Returns `Ok(None)` when the key does not exist. When `only_if` is set
    /// and a precondition does not hold, returns the object *without* a body.
    /// A range starting at or past the end of the object fails with
    /// [`StorageError::RangeNotSatisfiable`].
    async fn get(&self, key: &str, options: &GetOptions) -> StorageResult<Option<StoredObject>>;

    /// Fetch object metadata only; the returned object never has a body.
    async fn head(&self, key: &str) -> StorageResult<Option<StoredObject>>;

    async fn list(&self, options: &ListOptions) -> StorageResult<ListingResult>;

    async fn readiness(&self) -> Vec<ReadinessCheck> {
        Vec::new()
    }
}
