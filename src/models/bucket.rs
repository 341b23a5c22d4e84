//! Represents the bucket the gateway serves from.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket row.
///
/// The gateway is bound to exactly one bucket at startup; every object lookup
/// and listing is scoped to its `id`.
#[derive(Clone, FromRow, Debug)]
pub struct Bucket {
    /// Internal identifier, referenced by `objects.bucket_id`.
    pub id: Uuid,

    /// Bucket name, also the first path segment of the on-disk layout.
    pub name: String,

    /// Region the bucket was created in (informational).
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
