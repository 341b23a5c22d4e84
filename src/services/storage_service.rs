//! src/services/storage_service.rs
//!
//! StorageService: read-only object store backed by SQLite for metadata and
//! local disk for object payloads, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Objects are written by an
//! external uploader using the same layout; the gateway never mutates either
//! side.

use crate::{
    models::{
        bucket::Bucket,
        listing::{ListOptions, ListedObject, ListingResult},
        object::{ObjectBody, ObjectRecord, StoredObject},
    },
    services::object_store::{
        GetOptions, ObjectStore, ReadinessCheck, StorageError, StorageResult,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{ErrorKind, SeekFrom},
    path::PathBuf,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_LIST_LIMIT: usize = 1000;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Lower bound of the next listing page.
enum ScanFrom {
    /// Strictly after the last listed object key.
    After(String),
    /// At or after the first key past a folded common prefix.
    AtLeast(String),
}

/// StorageService serves the read side of a single bucket:
/// - `get` reads metadata from SQLite and streams the payload from disk,
///   honoring byte ranges and preconditions
/// - `head` reads metadata only
/// - `list` queries SQLite and groups keys by delimiter
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata lookups.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    bucket: Bucket,
}

impl StorageService {
    /// Bind to the bucket called `name`. Fails with `BucketNotFound` if no
    /// such bucket row exists.
    pub async fn open(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        name: &str,
    ) -> StorageResult<Self> {
        ensure_bucket_name_safe(name)?;
        let bucket = sqlx::query_as::<_, Bucket>(
            "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*db)
        .await?
        .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))?;

        info!(
            "Serving bucket {} (region {}, created {})",
            bucket.name, bucket.region, bucket.created_at
        );

        Ok(Self {
            db,
            base_path: base_path.into(),
            bucket,
        })
    }

    /// Compute the physical base folder path for the bucket.
    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket.name)
    }

    /// Two-level shard identifiers for an object key: the first two bytes
    /// of MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Fully-qualified payload path: base_path/bucket/{shard}/{shard}/{key}.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket.name, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Fetch a non-deleted object metadata record.
    async fn fetch_object(&self, key: &str) -> StorageResult<Option<ObjectRecord>> {
        let record = sqlx::query_as::<_, ObjectRecord>(
            "SELECT key, size_bytes, etag, last_modified, content_type, content_language,
                    content_disposition, content_encoding, cache_control, cache_expiry
             FROM objects
             WHERE bucket_id = ? AND key = ? AND is_deleted = 0",
        )
        .bind(self.bucket.id)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    /// Open the payload of `key` positioned at `offset`, limited to `length`
    /// bytes. A missing payload file is reported as `None`.
    async fn open_body(
        &self,
        key: &str,
        offset: u64,
        length: u64,
    ) -> StorageResult<Option<ObjectBody>> {
        let file_path = self.object_path(key);
        let mut file = match File::open(&file_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "metadata for `{}` has no payload at {}",
                    key,
                    file_path.display()
                );
                return Ok(None);
            }
            Err(err) => return Err(StorageError::Io(err)),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        Ok(Some(ObjectBody {
            stream: ReaderStream::new(file.take(length)).boxed(),
            length,
        }))
    }

    /// One page of live rows under `prefix`, ordered by key.
    ///
    /// The prefix is matched as the half-open key range
    /// `[prefix, prefix_upper_bound(prefix))` so the
    /// `(bucket_id, is_deleted, key)` index serves the scan. SQLite compares
    /// TEXT bytewise, which makes the match exact and case-sensitive.
    async fn list_page(
        &self,
        prefix: &str,
        resume: Option<&ScanFrom>,
        page_size: usize,
    ) -> StorageResult<Vec<ObjectRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT key, size_bytes, etag, last_modified, content_type, content_language, \
             content_disposition, content_encoding, cache_control, cache_expiry \
             FROM objects WHERE bucket_id = ",
        );
        builder.push_bind(self.bucket.id);
        builder.push(" AND is_deleted = 0");

        if !prefix.is_empty() {
            builder.push(" AND key >= ");
            builder.push_bind(prefix.to_string());
            if let Some(upper) = prefix_upper_bound(prefix) {
                builder.push(" AND key < ");
                builder.push_bind(upper);
            }
        }

        match resume {
            Some(ScanFrom::After(key)) => {
                builder.push(" AND key > ");
                builder.push_bind(key.clone());
            }
            Some(ScanFrom::AtLeast(key)) => {
                builder.push(" AND key >= ");
                builder.push_bind(key.clone());
            }
            None => {}
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(i64::try_from(page_size).unwrap_or(i64::MAX));

        let rows: Vec<ObjectRecord> = builder.build_query_as().fetch_all(&*self.db).await?;
        debug!("list page under `{}`: {} rows", prefix, rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn get(&self, key: &str, options: &GetOptions) -> StorageResult<Option<StoredObject>> {
        if !is_key_safe(key) {
            debug!("refusing unsafe key `{}`", key);
            return Ok(None);
        }
        let Some(record) = self.fetch_object(key).await? else {
            return Ok(None);
        };
        let mut object = StoredObject::from(record);

        if let Some(only_if) = &options.only_if {
            if !only_if.is_satisfied_by(&object.etag, object.uploaded) {
                debug!("precondition not met for `{}`, withholding body", key);
                return Ok(Some(object));
            }
        }

        let (offset, length) = match options.range {
            Some(range) => (
                range.offset,
                range
                    .satisfiable_len(object.size)
                    .ok_or(StorageError::RangeNotSatisfiable)?,
            ),
            None => (0, object.size),
        };

        match self.open_body(key, offset, length).await? {
            Some(body) => {
                object.body = Some(body);
                Ok(Some(object))
            }
            None => Ok(None),
        }
    }

    async fn head(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        if !is_key_safe(key) {
            debug!("refusing unsafe key `{}`", key);
            return Ok(None);
        }
        Ok(self.fetch_object(key).await?.map(StoredObject::from))
    }

    /// Delimited listing over the metadata table.
    ///
    /// `limit` counts listing entries: a common prefix counts once however
    /// many keys fold into it. Rows are read in key order in pages; once a
    /// row folds into a common prefix the scan jumps past every key sharing
    /// that prefix. `truncated` is set only when a further entry exists.
    async fn list(&self, options: &ListOptions) -> StorageResult<ListingResult> {
        let limit = options.limit.clamp(1, MAX_LIST_LIMIT);
        let page_size = limit + 1;

        let mut result = ListingResult::default();
        let mut resume: Option<ScanFrom> = None;
        'scan: loop {
            let rows = self
                .list_page(&options.prefix, resume.as_ref(), page_size)
                .await?;
            let exhausted = rows.len() < page_size;
            let mut folded: Option<String> = None;

            for record in rows {
                if folded
                    .as_deref()
                    .is_some_and(|prefix| record.key.starts_with(prefix))
                {
                    continue;
                }
                if result.len() == limit {
                    result.truncated = true;
                    break 'scan;
                }

                match compute_common_prefix(&record.key, &options.prefix, &options.delimiter) {
                    Some(prefix) => {
                        let Some(upper) = prefix_upper_bound(&prefix) else {
                            // every later key shares this prefix
                            result.delimited_prefixes.push(prefix);
                            break 'scan;
                        };
                        resume = Some(ScanFrom::AtLeast(upper));
                        result.delimited_prefixes.push(prefix.clone());
                        folded = Some(prefix);
                    }
                    None => {
                        resume = Some(ScanFrom::After(record.key.clone()));
                        let object = StoredObject::from(record);
                        result.objects.push(ListedObject {
                            key: object.key,
                            size: object.size,
                            uploaded: object.uploaded,
                        });
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        Ok(result)
    }

    /// Runs a `SELECT 1` against SQLite and checks that the payload root is
    /// a readable directory. Read-only: nothing is written to disk.
    async fn readiness(&self) -> Vec<ReadinessCheck> {
        let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => ReadinessCheck::ok("sqlite"),
            Ok(v) => ReadinessCheck::failed("sqlite", format!("unexpected result: {}", v)),
            Err(e) => ReadinessCheck::failed("sqlite", format!("error: {}", e)),
        };

        let disk = match fs::read_dir(&self.base_path).await {
            Ok(_) => ReadinessCheck::ok("disk"),
            Err(e) => ReadinessCheck::failed(
                "disk",
                format!("could not read {}: {}", self.base_path.display(), e),
            ),
        };

        vec![sqlite, disk]
    }
}

/// Create the metadata tables if they do not exist yet. Returns the number
/// of statements executed.
pub async fn apply_schema(db: &SqlitePool) -> StorageResult<usize> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for stmt in &statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(statements.len())
}

/// Register `name` in the bucket table unless it already exists.
pub async fn ensure_bucket(db: &SqlitePool, name: &str, region: &str) -> StorageResult<()> {
    ensure_bucket_name_safe(name)?;
    let result = sqlx::query(
        "INSERT OR IGNORE INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(region.to_lowercase())
    .bind(chrono::Utc::now())
    .execute(db)
    .await?;

    if result.rows_affected() > 0 {
        info!("Registered bucket {}", name);
    }
    Ok(())
}

/// Basic key validation to avoid path traversal out of the bucket root.
///
/// Rejects empty or overlong keys, keys that begin with `/`, contain `..`,
/// backslashes or control characters.
fn is_key_safe(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_OBJECT_KEY_LEN
        && !key.starts_with('/')
        && !key.contains("..")
        && !key.bytes().any(|b| b.is_ascii_control() || b == b'\\')
}

/// Validate bucket name format: 3–63 characters of lowercase letters,
/// digits, dots and hyphens, starting and ending with a letter or digit.
fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    Ok(())
}

/// Smallest string greater than every string starting with `prefix`, or
/// `None` when no such bound exists (the prefix is all `char::MAX`).
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = (u32::from(last) + 1..=u32::from(char::MAX)).find_map(char::from_u32);
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Compute the delimited "common prefix" a key folds into, if any.
///
/// Returns `Some(prefix + segment + delimiter)` when the remainder of `key`
/// after `prefix` contains the delimiter, otherwise `None`.
pub(crate) fn compute_common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    if delimiter.is_empty() {
        return None;
    }
    let after_prefix = key.strip_prefix(prefix)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!(
        "{}{}",
        prefix,
        &after_prefix[..pos + delimiter.len()]
    ))
}
