//! Object resolution: decides which keys to fetch for a request path and
//! what the request resolves to.
//!
//! Modeled as an explicit state machine. Each state has one transition
//! function returning either the next state or a terminal [`Resolution`];
//! [`Resolver::resolve`] drives the loop. Store calls are issued strictly in
//! sequence because each depends on the outcome of the previous one.
//!
//! ```text
//! RobotsCheck ──► InternalKeyCheck ──► DirectLookup ──► RangeReencodingGuard ──► (object)
//!      │                 │                  │  ▲
//!   (robots)             │                  ▼  │
//!                        │            IndexFallback ──► (308)
//!                        ▼                  │
//!                  FallbackListing ◄────────┘──► (307 | listing)
//!                        │
//!                        ▼
//!                 NotFoundTerminal ──► (404.html | 404)
//! ```

use crate::{
    errors::AppError,
    handlers::headers::compute_headers,
    models::{
        conditional::ConditionalSpec,
        flags::FeatureFlags,
        listing::{ListOptions, ListingResult},
        object::StoredObject,
        range::RangeSpec,
    },
    services::object_store::{GetOptions, ObjectStore},
};
use axum::http::{HeaderMap, Method, StatusCode, header};
use percent_encoding::percent_decode_str;
use tracing::{debug, info, trace};

const INDEX_DOCUMENT: &str = "index.html";
const NOT_FOUND_DOCUMENT: &str = "404.html";
const ROBOTS_KEY: &str = "robots.txt";
const LIST_DELIMITER: &str = "/";
const LIST_LIMIT: usize = 1000;

const INTERNAL_KEYS: &[&str] = &[];
const INTERNAL_KEYS_PAGES: &[&str] = &["_headers"];

/// The two methods the gateway serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMethod {
    Get,
    Head,
}

impl ReadMethod {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::HEAD => Some(Self::Head),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

/// Per-request input to the resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveRequest {
    pub method: ReadMethod,
    /// Raw request path, still percent-encoded. Used for redirect targets.
    pub path: String,
    /// Decoded path without the leading `/`. Decoding is intentional:
    /// `/a%20b` addresses the stored key `a b`, not the literal `a%20b`.
    pub key: String,
    pub range: Option<RangeSpec>,
    pub only_if: Option<ConditionalSpec>,
}

impl ResolveRequest {
    /// Range and preconditions are only honored for GET.
    pub fn from_parts(method: ReadMethod, path: &str, headers: &HeaderMap) -> Self {
        let (range, only_if) = match method {
            ReadMethod::Get => (
                RangeSpec::from_headers(headers),
                ConditionalSpec::from_headers(headers),
            ),
            ReadMethod::Head => (None, None),
        };
        let raw_key = path.strip_prefix('/').unwrap_or(path);
        Self {
            method,
            path: path.to_string(),
            key: percent_decode_str(raw_key).decode_utf8_lossy().into_owned(),
            range,
            only_if,
        }
    }
}

#[derive(Debug)]
pub enum ResolveState {
    RobotsCheck,
    InternalKeyCheck,
    DirectLookup,
    IndexFallback,
    RangeReencodingGuard(StoredObject),
    FallbackListing,
    NotFoundTerminal,
}

/// What a request resolved to. Turned into an HTTP response by the
/// dispatcher.
#[derive(Debug)]
pub enum Resolution {
    /// `robots.txt` answered without touching the store.
    Robots,
    /// Serve a stored object. `only_if` decides 304/412 when the store
    /// withheld the body.
    Object {
        object: StoredObject,
        status: StatusCode,
        range: Option<RangeSpec>,
        only_if: Option<ConditionalSpec>,
    },
    Redirect {
        status: StatusCode,
        location: String,
    },
    Listing {
        prefix: String,
        listing: ListingResult,
    },
    NotFound,
}

enum Transition {
    Next(ResolveState),
    Done(Resolution),
}

pub struct Resolver<'a> {
    store: &'a dyn ObjectStore,
    flags: FeatureFlags,
    request: ResolveRequest,
    /// Key currently being looked up; grows an `index.html` suffix during
    /// the index fallback.
    key: String,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn ObjectStore, flags: FeatureFlags, request: ResolveRequest) -> Self {
        let key = request.key.clone();
        Self {
            store,
            flags,
            request,
            key,
        }
    }

    pub async fn resolve(mut self) -> Result<Resolution, AppError> {
        let mut state = ResolveState::RobotsCheck;
        loop {
            trace!("resolve state: {:?}", state);
            state = match self.step(state).await? {
                Transition::Next(next) => next,
                Transition::Done(resolution) => return Ok(resolution),
            };
        }
    }

    async fn step(&mut self, state: ResolveState) -> Result<Transition, AppError> {
        match state {
            ResolveState::RobotsCheck => Ok(self.robots_check()),
            ResolveState::InternalKeyCheck => Ok(self.internal_key_check()),
            ResolveState::DirectLookup => self.direct_lookup().await,
            ResolveState::IndexFallback => self.index_fallback().await,
            ResolveState::RangeReencodingGuard(object) => self.range_reencoding_guard(object).await,
            ResolveState::FallbackListing => self.fallback_listing().await,
            ResolveState::NotFoundTerminal => self.not_found_terminal().await,
        }
    }

    fn robots_check(&self) -> Transition {
        if self.flags.disallow_robots && self.key == ROBOTS_KEY {
            Transition::Done(Resolution::Robots)
        } else {
            Transition::Next(ResolveState::InternalKeyCheck)
        }
    }

    fn internal_key_check(&self) -> Transition {
        let internal_keys = if self.flags.emulate_pages {
            INTERNAL_KEYS_PAGES
        } else {
            INTERNAL_KEYS
        };
        if internal_keys.contains(&self.key.as_str()) {
            debug!("hiding internal key `{}`", self.key);
            Transition::Next(ResolveState::FallbackListing)
        } else {
            Transition::Next(ResolveState::DirectLookup)
        }
    }

    async fn direct_lookup(&mut self) -> Result<Transition, AppError> {
        // The bucket root is never an object.
        let object = if self.key.is_empty() {
            None
        } else {
            self.fetch(&self.key, self.lookup_options()).await?
        };

        Ok(match object {
            Some(object) => Transition::Next(ResolveState::RangeReencodingGuard(object)),
            None if self.flags.emulate_pages => Transition::Next(ResolveState::IndexFallback),
            None => Transition::Next(ResolveState::FallbackListing),
        })
    }

    async fn index_fallback(&mut self) -> Result<Transition, AppError> {
        if self.key.is_empty() || self.key.ends_with('/') {
            self.key.push_str(INDEX_DOCUMENT);
            let object = self.fetch(&self.key, self.lookup_options()).await?;
            return Ok(match object {
                Some(object) => Transition::Next(ResolveState::RangeReencodingGuard(object)),
                None => Transition::Next(ResolveState::FallbackListing),
            });
        }

        self.key.push('/');
        self.key.push_str(INDEX_DOCUMENT);
        debug!("HEAD {}", self.key);
        if self.store.head(&self.key).await?.is_some() {
            return Ok(Transition::Done(Resolution::Redirect {
                status: StatusCode::PERMANENT_REDIRECT,
                location: format!("{}/", self.request.path),
            }));
        }
        Ok(Transition::Next(ResolveState::FallbackListing))
    }

    /// Ranges are not honored for content-encoded objects: the range would
    /// address encoded bytes while `content-length` declares the decoded
    /// size. The encoding is only known after the first fetch.
    async fn range_reencoding_guard(&mut self, object: StoredObject) -> Result<Transition, AppError> {
        let only_if = self.request.only_if.clone();
        let Some(range) = self.request.range else {
            return Ok(Transition::Done(Resolution::Object {
                object,
                status: StatusCode::OK,
                range: None,
                only_if,
            }));
        };

        if !compute_headers(&object, Some(range))
            .headers
            .contains_key(header::CONTENT_ENCODING)
        {
            return Ok(Transition::Done(Resolution::Object {
                object,
                status: StatusCode::PARTIAL_CONTENT,
                range: Some(range),
                only_if,
            }));
        }

        info!("re-request without range");
        drop(object);
        let key = self.key.clone();
        let object = self
            .fetch(&key, GetOptions::default())
            .await?
            .ok_or(AppError::StoreConsistency { key })?;
        Ok(Transition::Done(Resolution::Object {
            object,
            status: StatusCode::OK,
            range: None,
            only_if,
        }))
    }

    async fn fallback_listing(&mut self) -> Result<Transition, AppError> {
        if !self.flags.list_directories {
            return Ok(Transition::Next(ResolveState::NotFoundTerminal));
        }

        let mut prefix = self.request.key.clone();
        let mut redirect = false;
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
            redirect = true;
        }

        let options = ListOptions {
            prefix,
            delimiter: LIST_DELIMITER.to_string(),
            limit: LIST_LIMIT,
        };
        debug!("list: {:?}", options);
        let listing = self.store.list(&options).await?;
        if listing.is_empty() {
            return Ok(Transition::Next(ResolveState::NotFoundTerminal));
        }

        info!(
            "listing {} prefixes, {} objects, truncated: {}",
            listing.delimited_prefixes.len(),
            listing.objects.len(),
            listing.truncated
        );
        Ok(Transition::Done(if redirect {
            Resolution::Redirect {
                status: StatusCode::TEMPORARY_REDIRECT,
                location: format!("{}/", self.request.path),
            }
        } else {
            Resolution::Listing {
                prefix: options.prefix,
                listing,
            }
        }))
    }

    async fn not_found_terminal(&mut self) -> Result<Transition, AppError> {
        if self.flags.emulate_pages {
            if let Some(object) = self.fetch(NOT_FOUND_DOCUMENT, GetOptions::default()).await? {
                return Ok(Transition::Done(Resolution::Object {
                    object,
                    status: StatusCode::NOT_FOUND,
                    range: None,
                    only_if: None,
                }));
            }
        }
        Ok(Transition::Done(Resolution::NotFound))
    }

    fn lookup_options(&self) -> GetOptions {
        GetOptions {
            range: self.request.range,
            only_if: self.request.only_if.clone(),
        }
    }

    /// GET with options, or HEAD (which ignores them).
    async fn fetch(&self, key: &str, options: GetOptions) -> Result<Option<StoredObject>, AppError> {
        debug!("{} {} {:?}", self.request.method.as_str(), key, options);
        let object = match self.request.method {
            ReadMethod::Get => self.store.get(key, &options).await?,
            ReadMethod::Head => self.store.head(key).await?,
        };
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::object::HttpMetadata,
        services::{
            memory_store::MemoryStore,
            object_store::{StorageError, StorageResult},
        },
    };
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn flags(raw: &str) -> FeatureFlags {
        FeatureFlags::parse(raw)
    }

    fn request(method: ReadMethod, path: &str, headers: &[(&'static str, &'static str)]) -> ResolveRequest {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(value));
        }
        ResolveRequest::from_parts(method, path, &map)
    }

    async fn resolve(store: &MemoryStore, flags: FeatureFlags, request: ResolveRequest) -> Resolution {
        Resolver::new(store, flags, request).resolve().await.unwrap()
    }

    fn gzip_meta() -> HttpMetadata {
        HttpMetadata {
            content_disposition: Some("gzip".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_should_parse_request_parts() {
        let get = request(
            ReadMethod::Get,
            "/a%20b/c.txt",
            &[("range", "bytes=0-9"), ("if-none-match", "\"x\"")],
        );
        assert_eq!(get.key, "a b/c.txt");
        assert_eq!(get.path, "/a%20b/c.txt");
        assert!(get.range.is_some());
        assert!(get.only_if.is_some());

        let head = request(ReadMethod::Head, "/a", &[("range", "bytes=0-9")]);
        assert_eq!(head.range, None);
        assert_eq!(head.only_if, None);
    }

    #[test]
    fn test_should_map_methods() {
        assert_eq!(ReadMethod::from_method(&Method::GET), Some(ReadMethod::Get));
        assert_eq!(ReadMethod::from_method(&Method::HEAD), Some(ReadMethod::Head));
        assert_eq!(ReadMethod::from_method(&Method::POST), None);
    }

    #[tokio::test]
    async fn test_should_answer_robots_without_store() {
        let store = MemoryStore::new().with("robots.txt", "allow all");
        let resolution = resolve(&store, flags("disallowRobots"), request(ReadMethod::Get, "/robots.txt", &[])).await;
        assert!(matches!(resolution, Resolution::Robots));
        assert!(store.calls().is_empty());

        let resolution = resolve(&store, flags(""), request(ReadMethod::Get, "/robots.txt", &[])).await;
        assert!(matches!(resolution, Resolution::Object { status, .. } if status == StatusCode::OK));
    }

    #[tokio::test]
    async fn test_should_serve_direct_object() {
        let store = MemoryStore::new().with("a.txt", "hello");
        let resolution = resolve(&store, flags(""), request(ReadMethod::Get, "/a.txt", &[])).await;
        let Resolution::Object { object, status, range, .. } = resolution else {
            panic!("expected object");
        };
        assert_eq!(status, StatusCode::OK);
        assert_eq!(range, None);
        assert!(object.body.is_some());
        assert_eq!(store.calls(), vec!["get a.txt"]);
    }

    #[tokio::test]
    async fn test_should_head_direct_object() {
        let store = MemoryStore::new().with("a.txt", "hello");
        let resolution = resolve(&store, flags(""), request(ReadMethod::Head, "/a.txt", &[])).await;
        let Resolution::Object { object, .. } = resolution else {
            panic!("expected object");
        };
        assert!(object.body.is_none());
        assert_eq!(store.calls(), vec!["head a.txt"]);
    }

    #[tokio::test]
    async fn test_should_serve_partial_content_for_plain_object() {
        let store = MemoryStore::new().with("a.txt", "0123456789");
        let resolution = resolve(
            &store,
            flags(""),
            request(ReadMethod::Get, "/a.txt", &[("range", "bytes=2-4")]),
        )
        .await;
        let Resolution::Object { status, range, object, .. } = resolution else {
            panic!("expected object");
        };
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(range, RangeSpec::parse("bytes=2-4"));
        assert_eq!(object.body.unwrap().length, 3);
    }

    #[tokio::test]
    async fn test_should_not_query_store_for_bucket_root() {
        let store = MemoryStore::new().with("index.html", "home");
        let resolution = resolve(&store, flags(""), request(ReadMethod::Get, "/", &[])).await;
        assert!(matches!(resolution, Resolution::NotFound));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_serve_root_index_when_emulating() {
        let store = MemoryStore::new().with("index.html", "home");
        let resolution = resolve(&store, flags("emulatePages"), request(ReadMethod::Get, "/", &[])).await;
        let Resolution::Object { object, status, .. } = resolution else {
            panic!("expected object");
        };
        assert_eq!(status, StatusCode::OK);
        assert_eq!(object.key, "index.html");
        assert_eq!(store.calls(), vec!["get index.html"]);
    }

    #[tokio::test]
    async fn test_should_serve_directory_index_with_trailing_slash() {
        let store = MemoryStore::new().with("docs/index.html", "docs home");
        let resolution = resolve(&store, flags("emulatePages"), request(ReadMethod::Get, "/docs/", &[])).await;
        let Resolution::Object { object, status, .. } = resolution else {
            panic!("expected object, no redirect");
        };
        assert_eq!(status, StatusCode::OK);
        assert_eq!(object.key, "docs/index.html");
        assert_eq!(store.calls(), vec!["get docs/", "get docs/index.html"]);
    }

    #[tokio::test]
    async fn test_should_redirect_to_trailing_slash_when_index_exists() {
        let store = MemoryStore::new().with("docs/index.html", "docs home");
        let resolution = resolve(&store, flags("emulatePages"), request(ReadMethod::Get, "/docs", &[])).await;
        let Resolution::Redirect { status, location } = resolution else {
            panic!("expected redirect");
        };
        assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
        assert_eq!(location, "/docs/");
        assert_eq!(store.calls(), vec!["get docs", "head docs/index.html"]);
    }

    #[tokio::test]
    async fn test_should_keep_encoded_path_in_redirect() {
        let store = MemoryStore::new().with("my docs/index.html", "x");
        let resolution = resolve(&store, flags("emulatePages"), request(ReadMethod::Get, "/my%20docs", &[])).await;
        let Resolution::Redirect { location, .. } = resolution else {
            panic!("expected redirect");
        };
        assert_eq!(location, "/my%20docs/");
    }

    #[tokio::test]
    async fn test_should_refetch_encoded_object_without_range() {
        let store = MemoryStore::new().with_meta("app.js", "compressed-bytes", gzip_meta());
        let resolution = resolve(
            &store,
            flags(""),
            request(ReadMethod::Get, "/app.js", &[("range", "bytes=0-3")]),
        )
        .await;
        let Resolution::Object { object, status, range, .. } = resolution else {
            panic!("expected object");
        };
        assert_eq!(status, StatusCode::OK);
        assert_eq!(range, None);
        assert_eq!(object.body.unwrap().length, 16);
        assert_eq!(store.calls(), vec!["get app.js", "get app.js"]);
    }

    /// Returns the object on the first get and nothing afterwards.
    struct VanishingStore {
        gets: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for VanishingStore {
        async fn get(&self, key: &str, options: &GetOptions) -> StorageResult<Option<StoredObject>> {
            if self.gets.fetch_add(1, Ordering::SeqCst) > 0 {
                return Ok(None);
            }
            let store = MemoryStore::new().with_meta(key, "payload", gzip_meta());
            store.get(key, options).await
        }

        async fn head(&self, _key: &str) -> StorageResult<Option<StoredObject>> {
            Ok(None)
        }

        async fn list(&self, _options: &ListOptions) -> StorageResult<ListingResult> {
            Err(StorageError::Io(std::io::Error::other("unexpected list")))
        }
    }

    #[tokio::test]
    async fn test_should_fail_when_object_vanishes_between_fetches() {
        let store = VanishingStore {
            gets: AtomicUsize::new(0),
        };
        let err = Resolver::new(
            &store,
            flags(""),
            request(ReadMethod::Get, "/app.js", &[("range", "bytes=0-3")]),
        )
        .resolve()
        .await
        .err()
        .unwrap();
        assert!(matches!(err, AppError::StoreConsistency { ref key } if key == "app.js"));
    }

    #[tokio::test]
    async fn test_should_hide_headers_file_when_emulating() {
        let store = MemoryStore::new().with("_headers", "/*\n  x-frame-options: deny");
        let resolution = resolve(&store, flags("emulatePages"), request(ReadMethod::Get, "/_headers", &[])).await;
        assert!(matches!(resolution, Resolution::NotFound));
        assert_eq!(store.calls(), vec!["get 404.html"]);

        let resolution = resolve(&store, flags(""), request(ReadMethod::Get, "/_headers", &[])).await;
        assert!(matches!(resolution, Resolution::Object { .. }));
    }

    #[tokio::test]
    async fn test_should_redirect_listing_prefix_without_slash() {
        let store = MemoryStore::new().with("reports/q1.pdf", "x");
        let resolution = resolve(&store, flags("listDirectories"), request(ReadMethod::Get, "/reports", &[])).await;
        let Resolution::Redirect { status, location } = resolution else {
            panic!("expected redirect");
        };
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location, "/reports/");
        assert_eq!(store.calls(), vec!["get reports", "list reports/"]);
    }

    #[tokio::test]
    async fn test_should_list_prefix_with_slash() {
        let store = MemoryStore::new()
            .with("reports/q1.pdf", "x")
            .with("reports/2024/a.pdf", "y");
        let resolution = resolve(&store, flags("listDirectories"), request(ReadMethod::Get, "/reports/", &[])).await;
        let Resolution::Listing { prefix, listing } = resolution else {
            panic!("expected listing");
        };
        assert_eq!(prefix, "reports/");
        assert_eq!(listing.delimited_prefixes, vec!["reports/2024/".to_string()]);
        assert_eq!(listing.objects.len(), 1);
    }

    #[tokio::test]
    async fn test_should_list_bucket_root() {
        let store = MemoryStore::new().with("a.txt", "x");
        let resolution = resolve(&store, flags("listDirectories"), request(ReadMethod::Get, "/", &[])).await;
        assert!(matches!(resolution, Resolution::Listing { ref prefix, .. } if prefix.is_empty()));
        assert_eq!(store.calls(), vec!["list "]);
    }

    #[tokio::test]
    async fn test_should_fall_through_empty_listing_to_custom_404() {
        let store = MemoryStore::new().with("404.html", "custom");
        let resolution = resolve(
            &store,
            flags("emulatePages,listDirectories"),
            request(ReadMethod::Get, "/missing", &[]),
        )
        .await;
        let Resolution::Object { object, status, .. } = resolution else {
            panic!("expected 404 document");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(object.key, "404.html");
        assert_eq!(
            store.calls(),
            vec!["get missing", "head missing/index.html", "list missing/", "get 404.html"]
        );
    }

    #[tokio::test]
    async fn test_should_head_custom_404() {
        let store = MemoryStore::new().with("404.html", "custom");
        let resolution = resolve(&store, flags("emulatePages"), request(ReadMethod::Head, "/nope", &[])).await;
        assert!(
            matches!(resolution, Resolution::Object { status, .. } if status == StatusCode::NOT_FOUND)
        );
        assert_eq!(store.calls(), vec!["head nope", "head nope/index.html", "head 404.html"]);
    }

    #[tokio::test]
    async fn test_should_resolve_plain_not_found() {
        let store = MemoryStore::new();
        let resolution = resolve(&store, flags(""), request(ReadMethod::Get, "/nope", &[])).await;
        assert!(matches!(resolution, Resolution::NotFound));
        assert_eq!(store.calls(), vec!["get nope"]);
    }

    #[tokio::test]
    async fn test_should_pass_conditional_spec_through() {
        let store = MemoryStore::new().with("a.txt", "hello");
        let resolution = resolve(
            &store,
            flags(""),
            request(ReadMethod::Get, "/a.txt", &[("if-none-match", "\"etag-a.txt\"")]),
        )
        .await;
        let Resolution::Object { object, only_if, .. } = resolution else {
            panic!("expected object");
        };
        assert!(object.body.is_none());
        assert_eq!(
            only_if.and_then(|c| c.etag_does_not_match),
            Some("etag-a.txt".to_string())
        );
    }
}
