//! Response headers derived from a stored object's metadata.

use crate::models::{object::StoredObject, range::RangeSpec};
use axum::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{
        CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG,
        LAST_MODIFIED,
    },
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

pub const X_R2_CONTENT_LANGUAGE: HeaderName = HeaderName::from_static("x-r2-content-language");
pub const X_R2_CONTENT_DISPOSITION: HeaderName =
    HeaderName::from_static("x-r2-content-disposition");
pub const X_R2_CONTENT_ENCODING: HeaderName = HeaderName::from_static("x-r2-content-encoding");
pub const X_R2_CACHE_CONTROL: HeaderName = HeaderName::from_static("x-r2-cache-control");
pub const X_R2_CACHE_EXPIRY: HeaderName = HeaderName::from_static("x-r2-cache-expiry");

/// Values that mark a content-disposition as a misplaced cache-control.
const CACHE_CONTROL_TOKENS: [&str; 6] = [
    "private",
    "public",
    "maxage",
    "max-age",
    "no-transform",
    "immutable",
];

/// Instruction to the transport about the response body, carried next to
/// the headers and attached to the response as an extension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyEncoding {
    /// The transport may encode the body as it sees fit.
    #[default]
    Auto,
    /// The body is already encoded as declared by `content-encoding`; it must
    /// be sent as-is.
    Manual,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectHeaders {
    pub headers: HeaderMap,
    pub encode_body: BodyEncoding,
}

/// Build the response headers for `object`, optionally served as `range`.
///
/// `content-length` is always the full object size; the transport clamps it
/// to the bytes actually streamed. Only `content-type` is trusted from the
/// stored metadata: the other fields are exposed as `x-r2-*` diagnostic
/// copies, and the real `content-encoding`/`cache-control` are recovered
/// from content-disposition, where the uploader is known to misplace them.
pub fn compute_headers(object: &StoredObject, range: Option<RangeSpec>) -> ObjectHeaders {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_LENGTH, HeaderValue::from(object.size));
    insert_str(&mut headers, ETAG, &object.http_etag());
    insert_str(&mut headers, LAST_MODIFIED, &format_http_date(object.uploaded));

    if let Some(range) = range {
        insert_str(
            &mut headers,
            CONTENT_RANGE,
            &format!(
                "bytes {}-{}/{}",
                range.offset,
                range.last_byte(object.size),
                object.size
            ),
        );
    }

    let meta = &object.http_metadata;
    if let Some(content_type) = &meta.content_type {
        insert_str(&mut headers, CONTENT_TYPE, content_type);
    }
    if let Some(language) = &meta.content_language {
        insert_str(&mut headers, X_R2_CONTENT_LANGUAGE, language);
    }
    if let Some(disposition) = &meta.content_disposition {
        insert_str(&mut headers, X_R2_CONTENT_DISPOSITION, disposition);
        if disposition == "gzip" {
            insert_str(&mut headers, CONTENT_ENCODING, disposition);
        }
        // e.g. "max-age=31536000, no-transform, public"
        if CACHE_CONTROL_TOKENS
            .iter()
            .any(|token| disposition.contains(token))
        {
            insert_str(&mut headers, CACHE_CONTROL, disposition);
        }
    }
    if let Some(encoding) = &meta.content_encoding {
        insert_str(&mut headers, X_R2_CONTENT_ENCODING, encoding);
    }
    if let Some(cache_control) = &meta.cache_control {
        insert_str(&mut headers, X_R2_CACHE_CONTROL, cache_control);
    }
    if let Some(expiry) = meta.cache_expiry {
        insert_str(
            &mut headers,
            X_R2_CACHE_EXPIRY,
            &expiry.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }

    let encode_body = if headers.contains_key(CONTENT_ENCODING) {
        BodyEncoding::Manual
    } else {
        BodyEncoding::Auto
    };
    ObjectHeaders {
        headers,
        encode_body,
    }
}

/// RFC 1123 HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => debug!("skipping {}: not a valid header value", name),
    }
}
