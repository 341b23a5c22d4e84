//! Conditional request preconditions (`If-Match`, `If-None-Match`,
//! `If-Modified-Since`, `If-Unmodified-Since`).

use axum::http::{HeaderMap, HeaderName, header};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tracing::debug;

/// Preconditions forwarded to the store with a GET.
///
/// Etags are kept with their weak prefix and quotes stripped. `uploaded_after`
/// is already shifted forward one second: HTTP dates have second granularity
/// while upload times carry milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConditionalSpec {
    pub etag_does_not_match: Option<String>,
    pub etag_matches: Option<String>,
    pub uploaded_after: Option<DateTime<Utc>>,
    pub uploaded_before: Option<DateTime<Utc>>,
}

/// Response owed when the store withheld a body because a precondition
/// did not hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionalOutcome {
    NotModified,
    PreconditionFailed,
}

impl ConditionalSpec {
    /// Read the conditional request headers. Returns `None` when none of the
    /// four conditional headers carries a usable value.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let spec = Self {
            etag_does_not_match: header_str(headers, &header::IF_NONE_MATCH)
                .map(|v| strip_etag_quoting(v).to_string()),
            etag_matches: header_str(headers, &header::IF_MATCH)
                .map(|v| strip_etag_quoting(v).to_string()),
            uploaded_after: header_date(headers, &header::IF_MODIFIED_SINCE)
                .map(|t| t + TimeDelta::seconds(1)),
            uploaded_before: header_date(headers, &header::IF_UNMODIFIED_SINCE),
        };

        if spec == Self::default() {
            None
        } else {
            Some(spec)
        }
    }

    /// Whether an object with `etag` uploaded at `uploaded` passes every
    /// present precondition.
    pub fn is_satisfied_by(&self, etag: &str, uploaded: DateTime<Utc>) -> bool {
        let etag = strip_etag_quoting(etag);

        if let Some(expected) = &self.etag_matches {
            if expected != "*" && expected != etag {
                return false;
            }
        }
        if let Some(unexpected) = &self.etag_does_not_match {
            if unexpected == "*" || unexpected == etag {
                return false;
            }
        }
        if let Some(before) = self.uploaded_before {
            if uploaded >= before {
                return false;
            }
        }
        if let Some(after) = self.uploaded_after {
            if uploaded <= after {
                return false;
            }
        }
        true
    }

    /// Outcome for a body-less object. The first present field wins, in the
    /// order etag-does-not-match, uploaded-after, etag-matches,
    /// uploaded-before.
    pub fn short_circuit_outcome(&self) -> Option<ConditionalOutcome> {
        if self.etag_does_not_match.is_some() || self.uploaded_after.is_some() {
            Some(ConditionalOutcome::NotModified)
        } else if self.etag_matches.is_some() || self.uploaded_before.is_some() {
            Some(ConditionalOutcome::PreconditionFailed)
        } else {
            None
        }
    }
}

/// Strip an optional `W/` prefix and the surrounding double quotes.
///
/// Values that are not fully quoted are returned unchanged.
pub fn strip_etag_quoting(value: &str) -> &str {
    value
        .strip_prefix("W/")
        .unwrap_or(value)
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parse an HTTP date: IMF-fixdate, with RFC 850 and asctime fallbacks.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn header_date(headers: &HeaderMap, name: &HeaderName) -> Option<DateTime<Utc>> {
    let raw = header_str(headers, name)?;
    let parsed = parse_http_date(raw);
    if parsed.is_none() {
        debug!("ignoring unparseable {}: {}", name, raw);
    }
    parsed
}
