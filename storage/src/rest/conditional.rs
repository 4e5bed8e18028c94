//! Conditional-write headers: `If-Unmodified-Since` on the way in,
//! `Last-Modified` on the way out, per storage.md §8. Two inbound header
//! formats are accepted: the standard RFC 1123 HTTP-date (second
//! resolution), and `X-Current-If-Unmodified-Since`, a bare decimal
//! microsecond timestamp round-tripping the engine's own `Us` values
//! exactly. When both are present, the `X-Current-*` header takes
//! precedence, since it alone can express sub-second ordering.

use chrono::{DateTime, Utc};

use crate::clock::Us;
use crate::rest::{RestError, RestErrorName};

/// Parses `X-Current-If-Unmodified-Since`: a bare decimal microsecond
/// timestamp.
pub fn parse_current_if_unmodified_since(raw: &str) -> Result<Us, RestError> {
    raw.trim().parse::<Us>().map_err(|err| {
        RestError::new(RestErrorName::InvalidHeader, format!("invalid X-Current-If-Unmodified-Since: {err}"))
    })
}

pub fn format_current_if_unmodified_since(us: Us) -> String {
    us.to_string()
}

pub fn format_current_last_modified(us: Us) -> String {
    us.to_string()
}

/// Parses the standard `If-Unmodified-Since` header: an RFC 1123 HTTP-date
/// (e.g. `"Tue, 15 Nov 1994 08:12:31 GMT"`), truncated to second resolution
/// the way HTTP dates always are.
pub fn parse_if_unmodified_since(raw: &str) -> Result<Us, RestError> {
    let normalized = raw.trim().replace("GMT", "+0000");
    let parsed = DateTime::parse_from_rfc2822(&normalized)
        .map_err(|err| RestError::new(RestErrorName::InvalidHeader, format!("invalid If-Unmodified-Since: {err}")))?;
    Ok(parsed.with_timezone(&Utc).timestamp_micros())
}

/// Renders `Last-Modified` as an RFC 1123 (IMF-fixdate) HTTP-date.
pub fn format_last_modified(us: Us) -> String {
    let seconds = us.div_euclid(1_000_000);
    let dt = DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Resolves the effective `If-Unmodified-Since` instant from whichever of
/// the two conditional headers were present on the request, preferring
/// `X-Current-If-Unmodified-Since` (microsecond-precise) over the standard
/// RFC 1123 header (second-precise) when both are given.
pub fn resolve_if_unmodified_since(
    current_header: Option<&str>,
    standard_header: Option<&str>,
) -> Result<Option<Us>, RestError> {
    if let Some(raw) = current_header {
        return Ok(Some(parse_current_if_unmodified_since(raw)?));
    }
    if let Some(raw) = standard_header {
        return Ok(Some(parse_if_unmodified_since(raw)?));
    }
    Ok(None)
}

/// Checks a conditional write's precondition: the request succeeds only if
/// the caller's `If-Unmodified-Since` is at or after the entry's actual
/// last-modified instant, i.e. the caller has seen every change made to it
/// so far.
pub fn check_precondition(
    if_unmodified_since: Option<Us>,
    last_modified: Option<Us>,
) -> Result<(), RestError> {
    match (if_unmodified_since, last_modified) {
        (None, _) => Ok(()),
        (Some(_), None) => Ok(()),
        (Some(claimed), Some(actual)) if claimed >= actual => Ok(()),
        (Some(claimed), Some(actual)) => Err(RestError::with_details(
            RestErrorName::ResourceWasModifiedError,
            "entry was modified since the claimed If-Unmodified-Since",
            serde_json::json!({ "requested": claimed, "actual": actual }),
        )),
    }
}
