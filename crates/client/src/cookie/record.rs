//! Parsing `Set-Cookie` values into storable records.

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use larder_core::{clamp_ttl, ttl_from_secs};

/// A comma followed by the start of a new `name=` pair.
static NEW_PAIR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[^=;,\s]+\s*=").unwrap());

/// An `Expires` attribute cut off right after its weekday.
static OPEN_EXPIRES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)expires\s*=\s*[a-z]{3,9}\s*$").unwrap());

/// Why a `Set-Cookie` value was not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    Malformed(String),
    /// `Domain` ends with a dot.
    TrailingDotDomain(String),
}

/// One cookie as kept in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    /// Lowercased `Domain` without leading dots; empty for origin-scoped cookies.
    pub domain: String,
    /// `Path` attribute, unquoted; empty when absent.
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    /// Seconds; negative values arrive as zero.
    pub max_age: Option<i64>,
}

impl CookieRecord {
    /// Parse one `Set-Cookie` value.
    ///
    /// An `Expires` that does not parse leaves a session cookie.
    pub fn parse(raw: &str) -> Result<Self, Rejected> {
        let cookie = cookie::Cookie::parse(raw).map_err(|e| Rejected::Malformed(e.to_string()))?;

        let domain = cookie.domain().map(unquote).unwrap_or_default();
        if domain.ends_with('.') {
            return Err(Rejected::TrailingDotDomain(domain.to_string()));
        }

        let expires = cookie
            .expires_datetime()
            .and_then(|at| DateTime::<Utc>::from_timestamp(at.unix_timestamp(), 0));

        Ok(Self {
            name: cookie.name().to_string(),
            value: unquote(cookie.value()).to_string(),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            path: cookie.path().map(unquote).unwrap_or_default().to_string(),
            expires,
            max_age: cookie.max_age().map(|age| age.whole_seconds()),
        })
    }

    pub fn is_domain_scoped(&self) -> bool {
        !self.domain.is_empty()
    }

    /// Store lifetime: `Max-Age` wins over `Expires`; `None` for session cookies.
    ///
    /// Lifetimes are capped at `MAX_TTL_SECS`.
    pub fn ttl(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        match (self.max_age, self.expires) {
            (Some(secs), _) => Some(ttl_from_secs(secs)),
            (None, Some(at)) => Some(clamp_ttl(at - now)),
            (None, None) => None,
        }
    }

    /// Whether this cookie applies to `request_path`.
    ///
    /// Matches when the cookie path is empty or `/`, equals the request path,
    /// ends with `/` and prefixes it, or prefixes it at a segment boundary.
    pub fn path_matches(&self, request_path: &str) -> bool {
        let path = self.path.as_str();
        if path.is_empty() || path == "/" {
            return true;
        }

        let request_path =
            if request_path.starts_with('/') { request_path.to_string() } else { format!("/{request_path}") };

        request_path == path
            || (path.ends_with('/') && request_path.starts_with(path))
            || (request_path.starts_with(path) && request_path.as_bytes().get(path.len()) == Some(&b'/'))
    }
}

/// Split a header value that may fold several cookies together with commas.
///
/// A comma separates cookies only when a new `name=` pair follows it and it
/// does not sit inside an `Expires` date.
pub fn split_set_cookie(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, _) in raw.match_indices(',') {
        let current = &raw[start..i];
        let rest = &raw[i + 1..];
        if NEW_PAIR.is_match(rest) && !OPEN_EXPIRES.is_match(current) {
            parts.push(current);
            start = i + 1;
        }
    }
    parts.push(&raw[start..]);
    parts
        .into_iter()
        .map(|part| part.trim_matches(|c: char| c == ',' || c.is_whitespace()))
        .filter(|part| !part.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
