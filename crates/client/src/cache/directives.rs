//! Cache-Control and Vary header parsing.

use reqwest::header::{self, HeaderMap};
use std::num::IntErrorKind;

use larder_core::NoCacheMode;

/// One Cache-Control directive, e.g. `max-age=60` or `no-store`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Lowercased directive name.
    pub name: String,
    /// Argument with surrounding quotes removed.
    pub value: Option<String>,
}

/// Parsed Cache-Control header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: Vec<Directive>,
}

impl CacheControl {
    /// Parse a raw header value.
    ///
    /// Commas inside quoted arguments (`no-cache="set-cookie, x-id"`) do not
    /// split directives. Empty segments are skipped.
    pub fn parse(raw: &str) -> Self {
        let directives = split_unquoted(raw, ',')
            .into_iter()
            .filter_map(|segment| {
                let segment = segment.trim();
                if segment.is_empty() {
                    return None;
                }
                let (name, value) = match segment.split_once('=') {
                    Some((name, value)) => (name, Some(unquote(value.trim()).to_string())),
                    None => (segment, None),
                };
                Some(Directive { name: name.trim().to_ascii_lowercase(), value })
            })
            .collect();
        Self { directives }
    }

    pub fn get(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `max-age` in seconds. An unparsable argument counts as absent; digit
    /// strings too long for `i64` saturate.
    pub fn max_age(&self) -> Option<i64> {
        match self.get("max-age")?.value.as_deref()?.parse::<i64>() {
            Ok(secs) => Some(secs),
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => Some(i64::MAX),
            Err(e) if *e.kind() == IntErrorKind::NegOverflow => Some(i64::MIN),
            Err(_) => None,
        }
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }
}

/// All Cache-Control header values joined with `, `.
pub fn raw_cache_control(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() { None } else { Some(values.join(", ")) }
}

/// Whether a Cache-Control value forbids storing the response.
pub fn signals_no_cache(raw: &str, mode: NoCacheMode) -> bool {
    match mode {
        NoCacheMode::Token => CacheControl::parse(raw).has("no-cache"),
        NoCacheMode::Substring => raw.contains("no-cache"),
    }
}

/// Header names listed by Vary, lowercased, in order, without duplicates.
pub fn parse_vary(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for value in headers.get_all(header::VARY) {
        let Ok(value) = value.to_str() else { continue };
        for name in value.split(',') {
            let name = name.trim().to_ascii_lowercase();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn split_unquoted(raw: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            parts.push(&raw[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&raw[start..]);
    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_directives() {
        let cc = CacheControl::parse("Public, MAX-AGE=60, no-transform");
        assert!(cc.has("public"));
        assert!(cc.has("no-transform"));
        assert_eq!(cc.max_age(), Some(60));
        assert_eq!(cc.directives().len(), 3);
    }

    #[test]
    fn test_parse_quoted_argument_with_comma() {
        let cc = CacheControl::parse(r#"no-cache="set-cookie, x-id", max-age=5"#);
        let no_cache = cc.get("no-cache").unwrap();
        assert_eq!(no_cache.value.as_deref(), Some("set-cookie, x-id"));
        assert_eq!(cc.max_age(), Some(5));
    }

    #[test]
    fn test_max_age_edge_cases() {
        assert_eq!(CacheControl::parse("max-age=0").max_age(), Some(0));
        assert_eq!(CacheControl::parse("max-age=-3").max_age(), Some(-3));
        assert_eq!(CacheControl::parse("max-age=soon").max_age(), None);
        assert_eq!(CacheControl::parse("max-age").max_age(), None);
        assert_eq!(CacheControl::parse(r#"max-age="30""#).max_age(), Some(30));
        assert_eq!(CacheControl::parse("max-age=99999999999999999999").max_age(), Some(i64::MAX));
        assert_eq!(CacheControl::parse(",, public ,").directives().len(), 1);
    }

    #[test]
    fn test_no_cache_token_mode() {
        assert!(signals_no_cache("no-cache", NoCacheMode::Token));
        assert!(signals_no_cache(r#"No-Cache="set-cookie""#, NoCacheMode::Token));
        assert!(!signals_no_cache("private, max-age=60", NoCacheMode::Token));
        assert!(!signals_no_cache(r#"x-note="no-cache""#, NoCacheMode::Token));
    }

    #[test]
    fn test_no_cache_substring_mode() {
        assert!(signals_no_cache("no-cache", NoCacheMode::Substring));
        assert!(signals_no_cache(r#"x-note="no-cache""#, NoCacheMode::Substring));
        assert!(!signals_no_cache("max-age=60", NoCacheMode::Substring));
        assert!(!signals_no_cache("No-Cache", NoCacheMode::Substring));
        assert!(signals_no_cache("No-Cache", NoCacheMode::Token));
    }

    #[test]
    fn test_joined_header_values() {
        let mut headers = HeaderMap::new();
        assert!(raw_cache_control(&headers).is_none());

        headers.append(header::CACHE_CONTROL, HeaderValue::from_static("public"));
        headers.append(header::CACHE_CONTROL, HeaderValue::from_static("max-age=10"));
        assert_eq!(raw_cache_control(&headers).as_deref(), Some("public, max-age=10"));
        assert_eq!(CacheControl::parse(&raw_cache_control(&headers).unwrap()).max_age(), Some(10));
    }

    #[test]
    fn test_parse_vary() {
        let mut headers = HeaderMap::new();
        assert!(parse_vary(&headers).is_empty());

        headers.append(header::VARY, HeaderValue::from_static("Accept, Accept-Language"));
        headers.append(header::VARY, HeaderValue::from_static("accept,  ,Cookie"));
        assert_eq!(parse_vary(&headers), vec!["accept", "accept-language", "cookie"]);
    }
}
