//! HTTP freshness and revalidation cache.
//!
//! Every stored response is written to two tiers:
//!
//! - **fresh**: lives for the response's freshness window and answers
//!   [`CacheEngine::lookup`] without contacting the origin
//! - **long-term**: lives for a fixed horizon (30 days by default) and
//!   supplies validators for conditional requests and the body for 304s
//!
//! Each tier keeps a vary registry per (url, method): the ordered header
//! names from the response's `Vary`. The payload key is a digest of url,
//! method and the request's values for exactly those headers, so requests
//! that differ only in unlisted headers share an entry.

pub mod directives;
pub mod entry;

use chrono::TimeDelta;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use std::sync::Arc;

use larder_core::keys::hashed_key;
use larder_core::{AppConfig, Error, NoCacheMode, TtlStore, read_json, ttl_from_secs, write_json};

use crate::transport::{TransportRequest, TransportResponse};

pub use directives::{CacheControl, Directive, parse_vary, signals_no_cache};
pub use entry::CachedResponse;

/// Storage rules that do not come from the response itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Freshness for responses with Cache-Control but no max-age.
    /// `None` writes only the long-term copy for those.
    pub default_timeout: Option<TimeDelta>,
    /// Lifetime of the long-term copy.
    pub long_term: TimeDelta,
    pub no_cache_mode: NoCacheMode,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { default_timeout: None, long_term: TimeDelta::days(30), no_cache_mode: NoCacheMode::Token }
    }
}

impl From<&AppConfig> for CachePolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_timeout: config.default_cache_timeout(),
            long_term: config.long_term(),
            no_cache_mode: config.no_cache_mode,
        }
    }
}

/// What [`CacheEngine::maybe_store`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDecision {
    /// Nothing was written.
    NotCacheable(&'static str),
    /// Only the long-term copy was written.
    LongTermOnly,
    /// Both tiers were written; the fresh copy lives this long.
    Fresh(TimeDelta),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Fresh,
    LongTerm,
}

impl Tier {
    fn vary_tag(self) -> &'static str {
        match self {
            Tier::Fresh => "vary",
            Tier::LongTerm => "longterm-vary",
        }
    }

    fn page_tag(self) -> &'static str {
        match self {
            Tier::Fresh => "page",
            Tier::LongTerm => "longterm-page",
        }
    }
}

/// Reads and writes cached responses through a [`TtlStore`].
#[derive(Debug, Clone)]
pub struct CacheEngine {
    store: Arc<dyn TtlStore>,
    namespace: String,
    policy: CachePolicy,
}

impl CacheEngine {
    pub fn new(store: Arc<dyn TtlStore>, namespace: impl Into<String>, policy: CachePolicy) -> Self {
        Self { store, namespace: namespace.into(), policy }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Find a fresh response for a GET or HEAD request.
    ///
    /// Without a GET vary registry for the URL nothing is known about it and
    /// the lookup misses. Otherwise the GET entry is tried first, and a HEAD
    /// request then falls back to an entry stored for HEAD. The hit is
    /// returned as stored.
    pub async fn lookup(&self, request: &TransportRequest) -> Result<Option<CachedResponse>, Error> {
        if request.method != Method::GET && request.method != Method::HEAD {
            return Ok(None);
        }

        let Some(vary) = self.read_vary(Tier::Fresh, &request.url, &Method::GET).await? else {
            tracing::debug!(url = %request.url, "cache miss, no vary registry");
            return Ok(None);
        };

        let mut hit = self.read_page(Tier::Fresh, &request.url, &Method::GET, &vary, &request.headers).await?;
        if hit.is_none() && request.method == Method::HEAD {
            hit = self.read_tier(Tier::Fresh, &request.url, &Method::HEAD, &request.headers).await?;
        }

        match &hit {
            Some(cached) => tracing::debug!(url = %request.url, status = cached.status, "cache hit"),
            None => tracing::debug!(url = %request.url, "cache miss"),
        }
        Ok(hit)
    }

    /// Add `If-Modified-Since` / `If-None-Match` from the long-term entry.
    ///
    /// A validator the caller already set is never replaced.
    pub async fn patch_conditional_headers(&self, request: &mut TransportRequest) -> Result<(), Error> {
        let wants_since = !request.headers.contains_key(header::IF_MODIFIED_SINCE);
        let wants_match = !request.headers.contains_key(header::IF_NONE_MATCH);
        if !wants_since && !wants_match {
            return Ok(());
        }

        let Some(previous) = self.read_tier(Tier::LongTerm, &request.url, &Method::GET, &request.headers).await? else {
            return Ok(());
        };

        if wants_since
            && let Some(value) = previous.header("last-modified").and_then(|v| HeaderValue::from_str(v).ok())
        {
            request.headers.insert(header::IF_MODIFIED_SINCE, value);
        }
        if wants_match
            && let Some(value) = previous.header("etag").and_then(|v| HeaderValue::from_str(v).ok())
        {
            request.headers.insert(header::IF_NONE_MATCH, value);
        }
        Ok(())
    }

    /// Fill a 304's body from the long-term entry.
    ///
    /// The 304's status and headers are kept.
    ///
    /// # Errors
    ///
    /// [`Error::RevalidationUnavailable`] when no long-term entry exists; the
    /// request has to be reissued without validators.
    pub async fn reconcile_304(
        &self, request: &TransportRequest, response: TransportResponse,
    ) -> Result<TransportResponse, Error> {
        let Some(previous) = self.read_tier(Tier::LongTerm, &request.url, &Method::GET, &request.headers).await? else {
            return Err(Error::RevalidationUnavailable(request.url.to_string()));
        };
        tracing::debug!(url = %request.url, "revalidated from long-term entry");
        Ok(TransportResponse { body: previous.body.into(), ..response })
    }

    /// Store a response if its headers and status allow it.
    ///
    /// Entries are keyed by the request URL, and by the final response URL
    /// as well when redirects moved it.
    pub async fn maybe_store(
        &self, request: &TransportRequest, response: &TransportResponse,
    ) -> Result<StoreDecision, Error> {
        let decision = self.decide(request, response);

        let fresh_ttl = match decision {
            StoreDecision::NotCacheable(reason) => {
                tracing::debug!(url = %request.url, status = response.status.as_u16(), reason, "not storing response");
                return Ok(decision);
            }
            StoreDecision::LongTermOnly => None,
            StoreDecision::Fresh(ttl) => Some(ttl),
        };
        let long_term_ttl = fresh_ttl.map_or(self.policy.long_term, |ttl| ttl.max(self.policy.long_term));

        let vary = parse_vary(&response.headers);
        let cached = CachedResponse::from_response(response);

        let mut urls = vec![&request.url];
        if response.url != request.url {
            urls.push(&response.url);
        }
        for url in urls {
            if let Some(ttl) = fresh_ttl {
                self.write_tier(Tier::Fresh, url, &request.method, &vary, &request.headers, &cached, ttl)
                    .await?;
            }
            self.write_tier(Tier::LongTerm, url, &request.method, &vary, &request.headers, &cached, long_term_ttl)
                .await?;
        }

        tracing::debug!(url = %request.url, ?decision, "stored response");
        Ok(decision)
    }

    fn decide(&self, request: &TransportRequest, response: &TransportResponse) -> StoreDecision {
        if request.method != Method::GET && request.method != Method::HEAD {
            return StoreDecision::NotCacheable("method");
        }

        let Some(raw) = directives::raw_cache_control(&response.headers) else {
            return StoreDecision::NotCacheable("no cache-control");
        };
        if signals_no_cache(&raw, self.policy.no_cache_mode) {
            return StoreDecision::NotCacheable("no-cache");
        }

        let status = response.status;
        if !(status.is_success() || status.is_client_error()) {
            return StoreDecision::NotCacheable("status");
        }

        if parse_vary(&response.headers).iter().any(|name| name == "*") {
            return StoreDecision::NotCacheable("vary *");
        }

        match CacheControl::parse(&raw).max_age() {
            Some(secs) if secs <= 0 => StoreDecision::NotCacheable("max-age=0"),
            Some(secs) => StoreDecision::Fresh(ttl_from_secs(secs)),
            None => match self.policy.default_timeout {
                Some(ttl) => StoreDecision::Fresh(ttl),
                None => StoreDecision::LongTermOnly,
            },
        }
    }

    fn vary_key(&self, tier: Tier, url: &Url, method: &Method) -> String {
        hashed_key(&self.namespace, tier.vary_tag(), &[url.as_str(), method.as_str()])
    }

    fn page_key(&self, tier: Tier, url: &Url, method: &Method, vary: &[String], headers: &HeaderMap) -> String {
        let mut parts = vec![url.as_str().to_string(), method.as_str().to_string()];
        parts.extend(vary.iter().map(|name| header_value(headers, name)));
        hashed_key(&self.namespace, tier.page_tag(), &parts)
    }

    async fn read_vary(&self, tier: Tier, url: &Url, method: &Method) -> Result<Option<Vec<String>>, Error> {
        read_json(self.store.as_ref(), &self.vary_key(tier, url, method)).await
    }

    async fn read_page(
        &self, tier: Tier, url: &Url, method: &Method, vary: &[String], headers: &HeaderMap,
    ) -> Result<Option<CachedResponse>, Error> {
        read_json(self.store.as_ref(), &self.page_key(tier, url, method, vary, headers)).await
    }

    async fn read_tier(
        &self, tier: Tier, url: &Url, method: &Method, headers: &HeaderMap,
    ) -> Result<Option<CachedResponse>, Error> {
        match self.read_vary(tier, url, method).await? {
            Some(vary) => self.read_page(tier, url, method, &vary, headers).await,
            None => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_tier(
        &self, tier: Tier, url: &Url, method: &Method, vary: &[String], headers: &HeaderMap, cached: &CachedResponse,
        ttl: TimeDelta,
    ) -> Result<(), Error> {
        let store = self.store.as_ref();
        write_json(store, &self.vary_key(tier, url, method), vary, Some(ttl)).await?;
        write_json(store, &self.page_key(tier, url, method, vary, headers), cached, Some(ttl)).await
    }
}

/// A request header's values joined with `,`; empty when absent.
fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",")
}
