//! Permanent redirect memoization.
//!
//! Each 301 seen in a transport's history becomes one stored link from the
//! hop's URL to its `Location`. Links are kept hop by hop, never collapsed,
//! so a chain gets shorter one learned hop at a time. Other redirect
//! statuses are not remembered.

use reqwest::header;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use larder_core::keys::literal_key;
use larder_core::{Error, TtlStore, read_json, write_json};

use crate::transport::TransportResponse;

/// Upper bound on links followed by one [`RedirectResolver::resolve`] call.
pub const MAX_REDIRECT_HOPS: usize = 64;

/// A learned 301.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectLink {
    pub location: String,
}

/// Rewrites request URLs through learned permanent redirects.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    store: Arc<dyn TtlStore>,
    namespace: String,
}

impl RedirectResolver {
    pub fn new(store: Arc<dyn TtlStore>, namespace: impl Into<String>) -> Self {
        Self { store, namespace: namespace.into() }
    }

    /// Follow stored links from `url` until none is left.
    ///
    /// # Errors
    ///
    /// [`Error::RedirectLoop`] if the walk revisits a URL or passes
    /// [`MAX_REDIRECT_HOPS`].
    pub async fn resolve(&self, url: &Url) -> Result<Url, Error> {
        let mut current = url.clone();
        let mut seen = HashSet::new();

        loop {
            if !seen.insert(current.to_string()) || seen.len() > MAX_REDIRECT_HOPS {
                return Err(Error::RedirectLoop(current.to_string()));
            }
            let Some(link) = read_json::<RedirectLink>(self.store.as_ref(), &self.key(&current)).await? else {
                break;
            };
            let next = Url::parse(&link.location).map_err(|e| Error::InvalidUrl(format!("{}: {}", link.location, e)))?;
            tracing::debug!(from = %current, to = %next, "following learned redirect");
            current = next;
        }

        Ok(current)
    }

    /// Store a link for every 301 in the response's history.
    ///
    /// A 301 without a usable `Location` is skipped. Returns how many links
    /// were written.
    pub async fn learn(&self, response: &TransportResponse) -> Result<usize, Error> {
        let mut learned = 0;
        for hop in &response.history {
            if hop.status != StatusCode::MOVED_PERMANENTLY {
                continue;
            }
            let Some(location) = hop
                .headers
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| hop.url.join(v).ok())
            else {
                tracing::debug!(url = %hop.url, "301 without usable Location");
                continue;
            };

            let link = RedirectLink { location: location.to_string() };
            write_json(self.store.as_ref(), &self.key(&hop.url), &link, None).await?;
            tracing::debug!(from = %hop.url, to = %location, "learned permanent redirect");
            learned += 1;
        }
        Ok(learned)
    }

    fn key(&self, url: &Url) -> String {
        literal_key(&self.namespace, "redirect", url.as_str())
    }
}
