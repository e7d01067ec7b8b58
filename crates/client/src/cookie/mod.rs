//! Cookie jar backed by the TTL store.
//!
//! Each cookie is its own store record, expiring with the cookie. Records
//! are found through index sets: one per cookie domain, one per origin host
//! for cookies sent without `Domain`. Index sets have no TTL and are pruned
//! of dead keys whenever [`CookieJar::cookies_for`] reads them.
//!
//! There is no public-suffix list: a cookie for `co.uk` is shared by every
//! host under it.

pub mod record;

use reqwest::Url;
use reqwest::header::{self, HeaderMap};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use larder_core::keys::{hashed_key, literal_key};
use larder_core::{Clock, Error, TtlStore, read_json, write_json};

use crate::transport::TransportResponse;

pub use record::{CookieRecord, Rejected, split_set_cookie};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Domain,
    Origin,
}

impl Scope {
    fn record_tag(self) -> &'static str {
        match self {
            Scope::Domain => "cookie",
            Scope::Origin => "cookie-origin",
        }
    }

    fn index_tag(self) -> &'static str {
        match self {
            Scope::Domain => "cookie-index",
            Scope::Origin => "cookie-origin-index",
        }
    }
}

/// Stores cookies from responses and selects them for requests.
#[derive(Debug, Clone)]
pub struct CookieJar {
    store: Arc<dyn TtlStore>,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl CookieJar {
    pub fn new(store: Arc<dyn TtlStore>, namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { store, namespace: namespace.into(), clock }
    }

    /// Store every `Set-Cookie` in `headers`, as received from `url`.
    ///
    /// Rejected cookies are skipped; the rest of the header is still
    /// processed. Returns the number of cookies written (deletions included).
    pub async fn ingest(&self, url: &Url, headers: &HeaderMap) -> Result<usize, Error> {
        let Some(host) = url.host_str() else {
            return Ok(0);
        };
        let host = host.to_ascii_lowercase();

        let mut written = 0;
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                tracing::debug!(url = %url, "dropping non-text Set-Cookie header");
                continue;
            };
            for raw in split_set_cookie(value) {
                match CookieRecord::parse(raw) {
                    Ok(record) => {
                        self.put(&host, &record).await?;
                        written += 1;
                    }
                    Err(rejected) => tracing::debug!(url = %url, ?rejected, "dropping cookie"),
                }
            }
        }
        Ok(written)
    }

    /// Ingest cookies from every hop of an exchange, oldest first.
    pub async fn ingest_response(&self, response: &TransportResponse) -> Result<usize, Error> {
        let mut written = 0;
        for hop in &response.history {
            written += self.ingest(&hop.url, &hop.headers).await?;
        }
        written += self.ingest(&response.url, &response.headers).await?;
        Ok(written)
    }

    /// Cookies to send to `url`, by name.
    ///
    /// Origin cookies for the exact host come first, then domain cookies for
    /// each suffix of the host from broadest to narrowest, so the most
    /// specific domain wins a name clash.
    pub async fn cookies_for(&self, url: &Url) -> Result<BTreeMap<String, String>, Error> {
        let mut cookies = BTreeMap::new();
        let Some(host) = url.host_str() else {
            return Ok(cookies);
        };
        let host = host.to_ascii_lowercase();
        let path = url.path();

        self.collect(Scope::Origin, &host, path, &mut cookies).await?;

        let labels: Vec<&str> = host.split('.').collect();
        for start in (0..labels.len()).rev() {
            let suffix = labels[start..].join(".");
            self.collect(Scope::Domain, &suffix, path, &mut cookies).await?;
        }
        Ok(cookies)
    }

    async fn put(&self, host: &str, record: &CookieRecord) -> Result<(), Error> {
        let (scope, owner) = if record.is_domain_scoped() {
            (Scope::Domain, record.domain.clone())
        } else {
            (Scope::Origin, host.to_string())
        };

        let parts = [owner.as_str(), record.path.as_str(), record.name.as_str()];
        let key = hashed_key(&self.namespace, scope.record_tag(), &parts);
        let ttl = record.ttl(self.clock.now());
        write_json(self.store.as_ref(), &key, record, ttl).await?;

        if ttl.is_some_and(|ttl| ttl <= chrono::TimeDelta::zero()) {
            tracing::debug!(name = %record.name, owner = %owner, "cookie removed");
            return Ok(());
        }

        let index_key = self.index_key(scope, &owner);
        let mut index: BTreeSet<String> = read_json(self.store.as_ref(), &index_key).await?.unwrap_or_default();
        if index.insert(key) {
            write_json(self.store.as_ref(), &index_key, &index, None).await?;
        }
        Ok(())
    }

    async fn collect(
        &self, scope: Scope, owner: &str, path: &str, cookies: &mut BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let index_key = self.index_key(scope, owner);
        let Some(index) = read_json::<BTreeSet<String>>(self.store.as_ref(), &index_key).await? else {
            return Ok(());
        };

        let mut live = BTreeSet::new();
        for key in index.iter() {
            let Some(record) = read_json::<CookieRecord>(self.store.as_ref(), key).await? else {
                continue;
            };
            if record.path_matches(path) {
                cookies.insert(record.name, record.value);
            }
            live.insert(key.clone());
        }

        if live.len() != index.len() {
            tracing::debug!(owner, pruned = index.len() - live.len(), "pruned cookie index");
            write_json(self.store.as_ref(), &index_key, &live, None).await?;
        }
        Ok(())
    }

    fn index_key(&self, scope: Scope, owner: &str) -> String {
        literal_key(&self.namespace, scope.index_tag(), owner)
    }
}
