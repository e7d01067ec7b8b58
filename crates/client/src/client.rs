//! The request pipeline.
//!
//! [`Larder`] runs one fixed sequence per call: resolve learned redirects,
//! attach cookies, answer from cache or add validators, exchange with the
//! transport, reconcile a 304, then learn redirects, ingest cookies and
//! store the response. Batches run that sequence once per URL on spawned
//! tasks under a shared deadline.

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, oneshot};

use larder_core::{AppConfig, Clock, Error, MemoryStore, SystemClock, TtlStore};

use crate::cache::{CacheEngine, CachePolicy};
use crate::cookie::CookieJar;
use crate::redirect::RedirectResolver;
use crate::transport::{
    HistoryEntry, HttpConfig, HttpTransport, Transport, TransportRequest, TransportResponse, canonicalize,
};

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Sent as given, except that stored validators are added when absent.
    pub headers: HeaderMap,
    /// Whether the transport should follow redirects (default: true).
    pub allow_redirects: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { headers: HeaderMap::new(), allow_redirects: true }
    }
}

impl RequestOptions {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }
}

/// Where a [`Response`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// A full exchange with the origin.
    Network,
    /// A fresh cache entry; the origin was not contacted.
    Cache,
    /// A 304 whose body came from the long-term entry.
    Revalidated,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
    pub history: Vec<HistoryEntry>,
    pub source: ResponseSource,
}

impl Response {
    fn new(response: TransportResponse, source: ResponseSource) -> Self {
        let TransportResponse { status, headers, body, url, history } = response;
        Self { status, headers, body, url, history, source }
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    cache: CacheEngine,
    cookies: CookieJar,
    redirects: RedirectResolver,
    limiter: Arc<Semaphore>,
    batch_wait: Duration,
}

/// Caching HTTP client.
///
/// Cheap to clone; clones share the transport, the store and the batch
/// concurrency limit.
#[derive(Clone)]
pub struct Larder {
    inner: Arc<Inner>,
}

impl fmt::Debug for Larder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Larder")
            .field("cache", &self.inner.cache)
            .field("batch_wait", &self.inner.batch_wait)
            .finish_non_exhaustive()
    }
}

impl Larder {
    pub fn builder() -> LarderBuilder {
        LarderBuilder::default()
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, Error> {
        self.execute(Method::GET, url, options).await
    }

    pub async fn head(&self, url: &str, options: RequestOptions) -> Result<Response, Error> {
        self.execute(Method::HEAD, url, options).await
    }

    /// Run one request through the pipeline.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] for URLs that are not http(s)
    /// - [`Error::RedirectLoop`] when learned 301s form a cycle
    /// - transport and store errors, unchanged
    pub async fn execute(&self, method: Method, url: &str, options: RequestOptions) -> Result<Response, Error> {
        let inner = &self.inner;
        let url = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let url = inner.redirects.resolve(&url).await?;
        let cookies = inner.cookies.cookies_for(&url).await?;

        let mut request = TransportRequest {
            method,
            url,
            headers: options.headers,
            cookies,
            allow_redirects: options.allow_redirects,
        };

        if let Some(hit) = inner.cache.lookup(&request).await? {
            return Ok(Response::new(hit.into_response(&request.url), ResponseSource::Cache));
        }

        inner.cache.patch_conditional_headers(&mut request).await?;
        let mut response = inner.transport.send(request.clone()).await?;
        let mut source = ResponseSource::Network;

        if response.status == StatusCode::NOT_MODIFIED {
            match inner.cache.reconcile_304(&request, response).await {
                Ok(merged) => {
                    response = merged;
                    source = ResponseSource::Revalidated;
                }
                Err(Error::RevalidationUnavailable(url)) => {
                    tracing::warn!(url = %url, "304 without a long-term entry, reissuing without validators");
                    request.headers.remove(header::IF_MODIFIED_SINCE);
                    request.headers.remove(header::IF_NONE_MATCH);
                    response = inner.transport.send(request.clone()).await?;
                }
                Err(e) => return Err(e),
            }
        }

        inner.redirects.learn(&response).await?;
        inner.cookies.ingest_response(&response).await?;
        inner.cache.maybe_store(&request, &response).await?;

        Ok(Response::new(response, source))
    }

    /// GET every URL concurrently, waiting at most the configured batch wait.
    pub async fn get_batch(&self, requests: Vec<(String, RequestOptions)>) -> Vec<Result<Response, Error>> {
        self.get_batch_within(requests, self.inner.batch_wait).await
    }

    /// GET every URL concurrently, waiting at most `wait` for all of them.
    ///
    /// Results come back in request order. A slot still empty at the
    /// deadline holds [`Error::Timeout`]; its task is left running and its
    /// result, once it arrives, is still cached and learned from.
    pub async fn get_batch_within(
        &self, requests: Vec<(String, RequestOptions)>, wait: Duration,
    ) -> Vec<Result<Response, Error>> {
        let deadline = tokio::time::Instant::now() + wait;

        let mut slots = Vec::with_capacity(requests.len());
        for (url, options) in requests {
            let (tx, rx) = oneshot::channel();
            let larder = self.clone();
            let limiter = self.inner.limiter.clone();
            let task_url = url.clone();

            tokio::spawn(async move {
                let result = match limiter.acquire_owned().await {
                    Ok(permit) => {
                        let _permit = permit;
                        larder.get(&task_url, options).await
                    }
                    Err(_) => Err(Error::Transport("batch limiter closed".into())),
                };
                // The receiver is gone once the deadline has passed.
                let _ = tx.send(result);
            });
            slots.push((url, rx));
        }

        let mut results = Vec::with_capacity(slots.len());
        for (url, rx) in slots {
            let result = match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(Error::Transport(format!("batch task for {} ended without a result", url))),
                Err(_) => {
                    tracing::warn!(url = %url, wait_ms = wait.as_millis() as u64, "batch slot not filled in time");
                    Err(Error::Timeout(url))
                }
            };
            results.push(result);
        }
        results
    }
}

/// Builder for [`Larder`].
///
/// Without a transport, an [`HttpTransport`] is built from the HTTP
/// configuration. Without a store, the client gets its own [`MemoryStore`].
pub struct LarderBuilder {
    transport: Option<Arc<dyn Transport>>,
    http: HttpConfig,
    store: Option<Arc<dyn TtlStore>>,
    clock: Arc<dyn Clock>,
    namespace: String,
    policy: CachePolicy,
    max_concurrency: usize,
    batch_wait: Duration,
}

impl Default for LarderBuilder {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl LarderBuilder {
    /// Start from loaded configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            transport: None,
            http: HttpConfig::from(config),
            store: None,
            clock: Arc::new(SystemClock),
            namespace: config.namespace.clone(),
            policy: CachePolicy::from(config),
            max_concurrency: config.max_concurrency,
            batch_wait: config.batch_wait(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn TtlStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Clock for cookie expiry. Give the store the same clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn batch_wait(mut self, wait: Duration) -> Self {
        self.batch_wait = wait;
        self
    }

    pub fn build(self) -> Result<Larder, Error> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.http)?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::with_clock(self.clock.clone())));

        let inner = Inner {
            transport,
            cache: CacheEngine::new(store.clone(), self.namespace.clone(), self.policy),
            cookies: CookieJar::new(store.clone(), self.namespace.clone(), self.clock),
            redirects: RedirectResolver::new(store, self.namespace),
            limiter: Arc::new(Semaphore::new(self.max_concurrency)),
            batch_wait: self.batch_wait,
        };
        Ok(Larder { inner: Arc::new(inner) })
    }
}
