//! reqwest-backed transport.
//!
//! Redirects are followed here rather than by reqwest so every intermediate
//! response lands in [`TransportResponse::history`], which the redirect
//! resolver and cookie jar both read.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, StatusCode, Url};
use std::time::{Duration, Instant};

use larder_core::{AppConfig, Error};

use super::{HistoryEntry, Transport, TransportRequest, TransportResponse};

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent string (default: "larder/0.1")
    pub user_agent: String,

    /// Request timeout, applied per hop (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 10)
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { user_agent: "larder/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 10 }
    }
}

impl From<&AppConfig> for HttpConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), max_redirects: config.max_redirects }
    }
}

/// HTTP transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    config: HttpConfig,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: HttpConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let start = Instant::now();
        let cookie_header = request.cookie_header();
        let origin_host = request.url.host_str().map(str::to_owned);

        let mut method = request.method.clone();
        let mut url = request.url.clone();
        let mut history = Vec::new();

        loop {
            let mut builder = self.http.request(method.clone(), wire_url(&url)).headers(request.headers.clone());
            // Cookies were selected for the first URL only.
            if let Some(cookie) = &cookie_header
                && url.host_str() == origin_host.as_deref()
            {
                builder = builder.header(header::COOKIE, cookie);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Transport(format!("timed out: {}", url))
                } else {
                    Error::Transport(format!("network error: {}", e))
                }
            })?;

            let status = response.status();
            let headers = response.headers().clone();

            if request.allow_redirects
                && let Some(next) = redirect_target(status, &headers, &url)
            {
                if history.len() >= self.config.max_redirects {
                    return Err(Error::TooManyRedirects(self.config.max_redirects));
                }
                tracing::debug!(from = %url, to = %next, status = status.as_u16(), "following redirect");
                if status == StatusCode::SEE_OTHER && method != Method::HEAD {
                    method = Method::GET;
                }
                history.push(HistoryEntry { url: url.clone(), status, headers });
                url = next;
                continue;
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;

            tracing::debug!(
                url = %url,
                status = status.as_u16(),
                bytes = body.len(),
                hops = history.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "exchange complete"
            );

            return Ok(TransportResponse { status, headers, body, url, history });
        }
    }
}

/// The URL as sent on the wire: fragments never leave the client.
fn wire_url(url: &Url) -> Url {
    let mut wire = url.clone();
    wire.set_fragment(None);
    wire
}

/// Where a redirect response points, resolved against the URL that produced it.
///
/// Only 301, 302, 303, 307 and 308 are followed; 304 and 300 are final.
fn redirect_target(status: StatusCode, headers: &HeaderMap, base: &Url) -> Option<Url> {
    match status {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => {}
        _ => return None,
    }
    let location = headers.get(header::LOCATION)?.to_str().ok()?;
    base.join(location).ok()
}
