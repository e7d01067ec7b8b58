//! The network collaborator.
//!
//! The engines never open connections. They shape a [`TransportRequest`] on
//! the way in and read a [`TransportResponse`] on the way out, including the
//! history of intermediate responses when the transport followed redirects
//! itself.
//!
//! [`HttpTransport`] is the reqwest-backed implementation.

pub mod http;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use std::collections::BTreeMap;

use larder_core::Error;

pub use self::http::{HttpConfig, HttpTransport};
pub use self::url::{UrlError, canonicalize};

/// A request as handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// May carry a fragment; transports drop it on the wire.
    pub url: Url,
    pub headers: HeaderMap,
    /// Cookies to send, already filtered for this URL.
    pub cookies: BTreeMap<String, String>,
    pub allow_redirects: bool,
}

impl TransportRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), cookies: BTreeMap::new(), allow_redirects: true }
    }

    /// `Cookie` header value for the attached cookies, if any.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self.cookies.iter().map(|(name, value)| format!("{name}={value}")).collect();
        Some(pairs.join("; "))
    }
}

/// One intermediate response from a redirect chain the transport followed.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The URL that produced this response.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// The final response of an exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The URL that produced the final response.
    pub url: Url,
    /// Intermediate responses, oldest first.
    pub history: Vec<HistoryEntry>,
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error>;
}
