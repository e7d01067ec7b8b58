//! Client code for larder.
//!
//! This crate provides the caching HTTP pipeline: the freshness/revalidation
//! cache, the cookie jar, the permanent-redirect resolver, the transport
//! abstraction with its reqwest implementation, and the [`Larder`] client
//! that runs them in order.

pub mod cache;
pub mod client;
pub mod cookie;
pub mod redirect;
pub mod transport;

#[cfg(test)]
mod mock;

pub use cache::{CacheControl, CacheEngine, CachePolicy, CachedResponse, StoreDecision};
pub use client::{Larder, LarderBuilder, RequestOptions, Response, ResponseSource};
pub use cookie::{CookieJar, CookieRecord};
pub use redirect::{MAX_REDIRECT_HOPS, RedirectLink, RedirectResolver};
pub use transport::{
    HistoryEntry, HttpConfig, HttpTransport, Transport, TransportRequest, TransportResponse, UrlError, canonicalize,
};
