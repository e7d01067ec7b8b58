//! Scripted transport for tests.
//!
//! Every wire exchange is recorded, including the hops of redirects the mock
//! follows on the caller's behalf, so tests can count what would have hit
//! the network.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use std::sync::Mutex;
use std::time::Duration;

use larder_core::Error;

use crate::transport::{HistoryEntry, Transport, TransportRequest, TransportResponse};

const MAX_MOCK_HOPS: usize = 20;

type Handler = dyn Fn(&TransportRequest, usize) -> Result<TransportResponse, Error> + Send + Sync;

/// A canned response; the URL is filled from the request it answers.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    pub fn status(code: u16) -> Self {
        Self { status: StatusCode::from_u16(code).unwrap(), headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn ok(body: &'static str) -> Self {
        Self::status(200).body(body)
    }

    pub fn redirect(code: u16, location: &str) -> Self {
        Self::status(code).header("location", location)
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.append(name, HeaderValue::from_str(value).unwrap());
        self
    }

    pub fn body(mut self, body: &'static str) -> Self {
        self.body = Bytes::from_static(body.as_bytes());
        self
    }

    pub fn to(&self, request: &TransportRequest) -> TransportResponse {
        TransportResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            url: request.url.clone(),
            history: Vec::new(),
        }
    }
}

pub struct MockTransport {
    handler: Box<Handler>,
    delay: Option<Duration>,
    slow: Vec<(&'static str, Duration)>,
    calls: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&TransportRequest, usize) -> Result<TransportResponse, Error> + Send + Sync + 'static) -> Self {
        Self { handler: Box::new(handler), delay: None, slow: Vec::new(), calls: Mutex::new(Vec::new()) }
    }

    /// Answer every exchange with the same reply.
    pub fn always(reply: Reply) -> Self {
        Self::new(move |request, _| Ok(reply.to(request)))
    }

    /// Answer the n-th exchange with the n-th reply, repeating the last one.
    pub fn sequence(replies: Vec<Reply>) -> Self {
        Self::new(move |request, index| {
            let reply = &replies[index.min(replies.len() - 1)];
            Ok(reply.to(request))
        })
    }

    /// Answer by exact URL; anything else gets a 404.
    pub fn routes(routes: Vec<(&'static str, Reply)>) -> Self {
        Self::new(move |request, _| {
            let reply = routes
                .iter()
                .find(|(url, _)| *url == request.url.as_str())
                .map_or_else(|| Reply::status(404), |(_, reply)| reply.clone());
            Ok(reply.to(request))
        })
    }

    /// Sleep before answering each exchange.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before answering exchanges for one URL.
    pub fn with_delay_on(mut self, url: &'static str, delay: Duration) -> Self {
        self.slow.push((url, delay));
        self
    }

    fn delay_for(&self, url: &Url) -> Option<Duration> {
        self.slow
            .iter()
            .find(|(slow, _)| *slow == url.as_str())
            .map(|(_, delay)| *delay)
            .or(self.delay)
    }

    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> TransportRequest {
        self.calls.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let mut current = request;
        let mut history = Vec::new();

        loop {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(current.clone());
                calls.len() - 1
            };
            if let Some(delay) = self.delay_for(&current.url) {
                tokio::time::sleep(delay).await;
            }

            let mut response = (self.handler)(&current, index)?;
            let next = response
                .headers
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| current.url.join(v).ok());

            if current.allow_redirects
                && response.status.is_redirection()
                && response.status != StatusCode::NOT_MODIFIED
                && let Some(next) = next
            {
                if history.len() >= MAX_MOCK_HOPS {
                    return Err(Error::TooManyRedirects(MAX_MOCK_HOPS));
                }
                history.push(HistoryEntry { url: current.url.clone(), status: response.status, headers: response.headers });
                current.url = next;
                continue;
            }

            response.history = history;
            return Ok(response);
        }
    }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}
