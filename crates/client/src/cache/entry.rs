//! The stored form of a response.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::transport::TransportResponse;

/// A response as written to the store.
///
/// Header order and repeated headers are preserved. The body is kept as
/// base64 so records stay valid JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    /// The URL the response was fetched from.
    pub url: String,
}

impl CachedResponse {
    pub fn from_response(response: &TransportResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        Self {
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            url: response.url.to_string(),
        }
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK)
    }

    /// Rebuild a header map; entries that are no longer valid are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                map.append(name, value);
            }
        }
        map
    }

    /// Turn the record back into a transport response with no history.
    ///
    /// `fallback_url` is used when the stored URL does not parse.
    pub fn into_response(self, fallback_url: &Url) -> TransportResponse {
        let url = Url::parse(&self.url).unwrap_or_else(|_| fallback_url.clone());
        TransportResponse {
            status: self.status_code(),
            headers: self.header_map(),
            body: Bytes::from(self.body),
            url,
            history: Vec::new(),
        }
    }
}

mod body_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
