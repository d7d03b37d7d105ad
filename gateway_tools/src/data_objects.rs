use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyEncoding {
    Form,
    Json,
}

impl BodyEncoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            BodyEncoding::Form => "application/x-www-form-urlencoded",
            BodyEncoding::Json => "application/json",
        }
    }
}

/// A fully prepared provider call. Adapters build these without doing any I/O; [`crate::GatewayHttpClient`] sends
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub encoding: BodyEncoding,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl OutboundRequest {
    pub fn form<S: Into<String>>(url: S, body: String) -> Self {
        Self { url: url.into(), encoding: BodyEncoding::Form, headers: Vec::new(), body }
    }

    pub fn json<S: Into<String>>(url: S, body: String) -> Self {
        Self { url: url.into(), encoding: BodyEncoding::Json, headers: Vec::new(), body }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

impl Display for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "POST {} ({}, {} bytes)", self.url, self.encoding.content_type(), self.body.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayHttpResponse {
    pub status: u16,
    pub body: String,
}

impl GatewayHttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
