use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client,
};

use crate::{
    data_objects::{GatewayHttpResponse, OutboundRequest},
    GatewayApiError,
};

/// A thin wrapper around a shared `reqwest` client that sends [`OutboundRequest`]s with a bounded timeout.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Arc<Client>,
    timeout: Duration,
}

impl GatewayHttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self, GatewayApiError> {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { client: Arc::new(client), timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends the request. Any HTTP status is returned as a [`GatewayHttpResponse`]; interpreting it is up to the
    /// adapter. Only connection problems and timeouts are errors here.
    pub async fn send(&self, request: &OutboundRequest) -> Result<GatewayHttpResponse, GatewayApiError> {
        trace!("💳️ Sending {request}");
        let mut headers = HeaderMap::with_capacity(request.headers.len() + 1);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(request.encoding.content_type()));
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| GatewayApiError::Initialization(format!("Invalid header name {key}. {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| GatewayApiError::Initialization(format!("Invalid value for header {key}. {e}")))?;
            headers.insert(name, value);
        }
        let response = self
            .client
            .post(request.url.as_str())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        debug!("💳️ Gateway at {} answered with status {status}", request.url);
        Ok(GatewayHttpResponse { status, body })
    }

    fn map_send_error(&self, e: reqwest::Error) -> GatewayApiError {
        if e.is_timeout() {
            warn!("💳️ Gateway request timed out after {}s", self.timeout.as_secs());
            GatewayApiError::Timeout(self.timeout.as_secs())
        } else {
            warn!("💳️ Gateway request failed. {e}");
            GatewayApiError::Transport(e.to_string())
        }
    }
}
