//! HTTP transport backed by reqwest.
//!
//! # Responsibilities
//! - Resolve an endpoint against the backend or AI base URL
//! - Attach bearer token and a fresh request id
//! - Enforce the per-call deadline
//! - Map HTTP statuses to `FetchError`

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::resilience::timeouts::with_timeout;
use crate::transport::{Dependency, Endpoint, FetchError, FetchResult, Method, Transport};

pub const X_REQUEST_ID: &str = "x-request-id";

/// JSON-over-HTTP transport for both upstream services.
pub struct HttpTransport {
    client: reqwest::Client,
    backend_url: Url,
    ai_url: Url,
    timeout: Duration,
    unwrap_envelope: bool,
    token: ArcSwapOption<String>,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            backend_url: Url::parse(&config.backend_url)?,
            ai_url: Url::parse(&config.ai_url)?,
            timeout: config.request_timeout(),
            unwrap_envelope: config.unwrap_envelope,
            token: ArcSwapOption::empty(),
        })
    }

    /// Install a new credential. In-flight calls keep the one they started with.
    pub fn set_token(&self, token: impl Into<String>) {
        self.token.store(Some(Arc::new(token.into())));
    }

    pub fn clear_token(&self) {
        self.token.store(None);
    }

    pub fn has_token(&self) -> bool {
        self.token.load().is_some()
    }

    fn url_for(&self, endpoint: &Endpoint) -> String {
        let base = match endpoint.dependency {
            Dependency::Backend => &self.backend_url,
            Dependency::Ai => &self.ai_url,
        };
        format!("{}{}", base.as_str().trim_end_matches('/'), endpoint.path)
    }

    async fn send(&self, endpoint: &Endpoint) -> FetchResult<Value> {
        let url = self.url_for(endpoint);
        let method = match endpoint.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };
        let request_id = Uuid::new_v4().to_string();

        let mut request = self
            .client
            .request(method, &url)
            .header(X_REQUEST_ID, &request_id);
        if !endpoint.query.is_empty() {
            request = request.query(&endpoint.query);
        }
        if let Some(token) = self.token.load_full() {
            request = request.bearer_auth(token.as_str());
        }
        if let Some(body) = &endpoint.body {
            request = request.json(body);
        }

        tracing::trace!(url = %url, request_id = %request_id, "Sending request");
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(status.as_u16()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::RateLimited { retry_after });
        }
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, request_id = %request_id, "Non-success status");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(if self.unwrap_envelope {
            unwrap_envelope(body)
        } else {
            body
        })
    }
}

impl Transport for HttpTransport {
    type Payload = Value;

    fn perform<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, FetchResult<Value>> {
        with_timeout(self.timeout, self.send(endpoint)).boxed()
    }
}

/// Most backend endpoints answer `{ "success": .., "data": .. }`; keep the data.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
