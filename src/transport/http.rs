//! Reqwest-backed transport talking to the game database JSON API.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{Method, Transport, TransportError, TransportRequest, TransportResult};

/// Runtime configuration describing how to reach the API.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL every relative endpoint is joined to.
    pub base_url: String,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl HttpConfig {
    /// Configuration for `base_url` without credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
        }
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

impl From<Method> for reqwest::Method {
    fn from(value: Method) -> Self {
        match value {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// [`Transport`] performing real HTTP calls.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl HttpTransport {
    /// Build the HTTP client for `config`.
    pub fn new(config: HttpConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| TransportError::with_source("failed to build HTTP client", source))?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    async fn perform(&self, request: TransportRequest) -> TransportResult<Value> {
        let url = self.url(&request.endpoint);
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self.client.request(request.method.into(), &url);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
        }
        if let Some(data) = &request.data {
            builder = match request.method {
                Method::Get => builder.query(&query_pairs(data)),
                _ => builder.json(data),
            };
        }

        let response = builder
            .send()
            .await
            .map_err(|source| {
                TransportError::with_source(format!("failed to reach `{url}`"), source)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<Value>().await.ok();
            return Err(error_from_body(status, body));
        }

        if !request.parse || status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response.json::<Value>().await.map_err(|source| {
            TransportError::with_source(format!("failed to decode response from `{url}`"), source)
        })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: TransportRequest) -> BoxFuture<'static, TransportResult<Value>> {
        let transport = self.clone();
        Box::pin(async move { transport.perform(request).await })
    }
}

fn query_pairs(data: &Value) -> Vec<(String, String)> {
    let Value::Object(fields) = data else {
        return Vec::new();
    };

    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
        .collect()
}

/// Build an error from a non-success response, preferring the API's own wording.
fn error_from_body(status: StatusCode, body: Option<Value>) -> TransportError {
    let fallback = format!("request failed with status {status}");
    let Some(Value::Object(mut fields)) = body else {
        return TransportError::new(fallback);
    };

    let message = ["detail", "message"]
        .iter()
        .find_map(|name| match fields.get(*name) {
            Some(Value::String(text)) => Some(text.clone()),
            _ => None,
        });

    match (message, fields.remove("errors")) {
        (Some(message), Some(Value::Object(errors))) => {
            TransportError::new(message).with_errors(errors)
        }
        (Some(message), _) => TransportError::new(message),
        (None, Some(Value::Object(errors))) => TransportError::new(fallback).with_errors(errors),
        (None, _) if fields.is_empty() => TransportError::new(fallback),
        (None, _) => TransportError::new(fallback).with_errors(fields),
    }
}
