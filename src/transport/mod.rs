//! Transport collaborator: the only place a request leaves the process.

#[cfg(feature = "http-transport")]
pub mod http;
pub mod memory;

use std::{error::Error, fmt};

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

/// Everything the transport needs to perform one call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// Path (joined to the transport base URL) or absolute URL.
    pub endpoint: String,
    /// HTTP verb.
    pub method: Method,
    /// Query parameters for `GET`, JSON body otherwise.
    pub data: Option<Value>,
    /// Decode the response body as JSON; `null` is returned when false.
    pub parse: bool,
}

impl TransportRequest {
    /// Parsed `GET` of `endpoint`.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Get,
            data: None,
            parse: true,
        }
    }
}

/// Failure reported by a transport.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Human readable reason, carried by FAILURE actions.
    pub message: String,
    /// Field-keyed validation errors returned by the API, if any.
    pub errors: Option<Map<String, Value>>,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl TransportError {
    /// Error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: None,
            source: None,
        }
    }

    /// Error caused by a lower-level failure.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            errors: None,
            source: Some(Box::new(source)),
        }
    }

    /// Attach field-keyed validation errors.
    pub fn with_errors(mut self, errors: Map<String, Value>) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// Performs network calls on behalf of the fetch middleware.
pub trait Transport: Send + Sync {
    /// Perform `request` and resolve to its parsed body.
    fn fetch(&self, request: TransportRequest) -> BoxFuture<'static, TransportResult<Value>>;
}
