//! Error types of the cache layers.

use thiserror::Error;

use crate::{schema::SchemaError, transport::TransportError};

/// Errors returned synchronously by [`crate::store::Store::dispatch`].
///
/// Transport and normalization failures never surface here: they become FAILURE actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The lifecycle triple of a request is malformed.
    #[error("invalid request types: {0}")]
    InvalidTypes(String),
}

/// Errors raised while flattening a payload into entity maps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The schema references something the registry does not know.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// An entity object carries no usable id.
    #[error("`{entity}` entity is missing its `{attribute}` attribute")]
    MissingId {
        /// Entity type being normalized.
        entity: String,
        /// Expected id field.
        attribute: String,
    },
    /// Something other than an entity object or an id sits where an entity is expected.
    #[error("expected a `{entity}` entity or id, found {found}")]
    UnexpectedShape {
        /// Entity type being normalized.
        entity: String,
        /// Kind of value found instead.
        found: &'static str,
    },
    /// The id is neither a string nor a number.
    #[error("`{entity}` entity has a non-scalar id: {id}")]
    InvalidId {
        /// Entity type being normalized.
        entity: String,
        /// Offending id value.
        id: String,
    },
}

/// Message used when a failure carries no description of its own.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Something went wrong";

/// Turn a transport failure into the message carried by a FAILURE action.
pub fn failure_message(err: &TransportError) -> String {
    let message = err.message.trim();
    if message.is_empty() {
        DEFAULT_FAILURE_MESSAGE.into()
    } else {
        message.into()
    }
}
