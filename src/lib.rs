//! Normalized entity cache and fetch orchestration for the game database API.
//!
//! Responses are flattened through a [`schema::SchemaRegistry`] into per-type entity maps held
//! by a [`store::Store`], while generic reducers track the loading state and pagination of each
//! feature. Action creators in [`actions`] decide when a fetch is needed and drive the
//! START/SUCCESS/FAILURE lifecycle through the store's fetch middleware.

pub mod action;
pub mod actions;
pub mod config;
pub mod error;
pub mod normalize;
pub mod reducers;
pub mod schema;
pub mod store;
pub mod transport;

pub use action::{Action, ActionMeta, ApiCall, CallApi, Endpoint, RequestTypes};
pub use actions::{entity_action, paginated_action};
pub use config::CacheConfig;
pub use error::{DispatchError, NormalizeError};
pub use normalize::{denormalize, normalize};
pub use schema::{SchemaNode, SchemaRegistry};
pub use store::{FetchOutcome, ResponseOrdering, SharedStore, Store};
pub use transport::{Transport, TransportError};
