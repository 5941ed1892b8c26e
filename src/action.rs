//! Actions flowing through the store: the lifecycle triple, request descriptors and metadata.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{error::DispatchError, normalize::Entities, schema::SchemaNode, transport::Method};

static NULL: Value = Value::Null;

/// Name of an action, e.g. `GAMES_FETCH_SUCCESS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionType(Arc<str>);

impl ActionType {
    /// Build an action type from its name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Borrow the action name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// The START/SUCCESS/FAILURE triple driving a request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTypes {
    /// Dispatched before the transport is called.
    pub start: ActionType,
    /// Dispatched with the response payload.
    pub success: ActionType,
    /// Dispatched with the failure message.
    pub failure: ActionType,
}

impl RequestTypes {
    /// Build a triple from its three names.
    pub fn new(
        start: impl Into<ActionType>,
        success: impl Into<ActionType>,
        failure: impl Into<ActionType>,
    ) -> Self {
        Self {
            start: start.into(),
            success: success.into(),
            failure: failure.into(),
        }
    }

    /// Derive `{PREFIX}_START`, `{PREFIX}_SUCCESS` and `{PREFIX}_FAILURE`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self::new(
            format!("{prefix}_START"),
            format!("{prefix}_SUCCESS"),
            format!("{prefix}_FAILURE"),
        )
    }

    /// Build a triple from dynamic input, rejecting anything but exactly three names.
    pub fn from_slice(types: &[&str]) -> Result<Self, DispatchError> {
        match types {
            [start, success, failure] => {
                let types = Self::new(*start, *success, *failure);
                types.validate()?;
                Ok(types)
            }
            _ => Err(DispatchError::InvalidTypes(format!(
                "expected an array of three action types, got {}",
                types.len()
            ))),
        }
    }

    /// Reject empty names and triples reusing the same name twice.
    pub fn validate(&self) -> Result<(), DispatchError> {
        let names = [&self.start, &self.success, &self.failure];
        if names.iter().any(|name| name.as_str().is_empty()) {
            return Err(DispatchError::InvalidTypes(
                "action types must not be empty".into(),
            ));
        }
        if self.start == self.success || self.start == self.failure || self.success == self.failure
        {
            return Err(DispatchError::InvalidTypes(format!(
                "action types must be distinct, got [{}, {}, {}]",
                self.start, self.success, self.failure
            )));
        }
        Ok(())
    }

    /// Classify an action against this triple.
    ///
    /// Returns `None` when the action is not part of this lifecycle, including when its name
    /// matches but its body belongs to another phase.
    pub fn classify<'a>(&self, action: &'a Action) -> Option<Lifecycle<'a>> {
        match &action.body {
            ActionBody::Start if action.ty == self.start => Some(Lifecycle::Start),
            ActionBody::Success { data, .. } if action.ty == self.success => {
                Some(Lifecycle::Success(data))
            }
            ActionBody::Failure { error } if action.ty == self.failure => {
                Some(Lifecycle::Failure(error))
            }
            _ => None,
        }
    }
}

/// Phase of a lifecycle action, borrowed from the action body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lifecycle<'a> {
    /// Request started.
    Start,
    /// Request succeeded with this payload.
    Success(&'a Value),
    /// Request failed with this message.
    Failure(&'a str),
}

/// Metadata shared by the three actions of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionMeta {
    /// Append the page to the existing list instead of replacing it.
    pub push: bool,
    /// Page requested by a paginated fetch.
    pub page: Option<u32>,
    /// Logical key of the record touched (entity id or list id).
    pub key: Option<String>,
    /// Arbitrary fields carried through to every dispatched action.
    pub extra: Map<String, Value>,
    /// Identifier correlating the START, SUCCESS and FAILURE of one request.
    pub request_id: Option<Uuid>,
}

impl ActionMeta {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logical record key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the requested page; `push` follows from it.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self.push = page > 1;
        self
    }

    /// Attach an extra pass-through field.
    pub fn with_extra(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(field.into(), value.into());
        self
    }
}

/// Body of an action; reducers match on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionBody {
    /// A request has been sent.
    Start,
    /// A request resolved.
    Success {
        /// Normalized result (ids in place of entities) or the raw body.
        data: Value,
        /// Entities extracted by normalization, merged into the entity store.
        entities: Option<Entities>,
    },
    /// A request failed.
    Failure {
        /// Human readable reason.
        error: String,
    },
    /// Any other action handled by additional reducer handlers.
    Custom {
        /// Free-form payload.
        data: Value,
    },
}

/// An action reduced by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Action name.
    pub ty: ActionType,
    /// Pass-through metadata.
    pub meta: ActionMeta,
    /// Phase-specific payload.
    pub body: ActionBody,
}

impl Action {
    /// START action.
    pub fn start(ty: ActionType, meta: ActionMeta) -> Self {
        Self {
            ty,
            meta,
            body: ActionBody::Start,
        }
    }

    /// SUCCESS action.
    pub fn success(
        ty: ActionType,
        meta: ActionMeta,
        data: Value,
        entities: Option<Entities>,
    ) -> Self {
        Self {
            ty,
            meta,
            body: ActionBody::Success { data, entities },
        }
    }

    /// FAILURE action.
    pub fn failure(ty: ActionType, meta: ActionMeta, error: impl Into<String>) -> Self {
        Self {
            ty,
            meta,
            body: ActionBody::Failure {
                error: error.into(),
            },
        }
    }

    /// Action outside any request lifecycle.
    pub fn custom(ty: impl Into<ActionType>, data: Value) -> Self {
        Self {
            ty: ty.into(),
            meta: ActionMeta::default(),
            body: ActionBody::Custom { data },
        }
    }

    /// Replace the metadata.
    pub fn with_meta(mut self, meta: ActionMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Payload handed to additional handlers (`null` for START and FAILURE).
    pub fn data(&self) -> &Value {
        match &self.body {
            ActionBody::Success { data, .. } | ActionBody::Custom { data } => data,
            ActionBody::Start | ActionBody::Failure { .. } => &NULL,
        }
    }
}

/// Resolves the endpoint of a request from its metadata.
pub type EndpointFn = Arc<dyn Fn(&ActionMeta) -> String + Send + Sync>;

/// Endpoint of a request, fixed or computed from the action metadata.
#[derive(Clone)]
pub enum Endpoint {
    /// Fixed path.
    Static(String),
    /// Path computed at dispatch time.
    Resolver(EndpointFn),
}

impl Endpoint {
    /// Fixed endpoint.
    pub fn fixed(path: impl Into<String>) -> Self {
        Endpoint::Static(path.into())
    }

    /// Endpoint computed by `resolver`.
    pub fn resolver<F>(resolver: F) -> Self
    where
        F: Fn(&ActionMeta) -> String + Send + Sync + 'static,
    {
        Endpoint::Resolver(Arc::new(resolver))
    }

    /// Endpoint with `{name}` placeholders filled from the metadata.
    ///
    /// `{key}` and `{page}` come from the matching metadata fields, every other placeholder from
    /// `extra`. Unknown placeholders are left untouched.
    pub fn template(template: impl Into<String>) -> Self {
        let template = template.into();
        Self::resolver(move |meta| fill_template(&template, meta))
    }

    /// Produce the concrete path for this metadata.
    pub fn resolve(&self, meta: &ActionMeta) -> String {
        match self {
            Endpoint::Static(path) => path.clone(),
            Endpoint::Resolver(resolver) => resolver(meta),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Static(path) => f.debug_tuple("Static").field(path).finish(),
            Endpoint::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Endpoint::fixed(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Endpoint::fixed(value)
    }
}

fn fill_template(template: &str, meta: &ActionMeta) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..close];
        let value = match name {
            "key" => meta.key.clone(),
            "page" => meta.page.map(|page| page.to_string()),
            other => meta.extra.get(other).map(|value| match value {
                Value::String(text) => text.clone(),
                value => value.to_string(),
            }),
        };
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Request descriptor intercepted by the fetch middleware.
#[derive(Debug, Clone)]
pub struct CallApi {
    /// Lifecycle triple dispatched around the transport call.
    pub types: RequestTypes,
    /// Where to send the request.
    pub endpoint: Endpoint,
    /// Schema used to normalize the response, if any.
    pub schema: Option<SchemaNode>,
    /// Request body.
    pub data: Option<Value>,
    /// HTTP method.
    pub method: Method,
    /// Whether the transport should parse the response body.
    pub parse: bool,
}

impl CallApi {
    /// GET request with a parsed JSON response and no schema.
    pub fn new(types: RequestTypes, endpoint: impl Into<Endpoint>) -> Self {
        Self {
            types,
            endpoint: endpoint.into(),
            schema: None,
            data: None,
            method: Method::Get,
            parse: true,
        }
    }

    /// Normalize the response through `schema`.
    pub fn with_schema(mut self, schema: SchemaNode) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Send `data` as the request body using `method`.
    pub fn with_body(mut self, method: Method, data: Value) -> Self {
        self.method = method;
        self.data = Some(data);
        self
    }

    /// Skip parsing the response body.
    pub fn without_parse(mut self) -> Self {
        self.parse = false;
        self
    }
}

/// A request descriptor plus the metadata passed through to its lifecycle actions.
#[derive(Debug, Clone)]
pub struct ApiCall {
    /// Request descriptor.
    pub call: CallApi,
    /// Metadata copied onto START, SUCCESS and FAILURE.
    pub meta: ActionMeta,
}

impl ApiCall {
    /// Pair a descriptor with its metadata.
    pub fn new(call: CallApi, meta: ActionMeta) -> Self {
        Self { call, meta }
    }
}

/// Anything the store accepts: plain actions are reduced, API calls go through the middleware.
#[derive(Debug, Clone)]
pub enum Dispatchable {
    /// Reduce directly.
    Action(Action),
    /// Perform a request and dispatch its lifecycle.
    Call(ApiCall),
}

impl From<Action> for Dispatchable {
    fn from(value: Action) -> Self {
        Dispatchable::Action(value)
    }
}

impl From<ApiCall> for Dispatchable {
    fn from(value: ApiCall) -> Self {
        Dispatchable::Call(value)
    }
}
