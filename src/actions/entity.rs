//! Fetch-one action creator with a reload policy.

use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    action::{ActionMeta, ApiCall, CallApi, Endpoint, RequestTypes},
    error::DispatchError,
    reducers::RequestRecord,
    schema::SchemaNode,
    store::{FetchOutcome, Store},
};

/// Decides whether an existing, idle record should be fetched again.
pub type ReloadFn = Arc<dyn Fn(&RequestRecord) -> bool + Send + Sync>;

/// Fetch-one action creator built by [`entity_action`].
#[derive(Clone)]
pub struct EntityAction {
    endpoint: Endpoint,
    slice: String,
    types: RequestTypes,
    need_reload: Option<ReloadFn>,
    schema: Option<SchemaNode>,
}

/// Fetch one resource into the `entities` slice registered as `slice`.
///
/// `endpoint` usually is an [`Endpoint::template`] using `{key}`, which receives the id.
pub fn entity_action(
    endpoint: impl Into<Endpoint>,
    slice: impl Into<String>,
    types: RequestTypes,
) -> EntityAction {
    EntityAction {
        endpoint: endpoint.into(),
        slice: slice.into(),
        types,
        need_reload: None,
        schema: None,
    }
}

impl EntityAction {
    /// Only refetch a record holding data when `need_reload` returns true for it.
    pub fn need_reload<F>(mut self, need_reload: F) -> Self
    where
        F: Fn(&RequestRecord) -> bool + Send + Sync + 'static,
    {
        self.need_reload = Some(Arc::new(need_reload));
        self
    }

    /// Normalize responses through `schema`.
    pub fn schema(mut self, schema: SchemaNode) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Fetch the record for `id` unless a fetch is in flight or a reload is declined.
    pub async fn fetch(
        &self,
        store: &Store,
        id: impl fmt::Display,
    ) -> Result<FetchOutcome, DispatchError> {
        let key = id.to_string();
        if let Some(record) = store.record(&self.slice, Some(&key)).await {
            if record.loading {
                debug!(slice = %self.slice, %key, "fetch already in flight; skipping");
                return Ok(FetchOutcome::Skipped);
            }
            let declined = self
                .need_reload
                .as_ref()
                .is_some_and(|need_reload| !need_reload(&record));
            if declined && record.loaded {
                debug!(slice = %self.slice, %key, "cached record is fresh; skipping");
                return Ok(FetchOutcome::Skipped);
            }
        }

        let mut call = CallApi::new(self.types.clone(), self.endpoint.clone());
        call.schema = self.schema.clone();
        store
            .dispatch(ApiCall::new(call, ActionMeta::new().with_key(key)))
            .await
    }
}

impl fmt::Debug for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityAction")
            .field("endpoint", &self.endpoint)
            .field("slice", &self.slice)
            .field("types", &self.types)
            .field("need_reload", &self.need_reload.is_some())
            .field("schema", &self.schema)
            .finish()
    }
}
