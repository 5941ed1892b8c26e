//! In-process transport answering from scripted responses, used by tests and offline hosts.

use std::{collections::VecDeque, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

use super::{Transport, TransportError, TransportRequest, TransportResult};

enum Scripted {
    Ready(TransportResult<Value>),
    Gated(oneshot::Receiver<TransportResult<Value>>),
}

/// Transport returning queued responses per endpoint, in FIFO order.
///
/// Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    routes: Arc<DashMap<String, VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MemoryTransport {
    /// Empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for `endpoint`.
    pub fn respond(&self, endpoint: impl Into<String>, body: Value) {
        self.push(endpoint.into(), Scripted::Ready(Ok(body)));
    }

    /// Queue a failure for `endpoint`.
    pub fn fail(&self, endpoint: impl Into<String>, error: TransportError) {
        self.push(endpoint.into(), Scripted::Ready(Err(error)));
    }

    /// Queue a response that resolves only once the returned sender is used.
    pub fn gate(&self, endpoint: impl Into<String>) -> oneshot::Sender<TransportResult<Value>> {
        let (tx, rx) = oneshot::channel();
        self.push(endpoint.into(), Scripted::Gated(rx));
        tx
    }

    /// Requests received so far, in call order.
    pub async fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().await.clone()
    }

    fn push(&self, endpoint: String, scripted: Scripted) {
        self.routes.entry(endpoint).or_default().push_back(scripted);
    }

    fn next_for(&self, endpoint: &str) -> Option<Scripted> {
        self.routes
            .get_mut(endpoint)
            .and_then(|mut queue| queue.pop_front())
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, request: TransportRequest) -> BoxFuture<'static, TransportResult<Value>> {
        let transport = self.clone();
        Box::pin(async move {
            let scripted = transport.next_for(&request.endpoint);
            let endpoint = request.endpoint.clone();
            transport.calls.lock().await.push(request);

            match scripted {
                Some(Scripted::Ready(result)) => result,
                Some(Scripted::Gated(rx)) => rx.await.unwrap_or_else(|_| {
                    Err(TransportError::new(format!(
                        "scripted response for `{endpoint}` was dropped"
                    )))
                }),
                None => Err(TransportError::new(format!(
                    "no response scripted for `{endpoint}`"
                ))),
            }
        })
    }
}
