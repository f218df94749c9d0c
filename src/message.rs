//! Cross-context message protocol.
//!
//! Two message shapes cross the boundary between the shim context and the
//! page context, discriminated by `type` and correlated by `queryId`.
//! There is no versioning and no sender authentication beyond implicit
//! context trust; any code able to post into the page can spoof responses.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages exchanged between the two execution contexts. Field names are
/// the wire names the page-side helper uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    /// Shim → page: perform this fetch in the page's context.
    #[serde(rename = "fetchRequest", rename_all = "camelCase")]
    FetchRequest {
        url: String,
        #[serde(default)]
        options: Value,
        query_id: u64,
    },
    /// Page → shim: the outcome of one proxied fetch.
    #[serde(rename = "fetchResponse", rename_all = "camelCase")]
    FetchResponse {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        query_id: u64,
    },
}

impl PageMessage {
    #[must_use]
    pub fn query_id(&self) -> u64 {
        match self {
            Self::FetchRequest { query_id, .. } | Self::FetchResponse { query_id, .. } => *query_id,
        }
    }
}

/// Listener invoked for every message posted to the channel.
pub type MessageListener = Arc<dyn Fn(PageMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Transport between the two execution contexts.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Post a message to every subscribed listener.
    async fn post(&self, message: PageMessage);

    /// Install a persistent listener. Listeners live for the page's
    /// lifetime; there is no unsubscribe.
    fn subscribe(&self, listener: MessageListener);
}

/// In-process channel delivering every posted message to all subscribers
/// in subscription order. Stands in for same-window message passing.
#[derive(Default)]
pub struct LoopbackChannel {
    listeners: Mutex<Vec<MessageListener>>,
}

impl LoopbackChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageChannel for LoopbackChannel {
    async fn post(&self, message: PageMessage) {
        // Snapshot first so a listener may post again without deadlock.
        let listeners: Vec<MessageListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(message.clone()).await;
        }
    }

    fn subscribe(&self, listener: MessageListener) {
        self.listeners.lock().push(listener);
    }
}
