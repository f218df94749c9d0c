//! Cross-context fetch proxy.
//!
//! Some sites deny requests issued from a manager's isolated execution
//! context. For the hosts affected, the page-context fetch primitive is
//! replaced by a proxy: requests are posted into the real page as
//! `fetchRequest` messages, performed there by an injected responder, and
//! answered with `fetchResponse` messages correlated by query id.
//!
//! If the responder cannot be delivered, the proxy is not installed and
//! the original primitive stays in place. Failing open keeps the page
//! working with whatever the direct fetch can still reach.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::host::HostManager;
use crate::http::HttpResponse;
use crate::message::{MessageChannel, PageMessage};
use crate::page::PageEnvironment;
use crate::pending::{Clock, FetchOutcome, PendingFetches};

/// Hosts whose isolated context is distrusted by origin-filtering sites.
/// Everything else keeps its direct fetch.
#[must_use]
pub fn needs_proxy(host: HostManager) -> bool {
    matches!(
        host,
        HostManager::Greasemonkey | HostManager::FireMonkey
    )
}

/// Install the proxy when the host needs it.
///
/// Returns `None`, leaving the original fetch untouched, for unaffected
/// hosts and whenever the page refuses the responder injection.
pub fn install(
    host: HostManager,
    env: Arc<dyn PageEnvironment>,
    channel: Arc<dyn MessageChannel>,
    stale_timeout_ms: Option<u64>,
) -> Option<Arc<ProxiedFetch>> {
    if !needs_proxy(host) {
        tracing::debug!(event = "proxy.skip", host = %host, "direct fetch kept");
        return None;
    }

    if let Err(err) = env.inject_responder() {
        tracing::error!(
            event = "proxy.inject.failed",
            host = %host,
            error = %err,
            "page responder injection failed; keeping direct fetch"
        );
        return None;
    }

    PageResponder::attach(env, Arc::clone(&channel));
    let proxied = Arc::new(ProxiedFetch::new(channel, stale_timeout_ms));
    tracing::debug!(event = "proxy.installed", host = %host);
    Some(proxied)
}

/// Page-context half of the proxy: serves `fetchRequest` messages with the
/// page's own fetch and posts the outcome back.
pub struct PageResponder;

impl PageResponder {
    /// Subscribe the responder to the channel. The listener lives for the
    /// page's lifetime.
    pub fn attach(env: Arc<dyn PageEnvironment>, channel: Arc<dyn MessageChannel>) {
        let reply_channel = Arc::clone(&channel);
        channel.subscribe(Arc::new(move |message: PageMessage| {
            let env = Arc::clone(&env);
            let channel = Arc::clone(&reply_channel);
            Box::pin(async move {
                let PageMessage::FetchRequest {
                    url,
                    options,
                    query_id,
                } = message
                else {
                    return;
                };
                let response = match env.fetch(&url, &options).await {
                    Ok(response) => PageMessage::FetchResponse {
                        ok: true,
                        buffer: Some(response.body),
                        status: Some(response.status),
                        status_text: Some(response.status_text),
                        error: None,
                        query_id,
                    },
                    Err(err) => PageMessage::FetchResponse {
                        ok: false,
                        buffer: None,
                        status: None,
                        status_text: None,
                        error: Some(err.to_string()),
                        query_id,
                    },
                };
                channel.post(response).await;
            })
        }));
    }
}

/// Shim-context half of the proxy: the replacement fetch primitive.
pub struct ProxiedFetch {
    pending: Arc<PendingFetches>,
    channel: Arc<dyn MessageChannel>,
    stale_timeout_ms: Option<u64>,
}

impl ProxiedFetch {
    /// Create the replacement fetch and attach its persistent response
    /// listener to the channel.
    #[must_use]
    pub fn new(channel: Arc<dyn MessageChannel>, stale_timeout_ms: Option<u64>) -> Self {
        Self::with_pending(channel, Arc::new(PendingFetches::new()), stale_timeout_ms)
    }

    #[must_use]
    pub fn with_clock(
        channel: Arc<dyn MessageChannel>,
        clock: Arc<dyn Clock>,
        stale_timeout_ms: Option<u64>,
    ) -> Self {
        Self::with_pending(
            channel,
            Arc::new(PendingFetches::with_clock(clock)),
            stale_timeout_ms,
        )
    }

    fn with_pending(
        channel: Arc<dyn MessageChannel>,
        pending: Arc<PendingFetches>,
        stale_timeout_ms: Option<u64>,
    ) -> Self {
        let routed = Arc::clone(&pending);
        channel.subscribe(Arc::new(move |message: PageMessage| {
            let pending = Arc::clone(&routed);
            Box::pin(async move {
                route_response(&pending, message);
            })
        }));
        Self {
            pending,
            channel,
            stale_timeout_ms,
        }
    }

    /// Issue a fetch through the page context.
    ///
    /// Resolution is correlated purely by query id, so concurrent calls
    /// complete in whatever order their responses arrive.
    pub async fn fetch(&self, url: &str, options: Value) -> Result<HttpResponse> {
        let (query_id, receiver) = self.pending.register();
        self.channel
            .post(PageMessage::FetchRequest {
                url: url.to_string(),
                options,
                query_id,
            })
            .await;
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_cancelled) => Err(Error::ChannelClosed),
        }
    }

    /// Reject and evict pending entries older than the configured opt-in
    /// age. Without the opt-in this does nothing and entries wait forever.
    pub fn sweep(&self) -> usize {
        match self.stale_timeout_ms {
            Some(max_age_ms) => self.pending.sweep_stale(max_age_ms),
            None => 0,
        }
    }

    #[must_use]
    pub fn pending(&self) -> &PendingFetches {
        &self.pending
    }
}

/// Route one message into the pending table. The body of the persistent
/// response listener; non-response messages are ignored.
///
/// Returns whether a pending entry was completed.
pub fn route_response(pending: &PendingFetches, message: PageMessage) -> bool {
    let PageMessage::FetchResponse {
        ok,
        buffer,
        status,
        status_text,
        error,
        query_id,
    } = message
    else {
        return false;
    };

    let outcome: FetchOutcome = if ok {
        Ok(HttpResponse {
            status: status.unwrap_or(200),
            status_text: status_text.unwrap_or_default(),
            content_type: None,
            body: buffer.unwrap_or_default(),
        })
    } else {
        Err(Error::fetch(error.unwrap_or_else(|| {
            "fetch failed in page context".to_string()
        })))
    };
    pending.complete(query_id, outcome)
}
