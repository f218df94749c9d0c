//! Network-request capability types and the dual-convention wrapper.
//!
//! Hosts complete network requests through caller-supplied callbacks. The
//! target surface is awaitable. [`wrap_dual_convention`] adapts one into the
//! other without dropping either calling convention: the wrapped capability
//! returns an awaitable result and still invokes the caller's callbacks with
//! the same payload.

use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Expected payload shape of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Text,
    Json,
    Blob,
}

/// Observer invoked with a completed response.
pub type LoadObserver = Arc<dyn Fn(&HttpResponse) + Send + Sync>;
/// Observer invoked with a failed request.
pub type ErrorObserver = Arc<dyn Fn(&HttpFailure) + Send + Sync>;

/// Request details for the network capability.
///
/// Mirrors the host contract: `url` plus optional `onload`, `onerror` and
/// `responseType`.
#[derive(Clone, Default)]
pub struct HttpRequest {
    pub url: String,
    pub response_type: Option<ResponseType>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub on_load: Option<LoadObserver>,
    pub on_error: Option<ErrorObserver>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("response_type", &self.response_type)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("on_load", &self.on_load.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// A completed network response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// The body decoded as text, lossily for invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error payload delivered to `on_error` and carried by the rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub message: String,
}

impl HttpFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of one network request.
pub type HttpResult = std::result::Result<HttpResponse, HttpFailure>;

/// Host primitive: completion is reported only through the request's
/// callbacks.
pub type RawHttpFn = Arc<dyn Fn(HttpRequest) + Send + Sync>;

/// Normalized capability: completion is awaitable, and any caller-supplied
/// callbacks still fire.
pub type HttpFn = Arc<dyn Fn(HttpRequest) -> BoxFuture<'static, HttpResult> + Send + Sync>;

/// Fans one completion out to the fixed observer set: the pending awaitable
/// and the caller-supplied callback for that outcome. The awaitable is
/// notified first; each observer is independent of the other's presence.
struct CompletionFan {
    sender: Mutex<Option<oneshot::Sender<HttpResult>>>,
    on_load: Option<LoadObserver>,
    on_error: Option<ErrorObserver>,
}

impl CompletionFan {
    fn load(&self, response: &HttpResponse) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Ok(response.clone()));
        }
        if let Some(on_load) = &self.on_load {
            on_load(response);
        }
    }

    fn fail(&self, failure: &HttpFailure) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Err(failure.clone()));
        }
        if let Some(on_error) = &self.on_error {
            on_error(failure);
        }
    }
}

/// Adapt a callback-style network primitive into the awaitable form.
///
/// The wrapper takes over the request's `on_load`/`on_error` slots, routes
/// the host's completion through a [`CompletionFan`], and hands back a
/// future that resolves with the response or rejects with the failure. The
/// original caller callbacks, when present, are invoked afterwards with the
/// same payload.
#[must_use]
pub fn wrap_dual_convention(raw: RawHttpFn) -> HttpFn {
    Arc::new(move |mut details: HttpRequest| {
        let (sender, receiver) = oneshot::channel();
        let fan = Arc::new(CompletionFan {
            sender: Mutex::new(Some(sender)),
            on_load: details.on_load.take(),
            on_error: details.on_error.take(),
        });

        let load_fan = Arc::clone(&fan);
        details.on_load = Some(Arc::new(move |response: &HttpResponse| {
            load_fan.load(response);
        }));
        let error_fan = Arc::clone(&fan);
        details.on_error = Some(Arc::new(move |failure: &HttpFailure| {
            error_fan.fail(failure);
        }));

        raw(details);

        Box::pin(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(HttpFailure::new("request dropped without completing")))
        })
    })
}
