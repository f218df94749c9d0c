//! Error types for the gmshim crate.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the shim.
///
/// Every variant degrades a single capability; none of them aborts the
/// normalization pass as a whole.
#[derive(Error, Debug)]
pub enum Error {
    /// A declared capability with no synthesis strategy and no host grant.
    #[error("{capability} not implemented")]
    Unsupported { capability: String },

    /// A synthesis strategy whose prerequisite capability was never declared.
    #[error("{capability} requires {requires}")]
    MissingPrerequisite {
        capability: String,
        requires: String,
    },

    /// The page-side helper could not be delivered into the page context.
    #[error("page injection failed: {0}")]
    Injection(String),

    /// A proxied network call failed in the page context. Display carries
    /// the underlying message text and nothing else, so callers observe
    /// the same message the page reported.
    #[error("{0}")]
    Fetch(String),

    /// A network request made through the capability surface failed.
    #[error("request failed: {0}")]
    Http(String),

    /// The completion channel was dropped before a response arrived.
    #[error("completion channel closed before a response arrived")]
    ChannelClosed,

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create an unsupported-capability error.
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
        }
    }

    /// Create a missing-prerequisite error.
    pub fn missing_prerequisite(
        capability: impl Into<String>,
        requires: impl Into<String>,
    ) -> Self {
        Self::MissingPrerequisite {
            capability: capability.into(),
            requires: requires.into(),
        }
    }

    /// Create an injection error.
    pub fn injection(message: impl Into<String>) -> Self {
        Self::Injection(message.into())
    }

    /// Create a proxied-fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    /// Create a network-request error.
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}
