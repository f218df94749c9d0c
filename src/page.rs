//! Page environment seam.
//!
//! Everything the shim consumes from the hosting page goes through
//! [`PageEnvironment`]: the page-context `fetch`, object-URL minting, the
//! document head, and delivery of the page-side fetch responder. Keeping
//! this behind a trait lets the normalizer and proxy run against a
//! synthetic page in tests.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;

use crate::error::Result;
use crate::http::HttpResponse;

/// A `<style>` element synthesized for style injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleElement {
    pub css: String,
}

impl StyleElement {
    pub fn new(css: impl Into<String>) -> Self {
        Self { css: css.into() }
    }
}

/// The hosting page's execution context, as observed from the shim.
#[async_trait]
pub trait PageEnvironment: Send + Sync {
    /// Perform a fetch in the page's own execution context.
    ///
    /// `options` is passed through opaquely, the way the page `fetch`
    /// receives its init object.
    async fn fetch(&self, url: &str, options: &Value) -> Result<HttpResponse>;

    /// Mint an object URL for in-memory bytes. Object URLs are context-local
    /// references; they are only ever consumed inside the same page.
    fn create_object_url(&self, body: Vec<u8>, content_type: Option<String>) -> String;

    /// Whether the document has a `<head>` to append into yet.
    fn has_document_head(&self) -> bool;

    /// Append a synthesized style element to the document head.
    fn append_to_head(&self, element: &StyleElement);

    /// Deliver the page-side fetch responder into the page context.
    ///
    /// Implementations are expected to source the helper from a data URL
    /// rather than an inline script body, so content-security policies that
    /// ban inline scripts do not block it. `Err` means the page refused the
    /// injection; the caller fails open.
    fn inject_responder(&self) -> Result<()>;
}

/// Re-encode in-memory bytes as a self-contained data URL.
///
/// Data URLs survive context boundaries that object URLs do not. A missing
/// content type degrades to `application/octet-stream`, the same as a
/// typeless blob.
#[must_use]
pub fn to_data_url(content_type: Option<&str>, body: &[u8]) -> String {
    let mime = content_type.unwrap_or("application/octet-stream");
    let encoded = base64::engine::general_purpose::STANDARD.encode(body);
    format!("data:{mime};base64,{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_carries_the_content_type() {
        let url = to_data_url(Some("text/css"), b"body{}");
        assert_eq!(url, "data:text/css;base64,Ym9keXt9");
    }

    #[test]
    fn data_url_without_content_type_degrades_to_octet_stream() {
        let url = to_data_url(None, &[0xde, 0xad]);
        assert!(url.starts_with("data:application/octet-stream;base64,"));
    }

    #[test]
    fn data_url_of_empty_body_is_still_well_formed() {
        assert_eq!(to_data_url(Some("text/plain"), b""), "data:text/plain;base64,");
    }
}
