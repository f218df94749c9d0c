//! Shim orchestration.
//!
//! One [`install`] call at script startup runs the whole pass: detect the
//! host, bail out entirely when its surface is already conformant,
//! normalize every declared capability, then install the fetch proxy where
//! the host needs it.

use std::sync::Arc;

use serde::Deserialize;

use crate::grants::effective_grants;
use crate::host::{HostManager, ScriptInfo};
use crate::message::MessageChannel;
use crate::normalize::Normalizer;
use crate::page::PageEnvironment;
use crate::proxy::{self, ProxiedFetch};
use crate::table::CapabilityTable;

/// Behavior knobs. Defaults preserve the original surface semantics:
/// duplicate declarations collapse before policy runs, and pending proxied
/// fetches wait forever.
#[derive(Debug, Clone, Deserialize)]
pub struct ShimOptions {
    /// Collapse repeated grant declarations to their first occurrence.
    /// Reapplying most policies is harmless, but reapplying the network
    /// wrapper would double-wrap and double-invoke callbacks.
    #[serde(default = "default_dedup_grants")]
    pub dedup_grants: bool,

    /// Opt-in age for [`ProxiedFetch::sweep`]. `None` keeps the
    /// wait-forever behavior; the shim never sweeps on its own either way.
    #[serde(default)]
    pub stale_fetch_timeout_ms: Option<u64>,
}

const fn default_dedup_grants() -> bool {
    true
}

impl Default for ShimOptions {
    fn default() -> Self {
        Self {
            dedup_grants: default_dedup_grants(),
            stale_fetch_timeout_ms: None,
        }
    }
}

/// What one install pass did.
pub struct ShimReport {
    /// The detected host.
    pub host: HostManager,
    /// Capability names the normalizer processed, in order.
    pub normalized: Vec<String>,
    /// The replacement fetch, when the proxy was installed.
    pub proxied_fetch: Option<Arc<ProxiedFetch>>,
}

impl ShimReport {
    /// Whether the pass exited early on a conformant surface.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.host.is_conformant()
    }
}

impl std::fmt::Debug for ShimReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShimReport")
            .field("host", &self.host)
            .field("normalized", &self.normalized)
            .field("proxied_fetch", &self.proxied_fetch.is_some())
            .finish()
    }
}

/// Run the full shim pass once, at script startup.
pub fn install(
    info: &ScriptInfo,
    table: &Arc<CapabilityTable>,
    env: &Arc<dyn PageEnvironment>,
    channel: &Arc<dyn MessageChannel>,
    options: &ShimOptions,
) -> ShimReport {
    let host = HostManager::detect(&info.script_handler);
    tracing::debug!(event = "shim.detect", host = %host);

    if host.is_conformant() {
        tracing::debug!(
            event = "shim.skip",
            host = %host,
            "surface already conformant; nothing to do"
        );
        return ShimReport {
            host,
            normalized: Vec::new(),
            proxied_fetch: None,
        };
    }

    let grants = effective_grants(host, &info.script_meta_str, options.dedup_grants);
    Normalizer::new(host, Arc::clone(env)).apply(table, &grants);

    let proxied_fetch = proxy::install(
        host,
        Arc::clone(env),
        Arc::clone(channel),
        options.stale_fetch_timeout_ms,
    );

    ShimReport {
        host,
        normalized: grants,
        proxied_fetch,
    }
}
