//! Grant declaration scanning.
//!
//! The script's own metadata block declares which privileged capabilities it
//! uses, one `@grant <name>` line per capability. The scan is
//! case-insensitive on the keyword and preserves declaration order.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::host::HostManager;

fn grant_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)@grant\s+(\S+)").expect("grant regex"))
}

/// Capabilities FireMonkey always exposes regardless of what the script
/// declared. FireMonkey under-reports its grants, so these are assumed
/// present and run through the same policy pass as declared ones.
pub const FIREMONKEY_IMPLICIT_GRANTS: &[&str] = &[
    "GM.getResourceText",
    "GM.getResourceURL",
    "GM.xmlHttpRequest",
    "GM.getValue",
    "GM.setValue",
    "GM.addStyle",
    "GM.registerMenuCommand",
];

/// Collect every declared capability name from a metadata block, in order
/// of first appearance. Duplicates are preserved; deduplication is the
/// caller's policy decision.
#[must_use]
pub fn scan_grants(meta: &str) -> Vec<String> {
    grant_regex()
        .captures_iter(meta)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// Capability names implicitly available under the given host.
#[must_use]
pub fn implicit_grants(host: HostManager) -> &'static [&'static str] {
    match host {
        HostManager::FireMonkey => FIREMONKEY_IMPLICIT_GRANTS,
        _ => &[],
    }
}

/// The full capability list the normalizer iterates: implicit grants
/// prepended to the declared ones.
///
/// With `dedup` set, repeated names collapse to their first occurrence.
/// Reapplying a policy to an already-patched entry is harmless for most
/// capabilities but double-wraps the network request, so deduplication is
/// the default everywhere in this crate.
#[must_use]
pub fn effective_grants(host: HostManager, meta: &str, dedup: bool) -> Vec<String> {
    let mut grants: Vec<String> = implicit_grants(host)
        .iter()
        .map(|name| (*name).to_string())
        .collect();
    grants.extend(scan_grants(meta));
    if dedup {
        let mut seen = HashSet::new();
        grants.retain(|name| seen.insert(name.clone()));
    }
    grants
}
