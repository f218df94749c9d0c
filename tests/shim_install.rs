//! Full install pass: detection, the conformant early exit, normalization
//! and proxy gating wired together the way a script-start caller uses them.

mod common;

use std::sync::Arc;

use common::{FakePage, meta, response, run_async, scripted_raw_http};
use gmshim::host::{HostManager, ScriptInfo};
use gmshim::message::{LoopbackChannel, MessageChannel};
use gmshim::page::PageEnvironment;
use gmshim::table::{Capability, CapabilityTable};
use gmshim::{ShimOptions, install};

fn wired() -> (Arc<CapabilityTable>, Arc<FakePage>, Arc<dyn MessageChannel>) {
    let table = Arc::new(CapabilityTable::new());
    table.set(
        "xmlHttpRequest",
        Capability::RawHttp(scripted_raw_http(vec![(
            "https://api.example/data",
            response(200, None, b"payload"),
        )])),
    );
    let page = Arc::new(FakePage::new().with_head());
    let channel: Arc<dyn MessageChannel> = Arc::new(LoopbackChannel::new());
    (table, page, channel)
}

#[test]
fn conformant_host_exits_early_and_touches_nothing() {
    let (table, page, channel) = wired();
    let info = ScriptInfo::new("Tampermonkey", meta(&["GM.xmlHttpRequest", "GM.addStyle"]));

    let report = install(
        &info,
        &table,
        &(Arc::clone(&page) as Arc<dyn PageEnvironment>),
        &channel,
        &ShimOptions::default(),
    );

    assert_eq!(report.host, HostManager::Tampermonkey);
    assert!(report.skipped());
    assert!(report.normalized.is_empty());
    assert!(report.proxied_fetch.is_none());
    // The raw primitive was not wrapped and no injection was attempted.
    assert!(table.raw_http().is_some());
    assert!(table.style().is_none());
    assert!(!page.was_injected());
}

#[test]
fn greasemonkey_gets_normalization_and_the_proxy() {
    let (table, page, channel) = wired();
    let info = ScriptInfo::new("Greasemonkey", meta(&["GM.xmlHttpRequest", "GM.addStyle"]));

    let report = install(
        &info,
        &table,
        &(Arc::clone(&page) as Arc<dyn PageEnvironment>),
        &channel,
        &ShimOptions::default(),
    );

    assert_eq!(report.host, HostManager::Greasemonkey);
    assert!(!report.skipped());
    assert_eq!(report.normalized, vec!["GM.xmlHttpRequest", "GM.addStyle"]);
    assert!(table.http().is_some());
    assert!(table.style().is_some());

    let proxied = report.proxied_fetch.expect("proxy installed");
    assert!(page.was_injected());
    let err = run_async(proxied.fetch("https://nowhere.example", serde_json::Value::Null))
        .expect_err("page has no such route");
    assert_eq!(err.to_string(), "unknown url: https://nowhere.example");
}

#[test]
fn violentmonkey_normalizes_without_the_proxy() {
    let (table, page, channel) = wired();
    let info = ScriptInfo::new("Violentmonkey", meta(&["GM.xmlHttpRequest"]));

    let report = install(
        &info,
        &table,
        &(Arc::clone(&page) as Arc<dyn PageEnvironment>),
        &channel,
        &ShimOptions::default(),
    );

    assert_eq!(report.host, HostManager::Violentmonkey);
    assert!(table.http().is_some());
    assert!(report.proxied_fetch.is_none());
    assert!(!page.was_injected());
}

#[test]
fn unknown_host_falls_back_to_generic_behavior() {
    let (table, page, channel) = wired();
    let info = ScriptInfo::new("MeddleMonkey", meta(&["GM.xmlHttpRequest", "GM.addStyle"]));

    let report = install(
        &info,
        &table,
        &(Arc::clone(&page) as Arc<dyn PageEnvironment>),
        &channel,
        &ShimOptions::default(),
    );

    assert_eq!(report.host, HostManager::Unknown);
    // Generic corrections still apply; host-specific ones do not.
    assert!(table.http().is_some());
    assert!(table.style().is_some());
    assert!(report.proxied_fetch.is_none());
}

#[test]
fn firemonkey_runs_its_implicit_grants_and_gets_the_proxy() {
    let (table, page, channel) = wired();
    // FireMonkey under-reports its grants: an empty declaration block
    // still yields the implicit capability list.
    let info = ScriptInfo::new("FireMonkey", meta(&[]));

    let report = install(
        &info,
        &table,
        &(Arc::clone(&page) as Arc<dyn PageEnvironment>),
        &channel,
        &ShimOptions::default(),
    );

    assert_eq!(report.host, HostManager::FireMonkey);
    assert_eq!(
        report.normalized,
        gmshim::grants::FIREMONKEY_IMPLICIT_GRANTS
            .iter()
            .map(|name| (*name).to_string())
            .collect::<Vec<_>>()
    );
    assert!(table.http().is_some());
    assert!(report.proxied_fetch.is_some());
    assert!(page.was_injected());
}

#[test]
fn stale_timeout_option_arms_the_proxy_sweep() {
    let (table, page, channel) = wired();
    let info = ScriptInfo::new("Greasemonkey", meta(&[]));
    let options = ShimOptions {
        stale_fetch_timeout_ms: Some(5_000),
        ..ShimOptions::default()
    };

    let report = install(
        &info,
        &table,
        &(Arc::clone(&page) as Arc<dyn PageEnvironment>),
        &channel,
        &options,
    );

    let proxied = report.proxied_fetch.expect("proxy installed");
    // Nothing pending yet, so the armed sweep finds nothing to evict.
    assert_eq!(proxied.sweep(), 0);
}
