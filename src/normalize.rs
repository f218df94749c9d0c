//! Per-capability correction policies.
//!
//! The normalizer walks the effective grant list once and applies exactly
//! one action per name: wrap the network request, alias and wrap the
//! resource URL accessor, synthesize resource text or style injection,
//! install a deliberate menu no-op, or report the capability unavailable.
//! A failure in one capability only degrades that capability; the pass
//! always continues.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::host::HostManager;
use crate::http::{self, HttpRequest, ResponseType};
use crate::page::{PageEnvironment, StyleElement, to_data_url};
use crate::table::{
    Capability, CapabilityTable, MenuCallback, ResourceTextFn, ResourceUrlFn, StyleFn,
};

/// Applies the per-capability policy table for one host.
pub struct Normalizer {
    host: HostManager,
    env: Arc<dyn PageEnvironment>,
}

impl Normalizer {
    #[must_use]
    pub fn new(host: HostManager, env: Arc<dyn PageEnvironment>) -> Self {
        Self { host, env }
    }

    /// Apply the policy to every grant, in declaration order.
    pub fn apply(&self, table: &Arc<CapabilityTable>, grants: &[String]) {
        for name in grants {
            self.apply_one(table, grants, name);
        }
    }

    fn apply_one(&self, table: &Arc<CapabilityTable>, grants: &[String], name: &str) {
        let granted = table.granted(name);
        tracing::trace!(event = "normalize.capability", capability = %name, granted);

        match name {
            "GM.xmlHttpRequest" => self.wrap_http(table),
            "GM.getResourceURL" | "GM.getResourceUrl" => {
                if name == "GM.getResourceURL" {
                    // Violentmonkey and FireMonkey spell the accessor with
                    // an upper-case URL; normalize to the canonical name.
                    match self.host {
                        HostManager::Violentmonkey => self.alias_resource_url(table),
                        HostManager::FireMonkey => self.synthesize_resource_url(table),
                        _ => {}
                    }
                }
                self.wrap_resource_url(table);
            }
            "GM.getResourceText" => {
                if granted && self.host != HostManager::FireMonkey {
                    return;
                }
                self.synthesize_resource_text(table, grants);
            }
            "GM.addStyle" => {
                if !granted {
                    self.synthesize_style(table);
                }
            }
            "GM.registerMenuCommand" => {
                if !granted {
                    install_menu_register_noop(table);
                }
            }
            "GM_unregisterMenuCommand" => {
                if !granted {
                    install_menu_unregister_noop(table);
                }
            }
            _ => {
                if !granted {
                    tracing::error!(
                        event = "normalize.unsupported",
                        capability = %name,
                        "{name} not implemented"
                    );
                }
            }
        }
    }

    /// Replace the callback-style network primitive with the awaitable
    /// form. Applies regardless of the grant probe; the wrapper is the
    /// canonical surface for every non-conformant host.
    fn wrap_http(&self, table: &Arc<CapabilityTable>) {
        if let Some(raw) = table.raw_http() {
            table.set(
                "xmlHttpRequest",
                Capability::Http(http::wrap_dual_convention(raw)),
            );
        } else if table.http().is_some() {
            tracing::debug!(
                event = "normalize.http.already_wrapped",
                "network capability is already awaitable"
            );
        } else {
            tracing::error!(
                event = "normalize.unsupported",
                capability = "GM.xmlHttpRequest",
                "GM.xmlHttpRequest not implemented"
            );
        }
    }

    /// Violentmonkey: the upper-case spelling is the real accessor; copy
    /// it to the canonical name.
    fn alias_resource_url(&self, table: &Arc<CapabilityTable>) {
        match table.resource_url_upper() {
            Some(accessor) => table.set("getResourceUrl", Capability::ResourceUrl(accessor)),
            None => tracing::error!(
                event = "normalize.resource_url.missing",
                host = %self.host,
                "GM.getResourceURL declared but absent"
            ),
        }
    }

    /// FireMonkey has no accessor that yields a loadable URL directly;
    /// build one by requesting the resource as a binary body and minting
    /// an object URL for it. Dependencies are looked up at call time, the
    /// same late binding the live namespace gives them.
    fn synthesize_resource_url(&self, table: &Arc<CapabilityTable>) {
        let weak = Arc::downgrade(table);
        let env = Arc::clone(&self.env);
        let synthesized: ResourceUrlFn = Arc::new(move |name: String| {
            let weak = weak.clone();
            let env = Arc::clone(&env);
            Box::pin(async move {
                let table = weak
                    .upgrade()
                    .ok_or_else(|| Error::unsupported("GM.getResourceUrl"))?;
                let direct = table
                    .resource_url_upper()
                    .ok_or_else(|| Error::unsupported("GM.getResourceURL"))?;
                let url = direct(name).await?;
                let http = table
                    .http()
                    .ok_or_else(|| Error::unsupported("GM.xmlHttpRequest"))?;
                let mut request = HttpRequest::new(url);
                request.response_type = Some(ResponseType::Blob);
                let response = http(request)
                    .await
                    .map_err(|failure| Error::http(failure.message))?;
                Ok(env.create_object_url(response.body, response.content_type))
            })
        });
        table.set("getResourceUrl", Capability::ResourceUrl(synthesized));
    }

    /// Uniform final step for every host: save the current accessor, then
    /// wrap it so the returned object URL is re-encoded as a data URL.
    /// Object URLs are context-local; data URLs survive the boundary.
    fn wrap_resource_url(&self, table: &Arc<CapabilityTable>) {
        let Some(orig) = table.resource_url() else {
            tracing::error!(
                event = "normalize.resource_url.missing",
                host = %self.host,
                "no getResourceUrl accessor to wrap"
            );
            return;
        };
        table.set("origGetResourceUrl", Capability::ResourceUrl(Arc::clone(&orig)));

        let env = Arc::clone(&self.env);
        let wrapped: ResourceUrlFn = Arc::new(move |name: String| {
            let orig = Arc::clone(&orig);
            let env = Arc::clone(&env);
            Box::pin(async move {
                let object_url = orig(name).await?;
                let response = env.fetch(&object_url, &Value::Null).await?;
                Ok(to_data_url(response.content_type.as_deref(), &response.body))
            })
        });
        table.set("getResourceUrl", Capability::ResourceUrl(wrapped));
    }

    /// Resource text is synthesized from the saved pre-wrap URL accessor.
    /// That accessor is an explicit precondition: it must appear in the
    /// grant list under either spelling, and it is re-checked at call time.
    fn synthesize_resource_text(&self, table: &Arc<CapabilityTable>, grants: &[String]) {
        let has_prerequisite = grants
            .iter()
            .any(|name| name == "GM.getResourceUrl" || name == "GM.getResourceURL");
        if !has_prerequisite {
            tracing::error!(
                event = "normalize.resource_text.missing_prerequisite",
                capability = "GM.getResourceText",
                requires = "GM.getResourceUrl",
                "GM.getResourceText requires GM.getResourceUrl/getResourceURL"
            );
            return;
        }

        let weak = Arc::downgrade(table);
        let env = Arc::clone(&self.env);
        let synthesized: ResourceTextFn = Arc::new(move |name: String| {
            let weak = weak.clone();
            let env = Arc::clone(&env);
            Box::pin(async move {
                let table = weak
                    .upgrade()
                    .ok_or_else(|| Error::unsupported("GM.getResourceText"))?;
                let orig = table.orig_resource_url().ok_or_else(|| {
                    Error::missing_prerequisite("GM.getResourceText", "GM.getResourceUrl")
                })?;
                let object_url = orig(name).await?;
                let response = env.fetch(&object_url, &Value::Null).await?;
                Ok(response.text())
            })
        });
        table.set("getResourceText", Capability::ResourceText(synthesized));
    }

    /// Style injection built from plain DOM primitives: create a style
    /// element with the CSS text and append it to the head when one
    /// exists.
    fn synthesize_style(&self, table: &Arc<CapabilityTable>) {
        let env = Arc::clone(&self.env);
        let style: StyleFn = Arc::new(move |css: String| {
            if !env.has_document_head() {
                return None;
            }
            let element = StyleElement::new(css);
            env.append_to_head(&element);
            Some(element)
        });
        table.set("addStyle", Capability::Style(style));
    }
}

/// Deliberate no-op: the only native context-menu integration left is
/// deprecated and single-browser, and replacing the page's standard
/// context menu is off the table.
fn install_menu_register_noop(table: &Arc<CapabilityTable>) {
    table.set(
        "registerMenuCommand",
        Capability::MenuRegister(Arc::new(
            |_caption: String, _command: MenuCallback, _access_key: Option<String>| {},
        )),
    );
}

fn install_menu_unregister_noop(table: &Arc<CapabilityTable>) {
    table.set(
        "unregisterMenuCommand",
        Capability::MenuUnregister(Arc::new(|_command_id: String| {})),
    );
}
