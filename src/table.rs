//! Capability table.
//!
//! The shared `GM` namespace becomes a single mutable registry of named
//! capability slots. The normalizer receives the table as a dependency, so
//! its policy logic runs the same against the real surface or a synthetic
//! one built in tests.
//!
//! Namespaced capabilities are keyed by short name (`xmlHttpRequest` for
//! `GM.xmlHttpRequest`); legacy `GM_*` globals are tracked as a separate
//! presence set, since hosts expose them under a different convention.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::error::Result;
use crate::http::{HttpFn, RawHttpFn};
use crate::page::StyleElement;

/// Async accessor resolving a resource name to a URL.
pub type ResourceUrlFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Async accessor resolving a resource name to its text content.
pub type ResourceTextFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Style injection: returns the created element, or `None` when the
/// document has no head yet.
pub type StyleFn = Arc<dyn Fn(String) -> Option<StyleElement> + Send + Sync>;

/// Callback attached to a registered menu command.
pub type MenuCallback = Arc<dyn Fn() + Send + Sync>;

/// Menu registration: label, callback, optional access key.
pub type MenuRegisterFn = Arc<dyn Fn(String, MenuCallback, Option<String>) + Send + Sync>;

/// Menu unregistration by command id.
pub type MenuUnregisterFn = Arc<dyn Fn(String) + Send + Sync>;

/// One named slot in the capability table.
#[derive(Clone)]
pub enum Capability {
    /// Host network primitive, callback-style completion only.
    RawHttp(RawHttpFn),
    /// Normalized network capability: awaitable, callbacks still honored.
    Http(HttpFn),
    ResourceUrl(ResourceUrlFn),
    ResourceText(ResourceTextFn),
    Style(StyleFn),
    MenuRegister(MenuRegisterFn),
    MenuUnregister(MenuUnregisterFn),
    /// Present on the host but not modeled by the shim (e.g. `getValue`).
    Opaque,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::RawHttp(_) => "RawHttp",
            Self::Http(_) => "Http",
            Self::ResourceUrl(_) => "ResourceUrl",
            Self::ResourceText(_) => "ResourceText",
            Self::Style(_) => "Style",
            Self::MenuRegister(_) => "MenuRegister",
            Self::MenuUnregister(_) => "MenuUnregister",
            Self::Opaque => "Opaque",
        };
        f.write_str(kind)
    }
}

/// Mutable registry of the namespaced capability surface plus the legacy
/// `GM_*` globals' presence.
///
/// Interior mutability keeps the table shareable: synthesized capabilities
/// hold an `Arc` back to the table and look their dependencies up at call
/// time, the same late binding the live namespace gives them.
#[derive(Debug, Default)]
pub struct CapabilityTable {
    entries: Mutex<HashMap<String, Capability>>,
    legacy: Mutex<HashSet<String>>,
}

impl CapabilityTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a namespaced entry, keyed by short name.
    pub fn set(&self, name: impl Into<String>, capability: Capability) {
        self.entries.lock().insert(name.into(), capability);
    }

    pub fn remove(&self, name: &str) -> Option<Capability> {
        self.entries.lock().remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Capability> {
        self.entries.lock().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Record a legacy `GM_foo` global as present on the host.
    pub fn set_legacy(&self, name: impl Into<String>) {
        self.legacy.lock().insert(name.into());
    }

    /// Probe whether the host actually made a declared capability
    /// available, under the naming convention the declaration uses:
    /// `GM_*` names are legacy globals, `GM.*` names live in the
    /// namespace. Anything else is never granted.
    #[must_use]
    pub fn granted(&self, declared: &str) -> bool {
        if declared.starts_with("GM_") {
            self.legacy.lock().contains(declared)
        } else if let Some(short) = declared.strip_prefix("GM.") {
            self.entries.lock().contains_key(short)
        } else {
            false
        }
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    // Typed accessors. Each returns the slot only when it holds the
    // matching capability kind.

    #[must_use]
    pub fn raw_http(&self) -> Option<RawHttpFn> {
        match self.entries.lock().get("xmlHttpRequest") {
            Some(Capability::RawHttp(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }

    #[must_use]
    pub fn http(&self) -> Option<HttpFn> {
        match self.entries.lock().get("xmlHttpRequest") {
            Some(Capability::Http(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }

    #[must_use]
    pub fn resource_url(&self) -> Option<ResourceUrlFn> {
        self.resource_url_slot("getResourceUrl")
    }

    /// The host's own differently-spelled accessor, when it has one.
    #[must_use]
    pub fn resource_url_upper(&self) -> Option<ResourceUrlFn> {
        self.resource_url_slot("getResourceURL")
    }

    /// The pre-wrap accessor saved by the normalizer.
    #[must_use]
    pub fn orig_resource_url(&self) -> Option<ResourceUrlFn> {
        self.resource_url_slot("origGetResourceUrl")
    }

    fn resource_url_slot(&self, name: &str) -> Option<ResourceUrlFn> {
        match self.entries.lock().get(name) {
            Some(Capability::ResourceUrl(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }

    #[must_use]
    pub fn resource_text(&self) -> Option<ResourceTextFn> {
        match self.entries.lock().get("getResourceText") {
            Some(Capability::ResourceText(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }

    #[must_use]
    pub fn style(&self) -> Option<StyleFn> {
        match self.entries.lock().get("addStyle") {
            Some(Capability::Style(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }

    #[must_use]
    pub fn menu_register(&self) -> Option<MenuRegisterFn> {
        match self.entries.lock().get("registerMenuCommand") {
            Some(Capability::MenuRegister(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }

    #[must_use]
    pub fn menu_unregister(&self) -> Option<MenuUnregisterFn> {
        match self.entries.lock().get("unregisterMenuCommand") {
            Some(Capability::MenuUnregister(f)) => Some(Arc::clone(f)),
            _ => None,
        }
    }
}
