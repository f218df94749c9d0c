//! Userscript manager detection.
//!
//! The host reports its own identity through the script metadata it hands
//! every userscript at startup. Detection runs once; the result gates every
//! host-specific branch in the rest of the shim.

use serde::{Deserialize, Serialize};

/// Host-reported script metadata, supplied by the manager at script start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInfo {
    /// Self-reported name of the manager executing the script.
    pub script_handler: String,
    /// Raw text of the script's own metadata block.
    pub script_meta_str: String,
}

impl ScriptInfo {
    pub fn new(script_handler: impl Into<String>, script_meta_str: impl Into<String>) -> Self {
        Self {
            script_handler: script_handler.into(),
            script_meta_str: script_meta_str.into(),
        }
    }
}

/// The managers with verified capability-surface behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostManager {
    Tampermonkey,
    Greasemonkey,
    Violentmonkey,
    FireMonkey,
    /// Anything else. Every host-specific branch evaluates false for it,
    /// which leaves the least host-specific behavior in place.
    Unknown,
}

impl HostManager {
    /// Identify the manager from its self-reported handler name.
    ///
    /// The comparison is exact; an unrecognized name is `Unknown`, never an
    /// error.
    #[must_use]
    pub fn detect(script_handler: &str) -> Self {
        match script_handler {
            "Tampermonkey" => Self::Tampermonkey,
            "Greasemonkey" => Self::Greasemonkey,
            "Violentmonkey" => Self::Violentmonkey,
            "FireMonkey" => Self::FireMonkey,
            _ => Self::Unknown,
        }
    }

    /// Whether the host already provides the target capability surface.
    ///
    /// For a conformant host the shim disables itself entirely; nothing
    /// downstream of detection runs.
    #[must_use]
    pub const fn is_conformant(self) -> bool {
        matches!(self, Self::Tampermonkey)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tampermonkey => "Tampermonkey",
            Self::Greasemonkey => "Greasemonkey",
            Self::Violentmonkey => "Violentmonkey",
            Self::FireMonkey => "FireMonkey",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HostManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Managers that exist in the wild but have not been checked against the
/// verified four. Their surfaces may or may not need the same corrections.
pub const UNVERIFIED_MANAGERS: &[&str] = &[
    "Tampermonkey beta",
    "MeddleMonkey",
    "Moraviamonkey",
    "Ace Script",
    "Scripter",
    "Script Runner Pro",
    "Chrome User Script Handler",
    "User JavaScript and CSS",
    "JavaScript Tricks",
    "BetterScripter",
    "usi",
    "User script",
    "4chan X",
    "Scriptish",
];
