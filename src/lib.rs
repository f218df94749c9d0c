//! gmshim - Line up behavior of the base GM.* capability surface across
//! userscript managers.
//!
//! Userscript managers expose the same privileged capabilities with
//! different spellings, calling conventions and gaps. This crate makes a
//! script behave identically on all of them by normalizing the surface
//! once at startup:
//!
//! - [`host`] detects which manager is executing the script and
//!   short-circuits everything when the surface is already conformant.
//! - [`normalize`] walks the declared grant list and, per capability,
//!   wraps, aliases, synthesizes, installs a deliberate no-op, or reports
//!   the capability unavailable.
//! - [`proxy`] replaces the page-context fetch for the hosts whose
//!   isolated execution context is denied by origin-filtering sites,
//!   relaying requests into the real page over a message channel.
//!
//! Verified against Tampermonkey, Greasemonkey, Violentmonkey and
//! FireMonkey; other managers are listed in
//! [`host::UNVERIFIED_MANAGERS`] and deliberately left unverified.
//!
//! Everything host-facing sits behind traits ([`page::PageEnvironment`],
//! [`message::MessageChannel`]) and a mutable capability registry
//! ([`table::CapabilityTable`]), so the policy logic runs the same against
//! a real page or a synthetic one in tests.

#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod error;
pub mod grants;
pub mod host;
pub mod http;
pub mod message;
pub mod normalize;
pub mod page;
pub mod pending;
pub mod proxy;
pub mod shim;
pub mod table;

pub use error::{Error, Result};
pub use host::{HostManager, ScriptInfo, UNVERIFIED_MANAGERS};
pub use shim::{ShimOptions, ShimReport, install};
pub use table::{Capability, CapabilityTable};
