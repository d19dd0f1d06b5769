//! `soma-bridge` – the command/control surface of the body.
//!
//! Three cooperating pieces:
//!
//! - [`server::BridgeServer`] – the primary transport: an HTTP API the
//!   remote brain polls for perception and posts action commands to.  Every
//!   inbound payload is validated before it can reach the executor.
//! - [`fallback::FallbackServer`] – the secondary transport: line-delimited
//!   JSON over TCP carrying the same command vocabulary minus the
//!   perception-query surface.  Always listening; authoritative while the
//!   bridge path is down.
//! - [`degrade::LinkMonitor`] – the two-state degradation controller that
//!   decides which of the two is authoritative, based on a liveness window
//!   over successful brain exchanges.

pub mod degrade;
pub mod fallback;
pub mod inbox;
pub mod security;
pub mod server;

pub use degrade::{LinkMonitor, LinkState};
pub use fallback::FallbackServer;
pub use inbox::VoiceInbox;
pub use security::{SecurityConfig, SecurityLayer};
pub use server::{AppState, BridgeServer};
