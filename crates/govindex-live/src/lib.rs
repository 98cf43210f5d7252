//! govindex-live: live governance indexing over the TzKT events hub.
//!
//! - [`signalr`]: SignalR JSON protocol framing and message parsing
//! - [`LiveListener`]: connection lifecycle, subscriptions and reconnects
//! - [`LiveHandler`]: period rollover and per-operation classification

pub mod listener;
pub mod signalr;

pub use listener::{ListenerState, LiveConfig, LiveHandler, LiveListener};
pub use signalr::HubEvent;
