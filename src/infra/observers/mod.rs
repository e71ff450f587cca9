//! Observer transports for the event broadcaster.

pub mod memory;
#[cfg(feature = "ws")]
pub mod ws;

pub use memory::ObserverHub;
#[cfg(feature = "ws")]
pub use ws::serve_websocket;
