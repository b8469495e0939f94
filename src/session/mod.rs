//! Drone session
//!
//! `DroneSession` wires the command channel, response listener and video
//! decoder together. `SessionState` is the consumer side they deliver to.

mod drone;
mod state;

pub use drone::{DroneSession, SymbolError};
pub use state::{ResponseObserver, SessionState, StatusLevel, StatusLine};
