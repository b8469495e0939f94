//! Cross-thread hand-off to the consumer context
//!
//! Background tasks (response listener, frame reader) never touch
//! consumer state directly. They enqueue closures here, and the consumer
//! runs them against its own state once per tick.

mod dispatcher;

pub use dispatcher::{DispatchHandle, DispatchTask, Dispatcher};
