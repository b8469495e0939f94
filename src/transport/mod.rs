//! UDP transport to and from the drone
//!
//! This module handles:
//! - Sending text commands as single datagrams to the drone
//! - Listening for the drone's replies on a separately bound port
//! - Handing each reply to the consumer through the dispatcher

mod command_channel;
mod listener;

pub use command_channel::{ChannelError, CommandChannel};
pub use listener::{ListenerError, ResponseListener, ResponseSink};
