//! Actor-based notification intake
//!
//! Each actor runs as an independent async task and is controlled through a
//! cloneable handle that sends commands over an mpsc channel.
//!
//! ## Actor Types
//!
//! - **TrapReceiverActor**: Owns the SNMP trap socket and the alert source
//!   table, authenticates notifications and hands them to the alert processor
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for queries (`GetStats`)

pub mod messages;
pub mod trap_receiver;

pub use messages::{TrapCommand, TrapStats};
pub use trap_receiver::{TrapReceiverActor, TrapReceiverHandle};
