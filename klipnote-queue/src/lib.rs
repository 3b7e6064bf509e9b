//! Broker Queues (spec §4.2) and the Model Router (spec §4.3).

pub mod broker;
pub mod router;

pub use broker::{Broker, LeasedEntry, QueueEntry, QueueEvent};
pub use router::route;
