//! Shared error taxonomy, configuration, and cross-cutting identifiers for
//! every KlipNote crate. Nothing in this crate knows about queues, storage
//! backends, or HTTP; it's the common dependency every other crate in the
//! workspace sits on top of.

pub mod config;
pub mod error;
pub mod ids;
pub mod model;

pub use config::{Config, ConfigSnapshot};
pub use error::{ErrorKind, KlipError, KlipResult};
pub use ids::{JobId, LeaseToken};
pub use model::Model;
