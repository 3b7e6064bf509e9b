//! Shared request-handler state (spec §10): one clone-cheap bundle wired
//! once in `klipnote-server`'s `main.rs` and handed to every handler,
//! mirroring the teacher's `DogAxumState` (`dog-axum::state`).

use klipnote_core::ConfigSnapshot;
use klipnote_media::LocalMediaStore;
use klipnote_queue::Broker;
use klipnote_store::MemoryJobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: MemoryJobStore,
    pub broker: Broker,
    pub media: LocalMediaStore,
    pub config: ConfigSnapshot,
}
