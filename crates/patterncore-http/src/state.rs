use std::sync::Arc;
use std::time::Instant;

use patterncore_engine::LoopEngine;
use patterncore_router::{MidiSender, Router};
use patterncore_sse::SseBroker;
use patterncore_store::{ClientStore, MessageStore};

/// Everything a handler needs, cloned cheaply (every field is an `Arc` or
/// `Copy`) into each request's extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LoopEngine>,
    pub store: Arc<MessageStore>,
    pub clients: Arc<ClientStore>,
    pub router: Arc<Router>,
    pub midi: Arc<MidiSender>,
    pub broker: Arc<SseBroker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
