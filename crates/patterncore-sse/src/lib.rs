//! Fan-out publisher for server-sent events, with bounded per-subscriber
//! queues and lag/disconnect handling.

pub mod broker;
pub mod event;

pub use broker::{SseBroker, Subscription, DEFAULT_CAPACITY};
pub use event::SseEvent;
