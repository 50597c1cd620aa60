use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::event::SseEvent;

/// Default per-subscriber queue capacity (spec default: 256).
pub const DEFAULT_CAPACITY: usize = 256;

/// Consecutive publish failures (queue-full events) before a subscriber is
/// dropped outright. A single burst of lag is tolerated; a subscriber that
/// never catches up is disconnected.
const LAG_DISCONNECT_THRESHOLD: u32 = 8;

struct Subscriber {
    tx: mpsc::Sender<SseEvent>,
    consecutive_lag: AtomicU32,
}

/// Fan-out publisher. Each subscriber owns a bounded queue; a publish that
/// would overflow a subscriber's queue drops the *new* event and substitutes
/// a `lag` marker instead (mpsc has no "evict oldest" primitive, so we evict
/// the incoming event rather than reach into the queue) — the subscriber
/// still learns it missed something, even though the specific event is gone.
pub struct SseBroker {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl SseBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Registers a new subscriber and returns a receiver for its queue.
    /// Dropping the returned [`Subscription`] unregisters it.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().insert(
            id,
            Subscriber {
                tx,
                consecutive_lag: AtomicU32::new(0),
            },
        );
        Subscription {
            id,
            broker: Arc::clone(self),
            rx,
        }
    }

    /// Publishes `event` to every live subscriber. A subscriber whose queue
    /// is full gets a `lag` marker instead (best-effort — if even that
    /// can't be enqueued, the subscriber is simply further behind). A
    /// subscriber that has lagged too many times in a row is disconnected.
    pub fn publish(&self, event: SseEvent) {
        let mut to_drop = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (&id, sub) in subscribers.iter() {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => {
                        sub.consecutive_lag.store(0, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        let lag = sub.consecutive_lag.fetch_add(1, Ordering::Relaxed) + 1;
                        let _ = sub.tx.try_send(SseEvent::Lag { dropped: lag as u64 });
                        if lag >= LAG_DISCONNECT_THRESHOLD {
                            warn!(subscriber = id, "sse subscriber disconnected after repeated lag");
                            to_drop.push(id);
                        }
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        to_drop.push(id);
                    }
                }
            }
        }
        if !to_drop.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in to_drop {
                subscribers.remove(&id);
            }
        }
    }
}

impl Default for SseBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A live subscription. The underlying receiver is a plain `mpsc::Receiver`
/// — callers poll it directly (e.g. wrapped as a `Stream` via
/// `tokio_stream::wrappers::ReceiverStream` at the HTTP boundary).
pub struct Subscription {
    id: u64,
    broker: Arc<SseBroker>,
    rx: mpsc::Receiver<SseEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<SseEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.subscribers.write().remove(&self.id);
        debug!(subscriber = self.id, "sse subscriber removed");
    }
}

/// Polls the subscriber's own queue directly, so a stream built from a
/// `Subscription` (e.g. an SSE response body) keeps the `Drop` guard alive
/// for its whole lifetime — unregistration on client disconnect falls out
/// of the stream simply being dropped, no separate teardown path needed.
impl Stream for Subscription {
    type Item = SseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_subscriber_in_order() {
        let broker = Arc::new(SseBroker::new(4));
        let mut sub = broker.subscribe();
        broker.publish(SseEvent::Heartbeat);
        broker.publish(SseEvent::Position { step: 1, beat: 0, bar: 0 });
        assert_eq!(sub.recv().await.unwrap().name(), "heartbeat");
        assert_eq!(sub.recv().await.unwrap().name(), "position");
    }

    #[tokio::test]
    async fn full_queue_yields_lag_marker_instead_of_new_event() {
        let broker = Arc::new(SseBroker::new(1));
        let sub = broker.subscribe();
        broker.publish(SseEvent::Heartbeat); // fills the one slot
        broker.publish(SseEvent::Heartbeat); // queue full -> lag marker attempt
        // The lag marker itself also can't fit (capacity 1, already full),
        // so the subscriber simply stays a beat behind; no panic either way.
        drop(sub);
    }

    #[tokio::test]
    async fn repeated_lag_disconnects_subscriber() {
        let broker = Arc::new(SseBroker::new(1));
        let sub = broker.subscribe();
        for _ in 0..(LAG_DISCONNECT_THRESHOLD + 2) {
            broker.publish(SseEvent::Heartbeat);
        }
        assert_eq!(broker.subscriber_count(), 0);
        drop(sub);
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_it() {
        let broker = Arc::new(SseBroker::new(4));
        let sub = broker.subscribe();
        assert_eq!(broker.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broker.subscriber_count(), 0);
    }
}
