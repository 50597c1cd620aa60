use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use patterncore_model::ScheduledMessage;
use tracing::warn;

use crate::sender::Sender;

/// Fans scheduled messages out to the `Sender` registered for each
/// destination id, grouping a batch by destination before dispatch so a
/// sender never sees messages meant for another one.
///
/// Registration is rare (at startup, or when a client repoints a
/// destination), dispatch is the hot path — a coarse `RwLock` read lock is
/// cheap enough here since the map itself is never touched mid-tick.
pub struct Router {
    senders: RwLock<HashMap<String, Arc<dyn Sender>>>,
    unknown_logged: RwLock<std::collections::HashSet<String>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            unknown_logged: RwLock::new(std::collections::HashSet::new()),
        }
    }

    pub fn register(&self, destination_id: impl Into<String>, sender: Arc<dyn Sender>) {
        let destination_id = destination_id.into();
        self.unknown_logged.write().remove(&destination_id);
        self.senders.write().insert(destination_id, sender);
    }

    pub fn unregister(&self, destination_id: &str) -> Option<Arc<dyn Sender>> {
        self.senders.write().remove(destination_id)
    }

    pub fn destinations(&self) -> Vec<String> {
        self.senders.read().keys().cloned().collect()
    }

    /// Groups `messages` by destination and dispatches each group to its
    /// registered sender. A destination with no registered sender is
    /// dropped and logged once per unique id — repeated misses in the same
    /// run do not re-log, so a step firing every beat doesn't flood the log.
    pub fn dispatch(&self, messages: &[ScheduledMessage]) {
        if messages.is_empty() {
            return;
        }
        let mut grouped: HashMap<&str, Vec<ScheduledMessage>> = HashMap::new();
        for message in messages {
            grouped
                .entry(message.destination_id.as_str())
                .or_default()
                .push(message.clone());
        }

        let senders = self.senders.read();
        for (destination_id, batch) in grouped {
            match senders.get(destination_id) {
                Some(sender) => sender.send_batch(&batch),
                None => self.warn_unknown_once(destination_id),
            }
        }
    }

    fn warn_unknown_once(&self, destination_id: &str) {
        let mut logged = self.unknown_logged.write();
        if logged.insert(destination_id.to_string()) {
            warn!(destination = %destination_id, "no sender registered for destination, dropping messages");
        }
    }

    pub fn close_all(&self) {
        for sender in self.senders.read().values() {
            sender.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSender {
        count: AtomicUsize,
    }

    impl Sender for CountingSender {
        fn send_batch(&self, messages: &[ScheduledMessage]) {
            self.count.fetch_add(messages.len(), Ordering::SeqCst);
        }
        fn close(&self) {}
        fn name(&self) -> &str {
            "counting"
        }
    }

    fn message(destination_id: &str) -> ScheduledMessage {
        ScheduledMessage {
            destination_id: destination_id.into(),
            cycle: 0.0,
            step: 0,
            params: json!({}).as_object().unwrap().clone(),
        }
    }

    #[test]
    fn dispatch_groups_messages_by_destination() {
        let router = Router::new();
        let kick = Arc::new(CountingSender {
            count: AtomicUsize::new(0),
        });
        let snare = Arc::new(CountingSender {
            count: AtomicUsize::new(0),
        });
        router.register("kick", kick.clone());
        router.register("snare", snare.clone());

        router.dispatch(&[message("kick"), message("kick"), message("snare")]);

        assert_eq!(kick.count.load(Ordering::SeqCst), 2);
        assert_eq!(snare.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_to_unknown_destination_does_not_panic() {
        let router = Router::new();
        router.dispatch(&[message("nonexistent")]);
        router.dispatch(&[message("nonexistent")]);
    }

    #[test]
    fn unregister_removes_sender() {
        let router = Router::new();
        let sender = Arc::new(CountingSender {
            count: AtomicUsize::new(0),
        });
        router.register("kick", sender);
        assert!(router.unregister("kick").is_some());
        assert!(router.destinations().is_empty());
    }
}
