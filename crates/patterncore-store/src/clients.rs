use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub metadata: Value,
    pub updated_at: Instant,
}

/// What happened as a result of an [`ClientStore::upsert`] call — the
/// caller uses this to decide which SSE event to publish (`client_connected`
/// vs `client_metadata_updated`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Connected,
    Updated,
}

/// Per-client free-form JSON plus a monotonic update timestamp. The core
/// never inspects `metadata` — it is opaque, full-replacement state.
#[derive(Default)]
pub struct ClientStore {
    clients: RwLock<HashMap<String, ClientRecord>>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, client_id: &str, metadata: Value) -> UpsertOutcome {
        let mut clients = self.clients.write();
        let outcome = if clients.contains_key(client_id) {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Connected
        };
        clients.insert(
            client_id.to_string(),
            ClientRecord {
                metadata,
                updated_at: Instant::now(),
            },
        );
        outcome
    }

    pub fn get(&self, client_id: &str) -> Result<ClientRecord> {
        self.clients
            .read()
            .get(client_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownClient(client_id.to_string()))
    }

    pub fn get_all(&self) -> HashMap<String, ClientRecord> {
        self.clients.read().clone()
    }

    pub fn delete(&self, client_id: &str) -> Result<()> {
        self.clients
            .write()
            .remove(client_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownClient(client_id.to_string()))
    }

}
