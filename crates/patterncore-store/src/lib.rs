//! Message store, per-step lookup, and client metadata store.

pub mod clients;
pub mod error;
pub mod loaded;
pub mod store;

pub use clients::{ClientRecord, ClientStore, UpsertOutcome};
pub use error::{Result, StoreError};
pub use loaded::LoadedSession;
pub use store::MessageStore;
