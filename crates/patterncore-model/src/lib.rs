//! Session data model and IR deserializer.
//!
//! All entities here are immutable after construction; "updates" produce
//! new values which replace the prior ones atomically at an apply
//! boundary. See [`error::ModelError`] for the validation errors this
//! crate raises.

pub mod apply;
pub mod batch;
pub mod environment;
pub mod error;
pub mod event;
pub mod mixer;
pub mod scene;
pub mod session;
pub mod track;

pub use apply::{ApplyCommand, ApplyTiming};
pub use batch::{ScheduledMessage, ScheduledMessageBatch};
pub use environment::{Environment, LOOP_STEPS};
pub use error::{ModelError, Result};
pub use event::{Event, EventSequence};
pub use mixer::MixerLine;
pub use scene::Scene;
pub use session::{parse_session_document, Session, SessionDocument};
pub use track::{AudioTrack, AudioTrackMeta, AudioTrackParams, FxBundle, MidiTrack, Modulation, Send};
