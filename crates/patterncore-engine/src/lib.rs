//! The loop engine: transport state machine, anchor-based step/clock
//! scheduling, note-off bookkeeping, the deferred apply boundary, and the
//! extension hook surfaces, wired together in [`engine::LoopEngine`].

pub mod apply;
pub mod clockgen;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod extensions;
pub mod fsm;
pub mod lowering;
pub mod noteoff;
pub mod patch;
pub mod position;
pub mod status;

pub use apply::{ApplyScheduler, ChangeKind, PendingChange, PendingStatus, PendingSummary};
pub use clockgen::ClockGenerator;
pub use dispatch::{DeferredAction, DispatchScheduler};
pub use engine::{EngineTasks, LoopEngine};
pub use error::{EngineError, Result};
pub use extensions::{BeforeSendFn, ExtensionPipeline, TransformError, TransformFn};
pub use fsm::{EngineState, TransitionResult, TransportEvent, TransportFsm};
pub use noteoff::NoteOffScheduler;
pub use position::{AnchorClock, Position};
pub use status::StatusSnapshot;
