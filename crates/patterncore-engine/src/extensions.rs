use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use patterncore_model::ScheduledMessage;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("extension `{extension}` failed: {detail}")]
pub struct TransformError {
    pub extension: String,
    pub detail: String,
}

pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;
pub type BeforeSendFn =
    Arc<dyn Fn(Vec<ScheduledMessage>, f64, u16) -> Vec<ScheduledMessage> + Send + Sync>;

/// Don't re-log a `before_send` failure more than once per window — the
/// hook runs on every tick, so a persistently-broken extension would
/// otherwise flood the log at tick rate.
const BEFORE_SEND_LOG_WINDOW: Duration = Duration::from_secs(2);

struct Registered<F> {
    name: String,
    f: F,
}

/// The two stable hook surfaces the engine exposes to extensions:
/// `transform` on session load (sequential, registration order, any error
/// aborts the load) and `before_send` on the hot per-tick path (must be
/// pure and fast; a panic or logical error falls back to the unmodified
/// messages).
#[derive(Default)]
pub struct ExtensionPipeline {
    transforms: RwLock<Vec<Registered<TransformFn>>>,
    before_sends: RwLock<Vec<Registered<BeforeSendFn>>>,
    last_before_send_log: Mutex<Option<Instant>>,
}

impl ExtensionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_transform(&self, name: impl Into<String>, f: TransformFn) {
        self.transforms.write().push(Registered {
            name: name.into(),
            f,
        });
    }

    pub fn register_before_send(&self, name: impl Into<String>, f: BeforeSendFn) {
        self.before_sends.write().push(Registered {
            name: name.into(),
            f,
        });
    }

    /// Runs every registered `transform` in registration order. The first
    /// failure aborts the whole pipeline — the caller must leave the prior
    /// session untouched.
    pub fn transform(&self, mut payload: Value) -> Result<Value, TransformError> {
        for reg in self.transforms.read().iter() {
            payload = (reg.f)(payload).map_err(|detail| TransformError {
                extension: reg.name.clone(),
                detail,
            })?;
        }
        Ok(payload)
    }

    /// Runs every registered `before_send` in registration order, feeding
    /// each hook's output into the next. A hook that panics or is skipped
    /// due to a prior panic in the chain leaves `messages` as they were
    /// entering that hook.
    pub fn before_send(&self, messages: Vec<ScheduledMessage>, bpm: f64, step: u16) -> Vec<ScheduledMessage> {
        let mut messages = messages;
        for reg in self.before_sends.read().iter() {
            let input = messages.clone();
            let name = reg.name.clone();
            let result = catch_unwind(AssertUnwindSafe(|| (reg.f)(input.clone(), bpm, step)));
            match result {
                Ok(output) => messages = output,
                Err(_) => {
                    self.log_before_send_failure(&name);
                    messages = input;
                }
            }
        }
        messages
    }

    fn log_before_send_failure(&self, extension: &str) {
        let mut last = self.last_before_send_log.lock();
        let now = Instant::now();
        let should_log = last.map(|t| now.duration_since(t) >= BEFORE_SEND_LOG_WINDOW).unwrap_or(true);
        if should_log {
            warn!(extension, "before_send hook panicked, falling back to unmodified messages");
            *last = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transform_runs_in_registration_order() {
        let pipeline = ExtensionPipeline::new();
        pipeline.register_transform(
            "add-a",
            Arc::new(|v: Value| {
                let mut v = v;
                v["a"] = json!(1);
                Ok(v)
            }),
        );
        pipeline.register_transform(
            "add-b",
            Arc::new(|v: Value| {
                let mut v = v;
                v["b"] = json!(2);
                Ok(v)
            }),
        );
        let out = pipeline.transform(json!({})).unwrap();
        assert_eq!(out, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn transform_error_aborts_with_extension_name() {
        let pipeline = ExtensionPipeline::new();
        pipeline.register_transform("broken", Arc::new(|_: Value| Err("nope".to_string())));
        let err = pipeline.transform(json!({})).unwrap_err();
        assert_eq!(err.extension, "broken");
    }

    #[test]
    fn before_send_falls_back_on_panic() {
        let pipeline = ExtensionPipeline::new();
        pipeline.register_before_send(
            "panics",
            Arc::new(|_msgs, _bpm, _step| panic!("boom")),
        );
        let msgs = vec![ScheduledMessage {
            destination_id: "kick".into(),
            cycle: 0.0,
            step: 0,
            params: serde_json::Map::new(),
        }];
        let out = pipeline.before_send(msgs.clone(), 120.0, 0);
        assert_eq!(out, msgs);
    }
}
