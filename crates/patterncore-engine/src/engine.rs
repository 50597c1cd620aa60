use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use patterncore_model::{ApplyTiming, MidiTrack, ScheduledMessage, Session, LOOP_STEPS};
use patterncore_router::{MidiSender, Router};
use patterncore_sse::{SseBroker, SseEvent};
use patterncore_store::MessageStore;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{error, warn};

use crate::apply::{ApplyScheduler, ChangeKind, PendingSummary};
use crate::clockgen::ClockGenerator;
use crate::dispatch::{DeferredAction, DispatchScheduler};
use crate::error::{EngineError, Result};
use crate::extensions::ExtensionPipeline;
use crate::fsm::{EngineState, TransportEvent, TransportFsm};
use crate::lowering;
use crate::noteoff::NoteOffScheduler;
use crate::patch::{apply_environment_patch, apply_track_patch};
use crate::position::{AnchorClock, Position};
use crate::status::{state_name, StatusSnapshot};

/// Tick-body panics tolerated within [`TICK_ERROR_WINDOW`] before the
/// transport is forced to `Stopped` and an `error` SSE event is raised. A
/// single bad extension or malformed session shouldn't take the server
/// down; a persistently crashing one should stop making noise.
const MAX_TICK_ERRORS: u32 = 10;
const TICK_ERROR_WINDOW: Duration = Duration::from_secs(5);

/// How often the step task polls while stopped/paused, and the note-off
/// task's poll granularity while the transport runs.
const IDLE_POLL: Duration = Duration::from_millis(5);
const NOTEOFF_POLL: Duration = Duration::from_millis(1);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

struct EngineInner {
    fsm: TransportFsm,
    /// Absolute, never-wrapping step count since this play session started
    /// (reset to 0 on `start`/`stop`, untouched by `pause`). The in-lap grid
    /// position is always `elapsed % LOOP_STEPS` — see [`Self::step`]. Kept
    /// unwrapped so [`AnchorClock`] never has to re-derive which lap a given
    /// step belongs to.
    elapsed: u64,
    anchor: AnchorClock,
    clock_gen: ClockGenerator,
    current_scene: Option<String>,
    error_count: u32,
    error_window_start: Instant,
}

impl EngineInner {
    fn step(&self) -> u16 {
        (self.elapsed % LOOP_STEPS as u64) as u16
    }
}

/// The central orchestrator: owns transport state and drives the
/// cooperative step/clock/note-off/apply/heartbeat tasks described in the
/// concurrency model. All mutable transport state (fsm, cursor, anchor,
/// clock generator) lives behind a single `parking_lot::Mutex` — contention
/// is negligible since only the step task writes it on the hot path, and
/// HTTP-triggered transport changes are rare by comparison.
pub struct LoopEngine {
    store: Arc<MessageStore>,
    router: Arc<Router>,
    midi: Arc<MidiSender>,
    broker: Arc<SseBroker>,
    apply: ApplyScheduler,
    extensions: ExtensionPipeline,
    noteoff: NoteOffScheduler,
    dispatch: DispatchScheduler,
    inner: Mutex<EngineInner>,
    cursor_tx: watch::Sender<u16>,
    cursor_rx: watch::Receiver<u16>,
}

/// Handles to the engine's background tasks, kept so the caller can abort
/// them on shutdown (or simply drop, which detaches them).
pub struct EngineTasks {
    pub step: tokio::task::JoinHandle<()>,
    pub clock: tokio::task::JoinHandle<()>,
    pub noteoff: tokio::task::JoinHandle<()>,
    pub apply: tokio::task::JoinHandle<()>,
    pub heartbeat: tokio::task::JoinHandle<()>,
}

impl LoopEngine {
    pub fn new(
        store: Arc<MessageStore>,
        router: Arc<Router>,
        midi: Arc<MidiSender>,
        broker: Arc<SseBroker>,
    ) -> Arc<Self> {
        let (cursor_tx, cursor_rx) = watch::channel(0u16);
        Arc::new(Self {
            store,
            router,
            midi,
            broker,
            apply: ApplyScheduler::new(),
            extensions: ExtensionPipeline::new(),
            noteoff: NoteOffScheduler::new(),
            dispatch: DispatchScheduler::new(),
            inner: Mutex::new(EngineInner {
                fsm: TransportFsm::new(),
                elapsed: 0,
                anchor: AnchorClock::new(Instant::now(), 120.0),
                clock_gen: ClockGenerator::new(120.0),
                current_scene: None,
                error_count: 0,
                error_window_start: Instant::now(),
            }),
            cursor_tx,
            cursor_rx,
        })
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn midi(&self) -> &Arc<MidiSender> {
        &self.midi
    }

    pub fn broker(&self) -> &Arc<SseBroker> {
        &self.broker
    }

    pub fn extensions(&self) -> &ExtensionPipeline {
        &self.extensions
    }

    pub fn pending_changes(&self) -> Vec<PendingSummary> {
        self.apply.pending()
    }

    pub fn cancel_change(&self, id: &str) -> Result<()> {
        if self.apply.cancel(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownChange(id.to_string()))
        }
    }

    pub fn cancel_all_changes(&self) {
        self.apply.cancel_all();
    }

    /// Spawns the five cooperative tasks. Dropping every handle in
    /// [`EngineTasks`] (or aborting them explicitly) is the only way to stop
    /// them; they otherwise run for the lifetime of the process.
    pub fn spawn(self: &Arc<Self>) -> EngineTasks {
        EngineTasks {
            step: tokio::spawn(Arc::clone(self).step_loop()),
            clock: tokio::spawn(Arc::clone(self).clock_loop()),
            noteoff: tokio::spawn(Arc::clone(self).noteoff_loop()),
            apply: tokio::spawn(Arc::clone(self).apply_loop()),
            heartbeat: tokio::spawn(Arc::clone(self).heartbeat_loop()),
        }
    }

    // ---- transport control ----------------------------------------------

    pub fn start(&self) {
        let bpm = self.store.session().session.environment.bpm;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.fsm.transition(TransportEvent::Start) {
            crate::fsm::TransitionResult::StartedFresh => {
                inner.elapsed = 0;
                inner.anchor = AnchorClock::new(now, bpm);
                inner.clock_gen.start(now, bpm);
                drop(inner);
                self.midi.send_start();
                let _ = self.cursor_tx.send(0);
            }
            crate::fsm::TransitionResult::Resumed => {
                inner.anchor.reanchor(now, inner.elapsed);
                inner.clock_gen.start(now, bpm);
                drop(inner);
                self.midi.send_continue();
            }
            _ => return,
        }
        self.publish_status();
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.fsm.transition(TransportEvent::Stop) == crate::fsm::TransitionResult::None {
            return;
        }
        inner.elapsed = 0;
        inner.clock_gen.stop();
        inner.current_scene = None;
        drop(inner);
        let _ = self.cursor_tx.send(0);
        for (channel, note) in self.noteoff.flush_all() {
            self.midi.send_note_off(channel, note);
        }
        self.midi.send_stop();
        self.publish_status();
    }

    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.fsm.transition(TransportEvent::Pause) == crate::fsm::TransitionResult::None {
            return;
        }
        inner.clock_gen.stop();
        drop(inner);
        self.publish_status();
    }

    /// All-notes-off plus MIDI Stop, without touching transport state.
    pub fn panic(&self) {
        self.noteoff.flush_all();
        self.midi.panic();
    }

    pub fn status(&self) -> StatusSnapshot {
        let loaded = self.store.session();
        let inner = self.inner.lock();
        StatusSnapshot {
            playing: inner.fsm.state() == EngineState::Playing,
            playback_state: state_name(inner.fsm.state()),
            bpm: loaded.session.environment.bpm,
            position: Position::from_step(inner.step()),
            active_tracks: self.store.active_track_ids().into_iter().collect(),
            has_pending: self.apply.has_pending(),
            scenes: self.store.scenes(),
            current_scene: inner.current_scene.clone(),
        }
    }

    fn publish_status(&self) {
        let snapshot = self.status();
        self.broker.publish(SseEvent::Status {
            state: snapshot.playback_state.to_string(),
            bpm: snapshot.bpm,
        });
    }

    /// The step about to begin — the only correct `from_step` to hand the
    /// apply scheduler (see [`ApplyScheduler::schedule`]).
    fn next_step(&self) -> u16 {
        self.inner.lock().step() + 1
    }

    // ---- deferred changes -------------------------------------------------

    /// Schedules `session` for installation. `step_loop` only advances the
    /// cursor while the transport is `Playing` (see its `fsm.state() !=
    /// Playing` guard), so a `Beat`/`Bar`/`Seq` boundary requested while
    /// `Stopped` or `Paused` would otherwise sit in the queue forever —
    /// there's no clock to honor it against. In that case the session is
    /// installed immediately, as if it had been requested with `now` timing.
    pub fn load_session(&self, session: Session, timing: ApplyTiming) -> String {
        let state = self.inner.lock().fsm.state();
        if state == EngineState::Playing {
            let from_step = self.next_step();
            self.apply
                .schedule(ChangeKind::Session(Box::new(session)), timing, from_step, vec![])
        } else {
            let step = self.inner.lock().step();
            let id = self
                .apply
                .schedule(ChangeKind::Session(Box::new(session)), ApplyTiming::Now, step, vec![]);
            self.integrate_due(step);
            id
        }
    }

    pub fn patch_environment(&self, patch: Value, timing: ApplyTiming) -> String {
        let from_step = self.next_step();
        self.apply
            .schedule(ChangeKind::Environment(patch), timing, from_step, vec![])
    }

    pub fn patch_track_params(
        &self,
        track_id: String,
        patch: Value,
        timing: ApplyTiming,
    ) -> Result<String> {
        if !self.store.active_track_ids().contains(&track_id) {
            return Err(EngineError::UnknownTrack(track_id));
        }
        let from_step = self.next_step();
        let mut patches = HashMap::new();
        patches.insert(track_id.clone(), patch);
        Ok(self
            .apply
            .schedule(ChangeKind::TrackParams(patches), timing, from_step, vec![track_id]))
    }

    pub fn activate_scene(&self, scene_name: String, timing: ApplyTiming) -> Result<String> {
        if !self.store.scenes().contains(&scene_name) {
            return Err(EngineError::UnknownScene(scene_name));
        }
        let from_step = self.next_step();
        Ok(self
            .apply
            .schedule(ChangeKind::Scene(scene_name), timing, from_step, vec![]))
    }

    /// Immediate (non-apply-boundary) mute/solo toggles: callers expect the
    /// very next step to reflect them, not a beat/bar away.
    pub fn set_mute(&self, track_id: &str, mute: bool) -> Result<()> {
        self.mutate_track(track_id, |audio, midi| {
            if let Some(t) = audio {
                t.meta.mute = mute;
            } else if let Some(t) = midi {
                t.mute = mute;
            }
        })
    }

    pub fn set_solo(&self, track_id: &str, solo: bool) -> Result<()> {
        self.mutate_track(track_id, |audio, midi| {
            if let Some(t) = audio {
                t.meta.solo = solo;
            } else if let Some(t) = midi {
                t.solo = solo;
            }
        })
    }

    fn mutate_track(
        &self,
        track_id: &str,
        f: impl FnOnce(Option<&mut patterncore_model::AudioTrack>, Option<&mut MidiTrack>),
    ) -> Result<()> {
        let loaded = self.store.session();
        let mut session = loaded.session.clone();
        if !session.tracks.contains_key(track_id) && !session.tracks_midi.contains_key(track_id) {
            return Err(EngineError::UnknownTrack(track_id.to_string()));
        }
        f(session.tracks.get_mut(track_id), session.tracks_midi.get_mut(track_id));
        self.store.load(session);
        self.broker.publish(SseEvent::Tracks {
            active_track_ids: self.store.active_track_ids().into_iter().collect(),
        });
        Ok(())
    }

    // ---- one-shot triggers -------------------------------------------------

    /// Fires an OSC message immediately, bypassing the loop grid entirely.
    pub fn trigger_osc(&self, destination_id: &str, params: Value) {
        let params = params.as_object().cloned().unwrap_or_default();
        let message = ScheduledMessage {
            destination_id: destination_id.to_string(),
            cycle: 0.0,
            step: 0,
            params,
        };
        self.router.dispatch(&[message]);
    }

    /// Fires a MIDI note immediately, scheduling its note-off `duration_ms`
    /// later, bypassing the loop grid entirely.
    pub fn trigger_midi(&self, channel: u8, note: u8, velocity: u8, duration_ms: u64) {
        self.midi.send_note_on(channel, note, velocity);
        self.noteoff
            .schedule(channel, note, Instant::now() + Duration::from_millis(duration_ms));
    }

    // ---- background tasks ---------------------------------------------------

    async fn step_loop(self: Arc<Self>) {
        loop {
            let planned = {
                let inner = self.inner.lock();
                if inner.fsm.state() != EngineState::Playing {
                    None
                } else {
                    let next_elapsed = inner.elapsed + 1;
                    let next_step = (next_elapsed % LOOP_STEPS as u64) as u16;
                    let swing = self.store.session().session.environment.swing;
                    let target = inner.anchor.target_time_with_swing(next_elapsed, swing);
                    Some((next_elapsed, next_step, target))
                }
            };
            let Some((next_elapsed, next_step, target)) = planned else {
                sleep(IDLE_POLL).await;
                continue;
            };

            sleep_until(target).await;

            {
                let mut inner = self.inner.lock();
                if inner.fsm.state() != EngineState::Playing {
                    continue;
                }
                inner.elapsed = next_elapsed;
            }
            let _ = self.cursor_tx.send(next_step);

            let engine = Arc::clone(&self);
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                engine.dispatch_step(next_step, target);
            }));
            if result.is_err() {
                self.record_tick_error("step dispatch");
            }
        }
    }

    async fn clock_loop(self: Arc<Self>) {
        loop {
            let due = {
                let mut inner = self.inner.lock();
                if inner.fsm.state() != EngineState::Playing {
                    None
                } else {
                    inner.clock_gen.next_due(Instant::now())
                }
            };
            let Some(due) = due else {
                sleep(IDLE_POLL).await;
                continue;
            };
            sleep_until(due).await;
            let still_playing = self.inner.lock().fsm.state() == EngineState::Playing;
            if still_playing {
                self.midi.send_clock();
            }
        }
    }

    /// Drains both the note-off queue and the swing/offset-shifted dispatch
    /// queue on the same poll. Folding the two together keeps every
    /// sub-step-deferred action on one cooperative task rather than adding
    /// a sixth one to the five the concurrency model names.
    async fn noteoff_loop(self: Arc<Self>) {
        loop {
            sleep(NOTEOFF_POLL).await;
            let now = Instant::now();
            for (channel, note) in self.noteoff.tick(now) {
                self.midi.send_note_off(channel, note);
            }
            let mut due_osc = Vec::new();
            for action in self.dispatch.tick(now) {
                match action {
                    DeferredAction::Osc(msg) => due_osc.push(msg),
                    DeferredAction::MidiNoteOn { channel, note, velocity, off_delay } => {
                        self.midi.send_note_on(channel, note, velocity);
                        self.noteoff.schedule(channel, note, now + off_delay);
                    }
                }
            }
            if !due_osc.is_empty() {
                self.router.dispatch(&due_osc);
            }
        }
    }

    /// Watches the step cursor published by [`Self::step_loop`] and applies
    /// whatever became due at each new step. A dedicated task (rather than
    /// folding this into `step_loop` directly) matches the concurrency
    /// model's five-task shape; correctness doesn't depend on exact
    /// interleaving since [`ApplyScheduler`] and [`MessageStore`] are each
    /// independently safe for concurrent access.
    async fn apply_loop(self: Arc<Self>) {
        let mut rx = self.cursor_rx.clone();
        loop {
            if rx.changed().await.is_err() {
                return;
            }
            let step = *rx.borrow();
            self.integrate_due(step);
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        loop {
            sleep(HEARTBEAT_INTERVAL).await;
            self.broker.publish(SseEvent::Heartbeat);
            let position = {
                let inner = self.inner.lock();
                Position::from_step(inner.step())
            };
            self.broker.publish(SseEvent::Position {
                step: position.step,
                beat: position.beat,
                bar: position.bar,
            });
        }
    }

    fn record_tick_error(&self, context: &str) {
        let fatal = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            if now.duration_since(inner.error_window_start) > TICK_ERROR_WINDOW {
                inner.error_window_start = now;
                inner.error_count = 0;
            }
            inner.error_count += 1;
            let fatal = inner.error_count > MAX_TICK_ERRORS;
            if fatal {
                inner.fsm.transition(TransportEvent::Stop);
                inner.clock_gen.stop();
                inner.elapsed = 0;
            }
            fatal
        };
        error!(context, "tick error caught, engine resumed");
        if fatal {
            error!("too many tick errors within window, transport forced to stopped");
            self.broker.publish(SseEvent::Error {
                message: format!("engine stopped after repeated {context} failures"),
            });
            self.publish_status();
        }
    }

    /// Runs once per step: resolves solo/mute, runs `before_send`, and
    /// dispatches the result to OSC (via the [`Router`]) and MIDI (directly,
    /// since note-off bookkeeping needs the scheduler right here).
    fn dispatch_step(self: &Arc<Self>, step: u16, target: Instant) {
        let loaded = self.store.session();
        let session = &loaded.session;
        let bpm = session.environment.bpm;
        let step_duration = Duration::from_secs_f64(session.environment.step_duration_secs());

        let audible_audio = lowering::audible_audio_tracks(session);
        let audible_midi = lowering::audible_midi_tracks(session);

        let mut raw = self.store.get_messages_at(step);
        raw.retain(|m| {
            if session.tracks.contains_key(&m.destination_id) {
                audible_audio.contains(&m.destination_id)
            } else if session.tracks_midi.contains_key(&m.destination_id) {
                audible_midi.contains(&m.destination_id)
            } else {
                true
            }
        });

        let hooked = self.extensions.before_send(raw, bpm, step);
        let now = Instant::now();
        let mut immediate_osc = Vec::new();

        for mut msg in hooked {
            let offset_ms = msg
                .params
                .remove("_offset_ms")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let event_target = shifted_target(target, offset_ms, now);
            let gate = msg
                .params
                .get("gate")
                .and_then(Value::as_f64)
                .unwrap_or(session.environment.default_gate);

            if let Some(track) = session.tracks_midi.get(&msg.destination_id) {
                self.schedule_midi_message(track, &msg, event_target, gate, step_duration);
            } else if event_target <= now {
                immediate_osc.push(msg);
            } else {
                self.schedule_osc_message(msg, event_target);
            }
        }

        if !immediate_osc.is_empty() {
            self.router.dispatch(&immediate_osc);
        }
    }

    /// Enqueues `msg` for dispatch at `event_target` on the shared
    /// [`DispatchScheduler`], drained by `noteoff_loop`, instead of spawning
    /// a detached task per message — two events due at the same step keep
    /// firing in the order they were scheduled in (§5).
    fn schedule_osc_message(self: &Arc<Self>, msg: ScheduledMessage, event_target: Instant) {
        self.dispatch.schedule(event_target, DeferredAction::Osc(msg));
    }

    fn schedule_midi_message(
        self: &Arc<Self>,
        track: &MidiTrack,
        msg: &ScheduledMessage,
        event_target: Instant,
        gate: f64,
        step_duration: Duration,
    ) {
        let Some(note) = msg.params.get("note").and_then(Value::as_u64) else {
            return;
        };
        let channel = track.channel;
        let note = ((note as i64) + track.transpose as i64).clamp(0, 127) as u8;
        let velocity_frac = msg.params.get("velocity").and_then(Value::as_f64).unwrap_or(1.0);
        let velocity = (velocity_frac.clamp(0.0, 1.0) * 127.0).round() as u8;
        let off_delay = step_duration.mul_f64(gate.max(0.0));
        let now = Instant::now();

        if event_target <= now {
            self.midi.send_note_on(channel, note, velocity);
            self.noteoff.schedule(channel, note, now + off_delay);
        } else {
            self.dispatch.schedule(
                event_target,
                DeferredAction::MidiNoteOn { channel, note, velocity, off_delay },
            );
        }
    }

    /// Applies every [`crate::apply::PendingChange`] due at `step`, installs
    /// the result atomically via [`MessageStore::load`], and broadcasts the
    /// active-track-id set if it could have changed.
    fn integrate_due(&self, step: u16) {
        let due = self.apply.due(step);
        if due.is_empty() {
            return;
        }

        let loaded = self.store.session();
        let mut session = loaded.session.clone();
        let old_bpm = session.environment.bpm;
        let mut scene_activated: Option<String> = None;
        let mut replaced_session = false;

        for change in due {
            match change.kind {
                ChangeKind::Environment(patch) => {
                    if let Err(err) = apply_environment_patch(&mut session, patch) {
                        warn!(error = %err, "dropping malformed environment patch at apply boundary");
                    }
                }
                ChangeKind::TrackParams(patches) => {
                    for (track_id, patch) in patches {
                        if let Err(err) = apply_track_patch(&mut session, &track_id, patch) {
                            warn!(track_id, error = %err, "dropping malformed track patch at apply boundary");
                        }
                    }
                }
                ChangeKind::Session(new_session) => {
                    session = *new_session;
                    replaced_session = true;
                }
                ChangeKind::Scene(name) => match session.scenes.get(&name).cloned() {
                    Some(scene) => {
                        session.apply_scene(&scene);
                        scene_activated = Some(name);
                    }
                    None => warn!(scene = %name, "scene vanished before its apply boundary"),
                },
            }
        }

        session.rebuild_indices();
        if let Err(err) = session.validate() {
            error!(error = %err, "post-apply session failed validation, discarding this boundary's changes");
            return;
        }

        let new_bpm = session.environment.bpm;
        self.store.load(session);
        {
            let mut inner = self.inner.lock();
            if replaced_session {
                inner.current_scene = None;
            }
            if let Some(name) = scene_activated {
                inner.current_scene = Some(name);
            }
            // BPM change re-derives step duration and re-anchors at the
            // current step, preserving position (§4.5): `t0' = now -
            // current_step * new_step_duration`. The clock generator keeps
            // its own anchor and only recomputes its pulse interval (§4.4).
            if new_bpm != old_bpm && inner.fsm.state() == EngineState::Playing {
                let now = Instant::now();
                inner.anchor.set_bpm(new_bpm);
                inner.anchor.reanchor(now, inner.elapsed);
                inner.clock_gen.set_bpm(new_bpm);
            }
        }
        self.broker.publish(SseEvent::Tracks {
            active_track_ids: self.store.active_track_ids().into_iter().collect(),
        });
    }
}

/// Target time for `offset_ms` micro-timing relative to `base` (the step's
/// nominal, possibly-swung, target time). A negative offset that would
/// land before `now` clamps to `now` — the event fires immediately rather
/// than being scheduled into the past.
fn shifted_target(base: Instant, offset_ms: f64, now: Instant) -> Instant {
    let shifted = if offset_ms >= 0.0 {
        base + Duration::from_secs_f64(offset_ms / 1000.0)
    } else {
        let back = Duration::from_secs_f64(-offset_ms / 1000.0);
        base.checked_sub(back).unwrap_or(base)
    };
    shifted.max(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patterncore_model::{Environment, Event, EventSequence};

    fn test_engine() -> Arc<LoopEngine> {
        let store = Arc::new(MessageStore::default());
        let router = Arc::new(Router::new());
        let midi = Arc::new(MidiSender::new("test"));
        let broker = Arc::new(SseBroker::new(16));
        LoopEngine::new(store, router, midi, broker)
    }

    #[test]
    fn start_from_stopped_resets_cursor_and_resets_position() {
        let engine = test_engine();
        engine.start();
        let status = engine.status();
        assert!(status.playing);
        assert_eq!(status.position.step, 0);
    }

    #[test]
    fn stop_resets_cursor_and_clears_current_scene() {
        let engine = test_engine();
        engine.start();
        engine.stop();
        let status = engine.status();
        assert!(!status.playing);
        assert_eq!(status.position.step, 0);
    }

    #[test]
    fn patch_track_params_on_unknown_track_is_an_error() {
        let engine = test_engine();
        let err = engine.patch_track_params(
            "ghost".into(),
            serde_json::json!({}),
            ApplyTiming::Now,
        );
        assert!(matches!(err, Err(EngineError::UnknownTrack(_))));
    }

    #[test]
    fn set_mute_on_known_track_takes_effect_immediately() {
        let engine = test_engine();
        let mut session = Session {
            environment: Environment {
                bpm: 120.0,
                swing: 0.0,
                default_gate: 0.5,
                loop_steps: LOOP_STEPS,
                extra: Default::default(),
            },
            tracks: Default::default(),
            tracks_midi: Default::default(),
            mixer_lines: Default::default(),
            sequences: Default::default(),
            scenes: Default::default(),
            apply: None,
        };
        session.tracks.insert(
            "kick".into(),
            patterncore_model::AudioTrack {
                meta: patterncore_model::AudioTrackMeta {
                    track_id: "kick".into(),
                    mute: false,
                    solo: false,
                },
                params: patterncore_model::AudioTrackParams {
                    s: "bd".into(),
                    n: 0,
                    gain: 1.0,
                    pan: 0.5,
                    speed: 1.0,
                    begin: 0.0,
                    end: 1.0,
                    cut: None,
                    legato: None,
                    extra_params: Default::default(),
                },
                sends: vec![],
                modulations: Default::default(),
                fx: Default::default(),
                track_fx: Default::default(),
            },
        );
        engine.store.load(session);
        engine.set_mute("kick", true).unwrap();
        assert!(engine.store.session().session.tracks["kick"].meta.mute);
    }

    #[test]
    fn shifted_target_clamps_negative_offset_to_now() {
        let base = Instant::now() + Duration::from_millis(100);
        let now = Instant::now();
        let target = shifted_target(base, -1000.0, now);
        assert_eq!(target, now);
    }

    #[test]
    fn shifted_target_adds_positive_offset() {
        let base = Instant::now();
        let now = base;
        let target = shifted_target(base, 50.0, now);
        assert_eq!(target, base + Duration::from_millis(50));
    }

    #[test]
    fn integrate_due_applies_environment_patch_at_boundary() {
        let engine = test_engine();
        engine.patch_environment(serde_json::json!({"bpm": 140.0}), ApplyTiming::Now);
        engine.integrate_due(1);
        assert_eq!(engine.store.session().session.environment.bpm, 140.0);
    }

    /// A bpm patch must re-anchor the clock so later step targets actually
    /// reflect the new step duration, not just the stored environment value
    /// (the anchor and the session are separate pieces of state).
    #[test]
    fn integrate_due_reanchors_clock_on_bpm_change_while_playing() {
        let engine = test_engine();
        engine.start();
        {
            let mut inner = engine.inner.lock();
            // Mirrors `step_loop`, which advances `elapsed` to the new step
            // before `apply_loop` ever sees it on the cursor watch channel.
            inner.elapsed = 17;
        }
        engine.patch_environment(serde_json::json!({"bpm": 140.0}), ApplyTiming::Now);
        engine.integrate_due(17);
        let inner = engine.inner.lock();
        assert_eq!(inner.anchor.bpm(), 140.0);
        let expected_step_18 = inner.anchor.target_time(17) + inner.anchor.step_duration();
        assert_eq!(inner.anchor.target_time(18), expected_step_18);
    }

    #[test]
    fn dispatch_step_is_a_noop_on_an_empty_session() {
        let engine = test_engine();
        let now = Instant::now();
        engine.dispatch_step(0, now);
    }

    /// Touches every event field so `EventSequence` stays exercised from
    /// this crate's own tests, not only `patterncore-model`'s.
    #[test]
    fn dispatch_step_reads_events_for_the_current_step() {
        let engine = test_engine();
        let mut session = engine.store.session().session.clone();
        session.sequences.insert(
            "kick".into(),
            EventSequence::new(
                "kick",
                vec![Event { step: 0, velocity: 1.0, note: None, gate: 0.5, offset_ms: 0.0 }],
            ),
        );
        engine.store.load(session);
        engine.dispatch_step(0, Instant::now());
    }
}
