//! End-to-end smoke tests for the `patterncored` control plane.
//!
//! Each test wires the same components `main` does (store, router, a
//! loopback-bound OSC sender, MIDI sender, SSE broker, client store, loop
//! engine) onto an ephemeral TCP port and drives it with `reqwest`, the way
//! a real client would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use patterncore_engine::LoopEngine;
use patterncore_http::AppState;
use patterncore_router::{MidiSender, OscSender, Router};
use patterncore_sse::SseBroker;
use patterncore_store::{ClientStore, MessageStore};
use serde_json::{json, Value};

/// Binds the full stack to `127.0.0.1:0` and returns its base URL plus the
/// engine task handles, which the caller aborts on teardown (same shutdown
/// sequence as `main`, see `src/main.rs`).
async fn spawn_server() -> (String, patterncore_engine::EngineTasks) {
    let store = Arc::new(MessageStore::default());
    let router = Arc::new(Router::new());
    let midi = Arc::new(MidiSender::new("patterncore-test"));
    let broker = Arc::new(SseBroker::default());
    let clients = Arc::new(ClientStore::new());

    // Port 0: let the OS pick one, same as the TCP listener below. Nothing
    // in these tests asserts on the bytes this socket emits, only on the
    // HTTP control plane, so a loopback bind with no peer reading it is
    // fine.
    let osc = Arc::new(OscSender::new("dirt", "127.0.0.1", 0).expect("bind OSC test socket"));

    let engine = LoopEngine::new(
        Arc::clone(&store),
        Arc::clone(&router),
        Arc::clone(&midi),
        Arc::clone(&broker),
    );
    for track_id in store.active_track_ids() {
        router.register(track_id, osc.clone() as Arc<dyn patterncore_router::Sender>);
    }
    let tasks = engine.spawn();

    let state = AppState {
        engine,
        store,
        clients,
        router,
        midi,
        broker,
        started_at: Instant::now(),
    };
    let app = patterncore_http::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (format!("http://{addr}"), tasks)
}

fn minimal_session_body() -> Value {
    json!({
        "environment": { "bpm": 120.0, "swing": 0.0, "default_gate": 0.5, "loop_steps": 256 },
        "tracks": {
            "kick": {
                "meta": { "track_id": "kick", "mute": false, "solo": false },
                "params": {
                    "s": "bd", "n": 0, "gain": 1.0, "pan": 0.5,
                    "speed": 1.0, "begin": 0.0, "end": 1.0
                },
                "sends": [],
            }
        },
        "sequences": {
            "kick": { "track_id": "kick", "events": [
                { "step": 0, "velocity": 1.0, "gate": 0.5, "offset_ms": 0.0 },
                { "step": 4, "velocity": 1.0, "gate": 0.5, "offset_ms": 0.0 }
            ] }
        },
        "timing": "now",
    })
}

// ---------------------------------------------------------------------
// S1: load a minimal session and confirm the server reports it running.
// ---------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok_before_any_session_loads() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

#[tokio::test]
async fn loading_a_session_schedules_it_and_status_reflects_it() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/playback/session"))
        .json(&minimal_session_body())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["timing"], "now");

    // "now" changes apply on the very next engine tick; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let resp = client.get(format!("{base}/playback/status")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["active_tracks"], json!(["kick"]));

    let resp = client.get(format!("{base}/tracks")).send().await.unwrap();
    let tracks: Value = resp.json().await.unwrap();
    assert_eq!(tracks.as_array().unwrap().len(), 1);

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

#[tokio::test]
async fn start_stop_pause_change_playback_state() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    client.post(format!("{base}/playback/session")).json(&minimal_session_body()).send().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let resp = client.post(format!("{base}/playback/start")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let status: Value = client.get(format!("{base}/playback/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["playing"], true);

    client.post(format!("{base}/playback/pause")).send().await.unwrap();
    let status: Value = client.get(format!("{base}/playback/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["playing"], false);

    client.post(format!("{base}/playback/stop")).send().await.unwrap();
    let status: Value = client.get(format!("{base}/playback/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["playing"], false);

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

// ---------------------------------------------------------------------
// Track mute/solo and the unknown-track 404 path.
// ---------------------------------------------------------------------

#[tokio::test]
async fn mute_and_solo_round_trip_through_track_listing() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    client.post(format!("{base}/playback/session")).json(&minimal_session_body()).send().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let resp = client
        .post(format!("{base}/tracks/kick/mute"))
        .json(&json!({"muted": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let track: Value = client.get(format!("{base}/tracks/kick")).send().await.unwrap().json().await.unwrap();
    assert_eq!(track["meta"]["mute"], true);

    let resp = client
        .post(format!("{base}/tracks/ghost/solo"))
        .json(&json!({"solo": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

// ---------------------------------------------------------------------
// Deferred changes: schedule at the next bar boundary, list it, cancel it.
// ---------------------------------------------------------------------

#[tokio::test]
async fn pending_change_can_be_listed_and_cancelled() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    client.post(format!("{base}/playback/session")).json(&minimal_session_body()).send().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let resp = client
        .patch(format!("{base}/playback/environment"))
        .json(&json!({"bpm": 140.0, "timing": "bar"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let change_id = body["change_id"].as_str().unwrap().to_string();

    let pending: Value = client
        .get(format!("{base}/playback/changes/pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.as_array().unwrap().iter().any(|c| c["id"] == change_id));

    let resp = client
        .delete(format!("{base}/playback/changes/{change_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("{base}/playback/changes/{change_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

// ---------------------------------------------------------------------
// Client metadata CRUD.
// ---------------------------------------------------------------------

#[tokio::test]
async fn client_metadata_upsert_then_delete() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/session/clients/editor-1/metadata"))
        .json(&json!({"cursor": {"track_id": "kick", "step": 3}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let meta: Value = client
        .get(format!("{base}/session/clients/editor-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(meta["cursor"]["track_id"], "kick");

    let all: Value = client.get(format!("{base}/session/clients")).send().await.unwrap().json().await.unwrap();
    assert!(all.as_object().unwrap().contains_key("editor-1"));

    client.delete(format!("{base}/session/clients/editor-1")).send().await.unwrap();
    let resp = client.get(format!("{base}/session/clients/editor-1")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

// ---------------------------------------------------------------------
// MIDI ports: enumerable headlessly, without real hardware attached.
// ---------------------------------------------------------------------

#[tokio::test]
async fn midi_ports_endpoint_succeeds_without_hardware() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/midi/ports")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let ports: Value = resp.json().await.unwrap();
    assert!(ports.is_array());

    let resp = client
        .post(format!("{base}/midi/port"))
        .json(&json!({"port_name": "does-not-exist"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client.post(format!("{base}/midi/panic")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

// ---------------------------------------------------------------------
// Rejecting an invalid session: dangling mixer send.
// ---------------------------------------------------------------------

// ---------------------------------------------------------------------
// SSE: a fresh subscriber sees `connected` first, before any mutation.
// ---------------------------------------------------------------------

#[tokio::test]
async fn stream_emits_connected_event_first() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut resp = client.get(format!("{base}/stream")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let mut buf = String::new();
    while !buf.contains("\n\n") {
        let chunk = resp.chunk().await.unwrap().expect("stream closed before first event");
        buf.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    assert!(buf.contains("event: connected"), "first SSE frame was not `connected`: {buf:?}");

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}

#[tokio::test]
async fn invalid_session_is_rejected_with_422() {
    let (base, tasks) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut body = minimal_session_body();
    body["tracks"]["kick"]["sends"] = json!([{"mixer_line_id": "missing", "gain": 1.0, "pan": 0.5}]);

    let resp = client.post(format!("{base}/playback/session")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 422);

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
}
