//! `patterncored`: the control-plane process. Wires the message store,
//! destination router, OSC/MIDI senders, loop engine, client metadata
//! store, and SSE broker together, then serves the HTTP control plane.
//!
//! Environment variables (read once at startup): `OSC_HOST`, `OSC_PORT`,
//! `API_HOST`, `API_PORT`, `MIDI_PORT`. Exits 0 on clean shutdown, non-zero
//! if the OSC socket or the HTTP listener fails to bind.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use patterncore_engine::LoopEngine;
use patterncore_router::{MidiSender, OscSender, Router};
use patterncore_sse::{SseBroker, SseEvent};
use patterncore_store::{ClientStore, MessageStore};
use tracing::{info, warn};

const DEFAULT_OSC_HOST: &str = "127.0.0.1";
const DEFAULT_OSC_PORT: u16 = 57120;
const DEFAULT_API_HOST: &str = "0.0.0.0";
const DEFAULT_API_PORT: u16 = 9000;
const OSC_DESTINATION: &str = "dirt";

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_port(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let osc_host = env_or("OSC_HOST", DEFAULT_OSC_HOST);
    let osc_port = env_port("OSC_PORT", DEFAULT_OSC_PORT);
    let api_host = env_or("API_HOST", DEFAULT_API_HOST);
    let api_port = env_port("API_PORT", DEFAULT_API_PORT);
    let midi_port_name = env::var("MIDI_PORT").ok();

    let store = Arc::new(MessageStore::default());
    let router = Arc::new(Router::new());
    let midi = Arc::new(MidiSender::new("patterncore"));
    let broker = Arc::new(SseBroker::default());
    let clients = Arc::new(ClientStore::new());

    let osc_sender = Arc::new(
        OscSender::new(OSC_DESTINATION, &osc_host, osc_port)
            .map_err(|e| anyhow::anyhow!("failed to bind OSC socket {osc_host}:{osc_port}: {e}"))?,
    );
    info!(host = %osc_host, port = osc_port, "osc sender bound");

    if let Some(port_name) = midi_port_name {
        match MidiSender::list_ports() {
            Ok(ports) if ports.contains(&port_name) => midi.connect(&port_name),
            Ok(_) => warn!(port = %port_name, "configured MIDI_PORT not found, starting disconnected"),
            Err(err) => warn!(error = %err, "failed to enumerate MIDI ports at startup"),
        }
    }

    // Every audio track's destination id is its track id (see
    // `patterncore_store::loaded::build_message_index`); one shared OSC
    // sender serves all of them at the fixed `/dirt/play` address, so the
    // router only needs re-registering when the active track set changes.
    let engine = LoopEngine::new(
        Arc::clone(&store),
        Arc::clone(&router),
        Arc::clone(&midi),
        Arc::clone(&broker),
    );
    register_destinations(&router, &osc_sender, &store);
    spawn_destination_sync(Arc::clone(&broker), Arc::clone(&router), Arc::clone(&osc_sender));

    let tasks = engine.spawn();

    let state = patterncore_http::AppState {
        engine: Arc::clone(&engine),
        store,
        clients,
        router: Arc::clone(&router),
        midi: Arc::clone(&midi),
        broker,
        started_at: Instant::now(),
    };
    let app = patterncore_http::router(state);

    let addr: SocketAddr = format!("{api_host}:{api_port}").parse()
        .map_err(|e| anyhow::anyhow!("invalid API_HOST/API_PORT: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind HTTP listener on {addr}: {e}"))?;
    info!(%addr, "patterncored listening");

    axum::serve(listener, app).await?;

    tasks.step.abort();
    tasks.clock.abort();
    tasks.noteoff.abort();
    tasks.apply.abort();
    tasks.heartbeat.abort();
    router.close_all();
    Ok(())
}

/// Registers `sender` under every currently active audio track id so the
/// router's per-destination lookup finds it immediately on startup.
fn register_destinations(router: &Router, sender: &Arc<OscSender>, store: &MessageStore) {
    for track_id in store.active_track_ids() {
        router.register(track_id, sender.clone() as Arc<dyn patterncore_router::Sender>);
    }
}

/// Keeps the router's destination registrations in step with the active
/// track set as sessions load and scenes switch, by reacting to the same
/// `tracks` SSE event clients subscribe to.
fn spawn_destination_sync(broker: Arc<SseBroker>, router: Arc<Router>, sender: Arc<OscSender>) {
    tokio::spawn(async move {
        let mut subscription = broker.subscribe();
        while let Some(event) = subscription.recv().await {
            if let SseEvent::Tracks { active_track_ids } = event {
                for track_id in active_track_ids {
                    router.register(track_id, sender.clone() as Arc<dyn patterncore_router::Sender>);
                }
            }
        }
    });
}
