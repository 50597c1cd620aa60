//! HTTP/SSE control plane: validates requests, dispatches to the store,
//! loop engine, and extensions, and streams state to subscribers.
//!
//! [`router`] assembles every endpoint in the control surface onto a single
//! [`axum::Router`] sharing one [`AppState`]; the binary crate is
//! responsible for constructing that state and serving the router.

mod error;
mod routes;
mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full control-plane router over `state`. Callers add no
/// further routes directly — extension-contributed routes are merged in by
/// the binary crate via [`axum::Router::merge`] before serving.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/playback/session", post(routes::playback::post_session))
        .route("/playback/start", post(routes::playback::post_start))
        .route("/playback/stop", post(routes::playback::post_stop))
        .route("/playback/pause", post(routes::playback::post_pause))
        .route("/playback/status", get(routes::playback::get_status))
        .route("/playback/environment", patch(routes::playback::patch_environment))
        .route("/playback/tracks/:id/params", patch(routes::playback::patch_track_params))
        .route("/playback/trigger/osc", post(routes::playback::trigger_osc))
        .route("/playback/trigger/midi", post(routes::playback::trigger_midi))
        .route("/playback/changes/pending", get(routes::playback::get_pending_changes))
        .route("/playback/changes/:id", delete(routes::playback::delete_pending_change))
        .route("/playback/changes/cancel-all", post(routes::playback::cancel_all_changes))
        .route(
            "/session/clients/:client_id/metadata",
            post(routes::clients::upsert_client_metadata),
        )
        .route("/session/clients", get(routes::clients::list_clients))
        .route("/session/clients/:client_id", get(routes::clients::get_client))
        .route("/session/clients/:client_id", delete(routes::clients::delete_client))
        .route("/tracks", get(routes::tracks::list_tracks))
        .route("/tracks/:id", get(routes::tracks::get_track))
        .route("/tracks/:id/mute", post(routes::tracks::set_mute))
        .route("/tracks/:id/solo", post(routes::tracks::set_solo))
        .route("/scene/activate", post(routes::scene::activate_scene))
        .route("/midi/ports", get(routes::midi::list_ports))
        .route("/midi/port", post(routes::midi::set_port))
        .route("/midi/panic", post(routes::midi::panic))
        .route("/stream", get(routes::stream::stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
