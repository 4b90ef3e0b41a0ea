pub mod approvals;
pub mod auth;
pub mod callback;
pub mod credentials;
pub mod error;
pub mod health;
pub mod runs;
pub mod sources;
pub mod tools;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes split into **public** (no auth), the **runtime callback**
/// (authenticated via its own per-run token instead of the operator's API
/// token, §6.1), and the **control plane** (gated behind the
/// `CODEGATE_API_TOKEN` bearer middleware, §6.2/§6.5).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health::health));

    let callback = Router::new().route("/v1/runtime/tool-call", post(callback::tool_call));

    let control_plane = Router::new()
        // Runs (component H)
        .route("/v1/runs", post(runs::submit_run).get(runs::list_runs))
        .route("/v1/runs/:id", get(runs::get_run))
        .route("/v1/runs/:id/cancel", post(runs::cancel_run))
        .route("/v1/runs/:id/events", get(runs::run_events))
        // Tool catalog (component A)
        .route("/v1/tools", get(tools::list_tools))
        .route("/v1/tools/:id", get(tools::get_tool))
        // Approvals (component E)
        .route(
            "/v1/approvals/:id",
            get(approvals::get_approval).post(approvals::resolve_approval),
        )
        // Tool sources (component A/I)
        .route(
            "/v1/tool-sources",
            get(sources::list_sources).post(sources::create_source),
        )
        .route("/v1/tool-sources/:id", delete(sources::delete_source))
        // Credentials (component C)
        .route(
            "/v1/credentials",
            get(credentials::list_credentials)
                .post(credentials::create_credential)
                .delete(credentials::delete_credential),
        )
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token));

    public
        .merge(callback)
        .merge(control_plane)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
