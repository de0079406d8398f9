pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod robot;

pub use config::Config;
pub use error::{BridgeError, RobotError, SubmitError};
pub use robot::client::RobotClient;
pub use robot::dispatcher::{CommandDispatcher, CommandSender, DispatcherHandle, DispatcherSettings};
pub use robot::state::TelemetryCache;
use axum::{Router, routing::{get, post}};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: Config,
    pub client: Arc<RobotClient>,
    pub cache: TelemetryCache,
    pub commands: CommandSender,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // read-only telemetry and connectivity
    let telemetry_routes = Router::new()
        .route("/", get(root))
        .route("/status", get(robot::client_routes::get_status))
        .route(
            "/robot/check",
            get(robot::client_routes::check_robot_connection),
        );

    // command handoff (adapter api key checked in the handler)
    let command_routes = Router::new()
        .route("/command", post(robot::client_routes::submit_command));

    Router::new()
        .merge(telemetry_routes)
        .merge(command_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Fleet Bridge API - v0.1.0"
}
