use fleet_bridge::robot::connect_with_retry;
use fleet_bridge::{
    create_router, logging, AppState, CommandDispatcher, Config, DispatcherSettings, RobotClient,
    TelemetryCache,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let _log_guard = logging::init(&logging::LogSettings::from_env());

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Missing configuration (ROBOT_URL must be set)");
            std::process::exit(1);
        }
    };

    let client = match RobotClient::new(&config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "Failed to create robot client");
            std::process::exit(1);
        }
    };

    let members = match connect_with_retry(
        &client,
        config.connect_retry_delay(),
        config.connect_max_attempts,
    )
    .await
    {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "Could not connect to robot API");
            std::process::exit(1);
        }
    };

    let cache = TelemetryCache::new(&members);
    let (dispatcher, commands) = CommandDispatcher::new(
        client.clone(),
        cache.clone(),
        DispatcherSettings::from_config(&config),
    );
    let dispatcher = dispatcher.start();

    let state = Arc::new(AppState {
        config: config.clone(),
        client,
        cache,
        commands,
    });
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.server_address).await {
        Ok(l) => l,
        Err(e) => {
            error!(address = %config.server_address, error = %e, "Failed to bind adapter listener");
            dispatcher.stop().await;
            std::process::exit(1);
        }
    };
    info!("starting adapter server on {}", config.server_address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(dispatcher.exited()))
        .await
    {
        error!(error = %e, "Adapter server failed");
    }

    dispatcher.stop().await;
}

// Ctrl-C, or the dispatcher exiting after a `quit` command.
async fn shutdown_signal(mut dispatcher_exited: watch::Receiver<bool>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = dispatcher_exited.wait_for(|exited| *exited) => {
            info!("Command dispatcher exited, shutting down adapter server");
        }
    }
}
