pub mod client;
pub mod client_routes;
pub mod dispatcher;
pub mod models;
pub mod state;

use crate::error::RobotError;
use client::RobotClient;
use models::FleetMember;
use std::time::Duration;

/// Probe the robot and discover the fleet, retrying with a fixed delay.
///
/// `max_attempts = None` retries until it succeeds.
pub async fn connect_with_retry(
    client: &RobotClient,
    delay: Duration,
    max_attempts: Option<u32>,
) -> Result<Vec<FleetMember>, RobotError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let result = match client.is_reachable().await {
            Ok(()) => client.discover_fleet().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(members) => {
                tracing::info!(
                    url = %client.base_url(),
                    robots = members.len(),
                    attempt,
                    "Connected to robot API"
                );
                return Ok(members);
            }
            Err(e) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    tracing::error!(
                        url = %client.base_url(),
                        attempt,
                        error = %e,
                        "Giving up connecting to robot API"
                    );
                    return Err(e);
                }
                tracing::warn!(
                    url = %client.base_url(),
                    attempt,
                    error = %e,
                    retry_in_secs = delay.as_secs_f64(),
                    "Robot API unavailable, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
