use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Factory credential shipped on the robots (`admin` / default password hash).
pub const DEFAULT_AUTHORIZATION: &str = "Basic YWRtaW46NzkzNWUyZGJkYzExMWZkYjhkOTExNjFjMzI3Y2UxNDhhMTRkZDc5MGUxM2Q1MWE5ZjFhMTk3ZTA0M2VhN2QwZg==";

#[derive(Clone, Debug)]
pub struct Config {
    pub robot_url: String,
    pub api_prefix: String,
    pub authorization: String,
    pub accept_language: String,
    pub request_timeout_secs: u64,
    pub fleet_mode: bool,
    pub mission_name: String,
    pub goto_robot_index: usize,
    pub poll_interval_ms: u64,
    pub connect_retry_secs: u64,
    pub connect_max_attempts: Option<u32>,
    pub telemetry_stale_secs: i64,
    pub server_address: String,
    pub adapter_api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            robot_url: env::var("ROBOT_URL")?,
            api_prefix: env::var("ROBOT_API_PREFIX").unwrap_or_else(|_| "/api/v2.0.0".to_string()),
            authorization: env::var("ROBOT_AUTHORIZATION")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AUTHORIZATION.to_string()),
            accept_language: env::var("ROBOT_ACCEPT_LANGUAGE")
                .unwrap_or_else(|_| "en-US".to_string()),
            request_timeout_secs: parse_or("ROBOT_REQUEST_TIMEOUT_SECS", 5),
            fleet_mode: parse_or("FLEET_MODE", false),
            mission_name: env::var("MISSION_NAME").unwrap_or_else(|_| "move".to_string()),
            goto_robot_index: parse_or("GOTO_ROBOT_INDEX", 0),
            poll_interval_ms: parse_or("POLL_INTERVAL_MS", 2000),
            connect_retry_secs: parse_or("CONNECT_RETRY_SECS", 5),
            connect_max_attempts: env::var("CONNECT_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok()),
            telemetry_stale_secs: parse_or("TELEMETRY_STALE_SECS", 30),
            server_address: env::var("SERVER_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3003".to_string()),
            adapter_api_key: env::var("ADAPTER_API_KEY")
                .unwrap_or_else(|_| "secret-adapter-key".to_string()),
        })
    }

    /// Config pointing at `robot_url` with every other field at its default.
    pub fn for_robot(robot_url: impl Into<String>) -> Self {
        Config {
            robot_url: robot_url.into(),
            api_prefix: "/api/v2.0.0".to_string(),
            authorization: DEFAULT_AUTHORIZATION.to_string(),
            accept_language: "en-US".to_string(),
            request_timeout_secs: 5,
            fleet_mode: false,
            mission_name: "move".to_string(),
            goto_robot_index: 0,
            poll_interval_ms: 2000,
            connect_retry_secs: 5,
            connect_max_attempts: None,
            telemetry_stale_secs: 30,
            server_address: "0.0.0.0:3003".to_string(),
            adapter_api_key: "secret-adapter-key".to_string(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }

    pub fn telemetry_stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.telemetry_stale_secs)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
