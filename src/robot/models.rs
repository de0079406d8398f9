use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target pose, in map coordinates (metres, degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub orientation: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, orientation: f64) -> Self {
        Self { x, y, orientation }
    }

    /// Pose rounded to 3 decimals for display.
    pub fn rounded(&self) -> Self {
        Self {
            x: round3(self.x),
            y: round3(self.y),
            orientation: round3(self.orientation),
        }
    }
}

impl From<[f64; 3]> for Pose {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// One robot as found at discovery. Index and identity are fixed for the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetMember {
    pub index: usize,
    pub id: u32,
    pub ip: String,
}

/// State ids this bridge ever requests from a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RobotState {
    Ready = 3,
    Paused = 4,
}

impl RobotState {
    pub fn state_id(self) -> u8 {
        self as u8
    }
}

/// Last polled status of one robot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotTelemetry {
    pub position: Pose,
    pub battery_level: Option<f64>,
    pub state_id: Option<u8>,
    pub state_text: Option<String>,
    pub mission_text: Option<String>,
}

impl From<StatusResponse> for RobotTelemetry {
    fn from(s: StatusResponse) -> Self {
        RobotTelemetry {
            position: s.position,
            battery_level: s.battery_percentage,
            state_id: s.state_id,
            state_text: s.state_text,
            mission_text: s.mission_text,
        }
    }
}

// ---- REST payloads ----

#[derive(Debug, Deserialize, Clone)]
pub struct FleetRobotSummary {
    pub id: u32,
    pub ip: String,
}

/// `GET /status` (direct) or the `status` object of `GET /robots/{id}` (fleet).
#[derive(Debug, Deserialize, Clone)]
pub struct StatusResponse {
    pub position: Pose,
    #[serde(default)]
    pub battery_percentage: Option<f64>,
    #[serde(default)]
    pub state_id: Option<u8>,
    #[serde(default)]
    pub state_text: Option<String>,
    #[serde(default)]
    pub mission_text: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FleetRobotDetail {
    pub status: StatusResponse,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MissionSummary {
    pub guid: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MissionAction {
    pub guid: String,
    pub action_type: String,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ActionParameter {
    pub id: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct StateChangeRequest {
    pub state_id: u8,
}

#[derive(Debug, Serialize)]
pub struct EnqueueMissionRequest<'a> {
    pub mission_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PositionUpdate {
    pub pos_x: f64,
    pub pos_y: f64,
    pub orientation: f64,
}

impl From<Pose> for PositionUpdate {
    fn from(p: Pose) -> Self {
        PositionUpdate {
            pos_x: p.x,
            pos_y: p.y,
            orientation: p.orientation,
        }
    }
}

/// Outcome of a successful mission relocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relocation {
    pub mission_guid: String,
    pub position_guid: String,
    pub pose: Pose,
}

// ---- adapter side ----

/// Command issued by an automation adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Data,
    Pause,
    Ready,
    GoTo(Pose),
    Idle,
    Quit,
    Invalid(String),
}

impl Command {
    /// Parse an adapter token. `go_to` needs a pose; without one it is invalid.
    ///
    /// Tokens are trimmed of whitespace and NUL padding (fixed-width PLC strings).
    pub fn parse(token: &str, pose: Option<[f64; 3]>) -> Self {
        let trimmed = token.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        match trimmed {
            "data" => Command::Data,
            "pause" => Command::Pause,
            "ready" => Command::Ready,
            "idle" => Command::Idle,
            "quit" => Command::Quit,
            "go_to" => match pose {
                Some(p) if p.iter().all(|v| v.is_finite()) => Command::GoTo(Pose::from(p)),
                _ => Command::Invalid(trimmed.to_string()),
            },
            _ => Command::Invalid(trimmed.to_string()),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Command::Data => "data",
            Command::Pause => "pause",
            Command::Ready => "ready",
            Command::GoTo(_) => "go_to",
            Command::Idle => "idle",
            Command::Quit => "quit",
            Command::Invalid(raw) => raw,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub action: String,
    #[serde(default)]
    pub pose: Option<[f64; 3]>,
}

/// Adapter-facing telemetry for one robot.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryView {
    pub index: usize,
    pub robot_id: u32,
    /// `None` until the robot has been polled successfully once.
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub orientation: Option<f64>,
    pub battery_level: Option<f64>,
    pub state_id: Option<u8>,
    pub mission_text: Option<String>,
    pub connected: bool,
    pub updated_at: Option<DateTime<Utc>>,
}
