use crate::robot::models::Command;
use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single robot REST operation.
#[derive(Debug, Error)]
pub enum RobotError {
    /// Host unreachable, connection refused or request timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The robot answered with a non-2xx status.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// An expected mission, action, parameter or robot is absent from a response.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("undecodable response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("fleet has not been discovered yet")]
    NotDiscovered,

    #[error("no robot at index {0}")]
    UnknownRobot(usize),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl RobotError {
    /// Whether the caller may reasonably try again later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RobotError::Transport(_))
    }
}

/// Rejected hand-off of a command to the dispatcher. The command is returned.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("a command is already pending")]
    Pending(Command),

    #[error("dispatcher is not running")]
    Stopped(Command),
}

impl SubmitError {
    pub fn into_command(self) -> Command {
        match self {
            SubmitError::Pending(cmd) | SubmitError::Stopped(cmd) => cmd,
        }
    }
}

/// Failure on the automation-protocol side of a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge read failed: {0}")]
    Read(String),

    #[error("bridge write failed: {0}")]
    Write(String),
}
