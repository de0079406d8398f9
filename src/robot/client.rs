use crate::config::Config;
use crate::error::RobotError;
use crate::robot::models::{
    EnqueueMissionRequest, FleetMember, FleetRobotDetail, FleetRobotSummary, MissionAction,
    MissionSummary, Pose, PositionUpdate, Relocation, RobotState, RobotTelemetry,
    StateChangeRequest, StatusResponse,
};
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// How a robot is reached: through the fleet manager by id, or directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotAddress {
    Fleet { id: u32, ip: String },
    Direct,
}

/// Concrete URLs for one robot, resolved once per operation.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub address: RobotAddress,
    pub status_url: String,
    pub api_base: String,
}

impl Endpoint {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

impl RobotAddress {
    /// `base_url` already carries the version prefix.
    pub fn resolve(&self, base_url: &str, api_prefix: &str) -> Endpoint {
        match self {
            RobotAddress::Fleet { id, ip } => Endpoint {
                address: self.clone(),
                status_url: format!("{base_url}/robots/{id}"),
                api_base: format!("http://{ip}{api_prefix}"),
            },
            RobotAddress::Direct => Endpoint {
                address: self.clone(),
                status_url: format!("{base_url}/status"),
                api_base: base_url.to_string(),
            },
        }
    }
}

struct Fleet {
    members: Vec<FleetMember>,
    // One exclusive token per robot; held for the full duration of any call
    // that talks to that robot.
    tokens: Vec<Mutex<()>>,
}

/// REST client for one robot (direct mode) or a whole fleet.
///
/// Never retries; every operation returns a `Result` and leaves retry policy
/// to the caller.
pub struct RobotClient {
    http: reqwest::Client,
    base_url: String,
    api_prefix: String,
    fleet_mode: bool,
    mission_name: String,
    direct_host: String,
    fleet: OnceLock<Fleet>,
}

impl RobotClient {
    pub fn new(config: &Config) -> Result<Self, RobotError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&config.authorization)?);
        headers.insert(ACCEPT_LANGUAGE, header_value(&config.accept_language)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .no_proxy()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RobotError::Config(format!("failed to build HTTP client: {e}")))?;

        let root = config.robot_url.trim_end_matches('/');
        let direct_host = reqwest::Url::parse(root)
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{h}:{port}"),
                    None => h.to_string(),
                })
            })
            .ok_or_else(|| RobotError::Config(format!("invalid robot URL '{root}'")))?;

        Ok(Self {
            http,
            base_url: format!("{root}{}", config.api_prefix),
            api_prefix: config.api_prefix.clone(),
            fleet_mode: config.fleet_mode,
            mission_name: config.mission_name.clone(),
            direct_host,
            fleet: OnceLock::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Discovered members, empty before discovery.
    pub fn members(&self) -> &[FleetMember] {
        self.fleet.get().map(|f| f.members.as_slice()).unwrap_or(&[])
    }

    pub fn robot_count(&self) -> usize {
        self.members().len()
    }

    /// Probe the API root.
    pub async fn is_reachable(&self) -> Result<(), RobotError> {
        self.send(self.http.get(&self.base_url), &self.base_url)
            .await
            .map(|_| ())
    }

    /// Discover the fleet. Membership is fixed by the first successful call;
    /// later calls return the same members without touching the network.
    pub async fn discover_fleet(&self) -> Result<Vec<FleetMember>, RobotError> {
        if let Some(fleet) = self.fleet.get() {
            debug!("Fleet already discovered, reusing membership");
            return Ok(fleet.members.clone());
        }

        let members = if self.fleet_mode {
            let url = format!("{}/robots", self.base_url);
            let robots: Vec<FleetRobotSummary> = self.get_json(&url).await?;
            robots
                .into_iter()
                .enumerate()
                .map(|(index, r)| FleetMember {
                    index,
                    id: r.id,
                    ip: r.ip,
                })
                .collect()
        } else {
            vec![FleetMember {
                index: 0,
                id: 0,
                ip: self.direct_host.clone(),
            }]
        };

        if members.is_empty() {
            warn!(url = %self.base_url, "Fleet discovery returned no robots");
        }

        let fleet = self.fleet.get_or_init(|| Fleet {
            tokens: members.iter().map(|_| Mutex::new(())).collect(),
            members,
        });
        info!(
            robots = fleet.members.len(),
            fleet_mode = self.fleet_mode,
            "Fleet discovered"
        );
        Ok(fleet.members.clone())
    }

    /// Fetch status for one robot, or for every robot when `index` is `None`
    /// or out of range. Robots are polled concurrently and fail independently.
    pub async fn refresh_telemetry(
        &self,
        index: Option<usize>,
    ) -> Vec<(usize, Result<RobotTelemetry, RobotError>)> {
        let count = self.robot_count();
        match index {
            Some(i) if i < count => vec![(i, self.refresh_one(i).await)],
            _ => {
                join_all((0..count).map(|i| async move { (i, self.refresh_one(i).await) }))
                    .await
            }
        }
    }

    async fn refresh_one(&self, index: usize) -> Result<RobotTelemetry, RobotError> {
        let _token = self.token(index).await?;
        let endpoint = self.endpoint(index)?;
        debug!(robot = index, url = %endpoint.status_url, "Refreshing telemetry");

        let status = match endpoint.address {
            RobotAddress::Fleet { .. } => {
                self.get_json::<FleetRobotDetail>(&endpoint.status_url)
                    .await?
                    .status
            }
            RobotAddress::Direct => self.get_json::<StatusResponse>(&endpoint.status_url).await?,
        };
        Ok(status.into())
    }

    pub async fn set_state(&self, index: usize, state: RobotState) -> Result<(), RobotError> {
        let _token = self.token(index).await?;
        let endpoint = self.endpoint(index)?;
        self.put_state(&endpoint, index, state).await
    }

    /// Request `state` on every robot, one after another.
    pub async fn set_state_all(&self, state: RobotState) -> Vec<(usize, Result<(), RobotError>)> {
        let mut results = Vec::with_capacity(self.robot_count());
        for index in 0..self.robot_count() {
            results.push((index, self.set_state(index, state).await));
        }
        results
    }

    pub async fn reset_mission_queue(&self, index: usize) -> Result<(), RobotError> {
        let _token = self.token(index).await?;
        let endpoint = self.endpoint(index)?;
        self.delete_queue(&endpoint, index).await
    }

    pub async fn enqueue_mission(&self, index: usize, mission_guid: &str) -> Result<(), RobotError> {
        let _token = self.token(index).await?;
        let endpoint = self.endpoint(index)?;
        self.post_mission(&endpoint, index, mission_guid).await
    }

    /// Move the target of the configured mission template to `pose` and run it.
    ///
    /// Sequence: pause, clear queue, find the mission by name, find its first
    /// `move` action, find that action's `position` parameter, `PUT` the pose
    /// onto the referenced position resource, enqueue the mission, ready.
    ///
    /// The queue is cleared even when the pause is refused. If anything fails
    /// before the enqueue, the robot keeps an empty queue and is not resumed.
    /// Nothing is rolled back or retried.
    pub async fn relocate_mission(&self, index: usize, pose: Pose) -> Result<Relocation, RobotError> {
        let _token = self.token(index).await?;
        let endpoint = self.endpoint(index)?;
        info!(
            robot = index,
            mission = %self.mission_name,
            x = pose.x,
            y = pose.y,
            orientation = pose.orientation,
            "Relocating mission"
        );

        let paused = self.put_state(&endpoint, index, RobotState::Paused).await;
        let cleared = self.delete_queue(&endpoint, index).await;
        paused?;
        cleared?;

        let (mission_guid, position_guid) = match self.mutate_template(&endpoint, pose).await {
            Ok(guids) => guids,
            Err(e) => {
                warn!(
                    robot = index,
                    error = %e,
                    "Mission relocation aborted, robot left paused with an empty queue"
                );
                return Err(e);
            }
        };

        self.post_mission(&endpoint, index, &mission_guid).await?;
        self.put_state(&endpoint, index, RobotState::Ready).await?;

        info!(
            robot = index,
            mission = %mission_guid,
            position = %position_guid,
            "Mission relocated and queued"
        );
        Ok(Relocation {
            mission_guid,
            position_guid,
            pose,
        })
    }

    async fn mutate_template(
        &self,
        endpoint: &Endpoint,
        pose: Pose,
    ) -> Result<(String, String), RobotError> {
        let missions: Vec<MissionSummary> = self.get_json(&endpoint.url("/missions")).await?;
        let mission = missions
            .into_iter()
            .find(|m| m.name == self.mission_name)
            .ok_or_else(|| RobotError::NotFound(format!("mission '{}'", self.mission_name)))?;

        let actions_url = endpoint.url(&format!("/missions/{}/actions", mission.guid));
        let actions: Vec<MissionAction> = self.get_json(&actions_url).await?;
        let action = actions
            .iter()
            .find(|a| a.action_type == "move")
            .ok_or_else(|| {
                RobotError::NotFound(format!("move action in mission '{}'", mission.guid))
            })?;

        let position_guid = action
            .parameters
            .iter()
            .find(|p| p.id == "position")
            .and_then(|p| p.value.as_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                RobotError::NotFound(format!("position parameter in action '{}'", action.guid))
            })?;

        let url = endpoint.url(&format!("/positions/{position_guid}"));
        self.send(
            self.http.put(&url).json(&PositionUpdate::from(pose)),
            &url,
        )
        .await?;
        debug!(position = %position_guid, "Position resource updated");

        Ok((mission.guid, position_guid))
    }

    async fn put_state(
        &self,
        endpoint: &Endpoint,
        index: usize,
        state: RobotState,
    ) -> Result<(), RobotError> {
        let url = endpoint.url("/status");
        let body = StateChangeRequest {
            state_id: state.state_id(),
        };
        match self.send(self.http.put(&url).json(&body), &url).await {
            Ok(_) => {
                info!(robot = index, state = ?state, "Robot state changed");
                Ok(())
            }
            Err(e) => {
                warn!(robot = index, state = ?state, error = %e, "Robot state change failed");
                Err(e)
            }
        }
    }

    async fn delete_queue(&self, endpoint: &Endpoint, index: usize) -> Result<(), RobotError> {
        let url = endpoint.url("/mission_queue");
        match self.send(self.http.delete(&url), &url).await {
            Ok(_) => {
                info!(robot = index, "Mission queue reset");
                Ok(())
            }
            Err(e) => {
                warn!(robot = index, error = %e, "Mission queue reset failed");
                Err(e)
            }
        }
    }

    async fn post_mission(
        &self,
        endpoint: &Endpoint,
        index: usize,
        mission_guid: &str,
    ) -> Result<(), RobotError> {
        let url = endpoint.url("/mission_queue");
        let body = EnqueueMissionRequest {
            mission_id: mission_guid,
        };
        match self.send(self.http.post(&url).json(&body), &url).await {
            Ok(_) => {
                info!(robot = index, mission = %mission_guid, "Mission enqueued");
                Ok(())
            }
            Err(e) => {
                warn!(robot = index, mission = %mission_guid, error = %e, "Mission enqueue failed");
                Err(e)
            }
        }
    }

    fn endpoint(&self, index: usize) -> Result<Endpoint, RobotError> {
        let fleet = self.fleet.get().ok_or(RobotError::NotDiscovered)?;
        let member = fleet
            .members
            .get(index)
            .ok_or(RobotError::UnknownRobot(index))?;
        let address = if self.fleet_mode {
            RobotAddress::Fleet {
                id: member.id,
                ip: member.ip.clone(),
            }
        } else {
            RobotAddress::Direct
        };
        Ok(address.resolve(&self.base_url, &self.api_prefix))
    }

    async fn token(&self, index: usize) -> Result<MutexGuard<'_, ()>, RobotError> {
        let fleet = self.fleet.get().ok_or(RobotError::NotDiscovered)?;
        let token = fleet
            .tokens
            .get(index)
            .ok_or(RobotError::UnknownRobot(index))?;
        Ok(token.lock().await)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RobotError> {
        let response = self.send(self.http.get(url), url).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| RobotError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, RobotError> {
        debug!(url = %url, "Robot request");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RobotError::Http {
                status,
                url: url.to_string(),
                body,
            })
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RobotError> {
    HeaderValue::from_str(value)
        .map_err(|e| RobotError::Config(format!("invalid header value: {e}")))
}
