use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connector configuration as Kafka Connect stores it: string keys, arbitrary JSON values.
pub type ConnectorConfig = serde_json::Map<String, Value>;

/// Status code Kafka Connect uses to signal that a connector (or task) does not exist.
pub const NOT_FOUND: u16 = 404;

/// Status code Kafka Connect uses while a rebalance is in progress.
pub const CONFLICT: u16 = 409;

// ============================================================================
// Requests
// ============================================================================

/// Identifies a connector by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorRequest {
    pub name: String,
}

impl ConnectorRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Desired state of one connector: its name and full configuration.
///
/// This is also the on-disk definition format read by the CLI:
/// `{ "name": "...", "config": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateConnectorRequest {
    pub name: String,
    #[serde(default)]
    pub config: ConnectorConfig,
}

impl CreateConnectorRequest {
    pub fn new(name: impl Into<String>, config: ConnectorConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn connector_request(&self) -> ConnectorRequest {
        ConnectorRequest::new(self.name.clone())
    }
}

/// Identifies one task of a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub connector: String,
    pub task_id: u32,
}

impl TaskRequest {
    pub fn new(connector: impl Into<String>, task_id: u32) -> Self {
        Self {
            connector: connector.into(),
            task_id,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Error body returned by Kafka Connect on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error_code: u16,
    #[serde(default)]
    pub message: String,
}

/// Response of endpoints where only the status code matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResponse {
    #[serde(default)]
    pub code: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllConnectorsResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub connectors: Vec<String>,
}

/// `GET /connectors/{name}` and the create/update endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: ConnectorConfig,
    #[serde(default)]
    pub tasks: Vec<TaskId>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<String>,
}

impl ConnectorResponse {
    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetConnectorConfigResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub config: ConnectorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetConnectorStatusResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub connector: ConnectorStatus,
    #[serde(default)]
    pub tasks: Vec<TaskStatus>,
}

impl GetConnectorStatusResponse {
    /// True when the service answered and reports the connector in `state`.
    pub fn is_in_state(&self, state: &ConnectorState) -> bool {
        self.code == 200 && &self.connector.state == state
    }
}

/// Connector-level part of the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorStatus {
    #[serde(default)]
    pub state: ConnectorState,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Runtime state reported for connectors and tasks.
///
/// Only `RUNNING` and `PAUSED` drive deploy decisions; anything the service
/// invents later is preserved verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectorState {
    Running,
    Paused,
    Failed,
    Unassigned,
    Restarting,
    #[default]
    Unknown,
    Other(String),
}

impl ConnectorState {
    pub fn is_running(&self) -> bool {
        matches!(self, ConnectorState::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectorState::Running => "RUNNING",
            ConnectorState::Paused => "PAUSED",
            ConnectorState::Failed => "FAILED",
            ConnectorState::Unassigned => "UNASSIGNED",
            ConnectorState::Restarting => "RESTARTING",
            ConnectorState::Unknown => "",
            ConnectorState::Other(s) => s,
        }
    }
}

impl From<String> for ConnectorState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "RUNNING" => ConnectorState::Running,
            "PAUSED" => ConnectorState::Paused,
            "FAILED" => ConnectorState::Failed,
            "UNASSIGNED" => ConnectorState::Unassigned,
            "RESTARTING" => ConnectorState::Restarting,
            "" => ConnectorState::Unknown,
            _ => ConnectorState::Other(s),
        }
    }
}

impl From<ConnectorState> for String {
    fn from(state: ConnectorState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Identifies a task and the connector owning it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskId {
    #[serde(default)]
    pub connector: String,
    #[serde(default)]
    pub task: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub id: TaskId,
    #[serde(default)]
    pub config: ConnectorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllTasksResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub tasks: Vec<TaskDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub state: ConnectorState,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub status: TaskStatus,
}
