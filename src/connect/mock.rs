//! In-memory Kafka Connect cluster implementing `BaseClient`, for tests.
//!
//! Behaves like the service where it matters to the high-level client: PUT
//! config upserts and injects `name`, pause/resume flip the reported state,
//! absence is a 404 code. Every call is counted, failures can be injected per
//! method and connector, and the connectors with a call in flight are tracked.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::connect::base_client::BaseClient;
use crate::connect::types::*;
use crate::error::AppError;

#[derive(Debug, Clone)]
struct MockConnector {
    config: ConnectorConfig,
    state: ConnectorState,
}

#[derive(Default)]
pub struct MockBaseClient {
    cluster: Mutex<HashMap<String, MockConnector>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashSet<(&'static str, String)>>,
    /// Connectors whose state ignores pause/resume requests.
    frozen: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    /// Calls in flight per connector.
    busy: Mutex<HashMap<String, usize>>,
    max_busy: AtomicUsize,
}

impl MockBaseClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a connector. `name` is injected into the stored config the way the
    /// service does it.
    pub fn insert_connector(&self, name: &str, config: Value, state: ConnectorState) {
        let mut config = match config {
            Value::Object(map) => map,
            _ => ConnectorConfig::new(),
        };
        config.insert("name".into(), Value::String(name.into()));
        self.cluster
            .lock()
            .unwrap()
            .insert(name.to_string(), MockConnector { config, state });
    }

    /// Seed a connector whose stored config is exactly `config`, without adding `name`.
    pub fn insert_raw_config(&self, name: &str, config: ConnectorConfig, state: ConnectorState) {
        self.cluster
            .lock()
            .unwrap()
            .insert(name.to_string(), MockConnector { config, state });
    }

    /// Make `method` fail with a 500 for `connector`.
    pub fn fail_on(&self, method: &'static str, connector: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((method, connector.to_string()));
    }

    /// Accept pause/resume for `connector` without changing its state.
    pub fn freeze_state(&self, connector: &str) {
        self.frozen.lock().unwrap().insert(connector.to_string());
    }

    /// Delay every call, so concurrent deploys overlap.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Peak number of distinct connectors with a call in flight at once.
    pub fn max_busy_connectors(&self) -> usize {
        self.max_busy.load(Ordering::SeqCst)
    }

    pub fn state_of(&self, connector: &str) -> Option<ConnectorState> {
        self.cluster
            .lock()
            .unwrap()
            .get(connector)
            .map(|c| c.state.clone())
    }

    pub fn config_of(&self, connector: &str) -> Option<ConnectorConfig> {
        self.cluster
            .lock()
            .unwrap()
            .get(connector)
            .map(|c| c.config.clone())
    }

    /// Mark `connector` busy for the duration of the call, apply latency, then
    /// count the call and return any injected failure.
    async fn enter(&self, method: &'static str, connector: &str) -> Result<Busy<'_>, AppError> {
        let busy = Busy::new(self, connector);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.record(method, connector)?;
        Ok(busy)
    }

    fn record(&self, method: &'static str, connector: &str) -> Result<(), AppError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        if self
            .failures
            .lock()
            .unwrap()
            .contains(&(method, connector.to_string()))
        {
            return Err(AppError::Service {
                status: 500,
                message: format!("{}: injected failure", method),
            });
        }
        Ok(())
    }

    fn set_state(&self, connector: &str, state: ConnectorState) -> Result<EmptyResponse, AppError> {
        if self.frozen.lock().unwrap().contains(connector) {
            return Ok(EmptyResponse { code: 202 });
        }
        match self.cluster.lock().unwrap().get_mut(connector) {
            Some(c) => {
                c.state = state;
                Ok(EmptyResponse { code: 202 })
            }
            None => Err(not_found(connector)),
        }
    }
}

fn not_found(connector: &str) -> AppError {
    AppError::Service {
        status: NOT_FOUND,
        message: format!("Connector {} not found", connector),
    }
}

/// Keeps a connector counted as busy until dropped.
struct Busy<'a> {
    mock: &'a MockBaseClient,
    connector: String,
}

impl<'a> Busy<'a> {
    fn new(mock: &'a MockBaseClient, connector: &str) -> Self {
        let mut busy = mock.busy.lock().unwrap();
        *busy.entry(connector.to_string()).or_default() += 1;
        mock.max_busy.fetch_max(busy.len(), Ordering::SeqCst);
        Self {
            mock,
            connector: connector.to_string(),
        }
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        let mut busy = self.mock.busy.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = busy.get_mut(&self.connector) {
            *count -= 1;
            if *count == 0 {
                busy.remove(&self.connector);
            }
        }
    }
}

#[async_trait]
impl BaseClient for MockBaseClient {
    async fn get_all(&self) -> Result<GetAllConnectorsResponse, AppError> {
        let _busy = self.enter("get_all", "").await?;
        let mut connectors: Vec<String> = self.cluster.lock().unwrap().keys().cloned().collect();
        connectors.sort();
        Ok(GetAllConnectorsResponse {
            code: 200,
            connectors,
        })
    }

    async fn get_connector(&self, req: &ConnectorRequest) -> Result<ConnectorResponse, AppError> {
        let _busy = self.enter("get_connector", &req.name).await?;
        let found = self.cluster.lock().unwrap().get(&req.name).cloned();
        Ok(match found {
            Some(c) => ConnectorResponse {
                code: 200,
                name: req.name.clone(),
                config: c.config,
                tasks: vec![TaskId {
                    connector: req.name.clone(),
                    task: 0,
                }],
                connector_type: Some("sink".into()),
            },
            None => ConnectorResponse {
                code: NOT_FOUND,
                ..Default::default()
            },
        })
    }

    async fn create_connector(
        &self,
        req: &CreateConnectorRequest,
    ) -> Result<ConnectorResponse, AppError> {
        let _busy = self.enter("create_connector", &req.name).await?;
        if self.cluster.lock().unwrap().contains_key(&req.name) {
            return Err(AppError::Service {
                status: 409,
                message: format!("Connector {} already exists", req.name),
            });
        }
        self.insert_connector(
            &req.name,
            Value::Object(req.config.clone()),
            ConnectorState::Running,
        );
        Ok(ConnectorResponse {
            code: 201,
            name: req.name.clone(),
            config: req.config.clone(),
            ..Default::default()
        })
    }

    async fn update_connector(
        &self,
        req: &CreateConnectorRequest,
    ) -> Result<ConnectorResponse, AppError> {
        let _busy = self.enter("update_connector", &req.name).await?;
        let mut config = req.config.clone();
        config.insert("name".into(), Value::String(req.name.clone()));

        let mut cluster = self.cluster.lock().unwrap();
        let code = match cluster.get_mut(&req.name) {
            Some(existing) => {
                existing.config = config.clone();
                200
            }
            None => {
                cluster.insert(
                    req.name.clone(),
                    MockConnector {
                        config: config.clone(),
                        state: ConnectorState::Running,
                    },
                );
                201
            }
        };
        Ok(ConnectorResponse {
            code,
            name: req.name.clone(),
            config,
            ..Default::default()
        })
    }

    async fn delete_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let _busy = self.enter("delete_connector", &req.name).await?;
        match self.cluster.lock().unwrap().remove(&req.name) {
            Some(_) => Ok(EmptyResponse { code: 204 }),
            None => Err(not_found(&req.name)),
        }
    }

    async fn get_connector_config(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorConfigResponse, AppError> {
        let _busy = self.enter("get_connector_config", &req.name).await?;
        Ok(match self.config_of(&req.name) {
            Some(config) => GetConnectorConfigResponse { code: 200, config },
            None => GetConnectorConfigResponse {
                code: NOT_FOUND,
                ..Default::default()
            },
        })
    }

    async fn get_connector_status(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorStatusResponse, AppError> {
        let _busy = self.enter("get_connector_status", &req.name).await?;
        Ok(match self.state_of(&req.name) {
            Some(state) => GetConnectorStatusResponse {
                code: 200,
                name: req.name.clone(),
                connector: ConnectorStatus {
                    state: state.clone(),
                    worker_id: "mock:8083".into(),
                    trace: None,
                },
                tasks: vec![TaskStatus {
                    id: 0,
                    state,
                    worker_id: "mock:8083".into(),
                    trace: None,
                }],
            },
            None => GetConnectorStatusResponse {
                code: NOT_FOUND,
                ..Default::default()
            },
        })
    }

    async fn restart_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let _busy = self.enter("restart_connector", &req.name).await?;
        self.set_state(&req.name, ConnectorState::Running)
            .map(|_| EmptyResponse { code: 204 })
    }

    async fn pause_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let _busy = self.enter("pause_connector", &req.name).await?;
        self.set_state(&req.name, ConnectorState::Paused)
    }

    async fn resume_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let _busy = self.enter("resume_connector", &req.name).await?;
        self.set_state(&req.name, ConnectorState::Running)
    }

    async fn get_all_tasks(&self, req: &ConnectorRequest) -> Result<GetAllTasksResponse, AppError> {
        let _busy = self.enter("get_all_tasks", &req.name).await?;
        match self.config_of(&req.name) {
            Some(config) => Ok(GetAllTasksResponse {
                code: 200,
                tasks: vec![TaskDetails {
                    id: TaskId {
                        connector: req.name.clone(),
                        task: 0,
                    },
                    config,
                }],
            }),
            None => Err(not_found(&req.name)),
        }
    }

    async fn get_task_status(&self, req: &TaskRequest) -> Result<TaskStatusResponse, AppError> {
        let _busy = self.enter("get_task_status", &req.connector).await?;
        Ok(match self.state_of(&req.connector) {
            Some(state) if req.task_id == 0 => TaskStatusResponse {
                code: 200,
                status: TaskStatus {
                    id: 0,
                    state,
                    worker_id: "mock:8083".into(),
                    trace: None,
                },
            },
            _ => TaskStatusResponse {
                code: NOT_FOUND,
                ..Default::default()
            },
        })
    }

    async fn restart_task(&self, req: &TaskRequest) -> Result<EmptyResponse, AppError> {
        let _busy = self.enter("restart_task", &req.connector).await?;
        if req.task_id != 0 || self.state_of(&req.connector).is_none() {
            return Err(not_found(&req.connector));
        }
        Ok(EmptyResponse { code: 204 })
    }
}
