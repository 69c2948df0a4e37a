//! High-level Kafka Connect client.
//!
//! Wraps a `BaseClient` with synchronous variants of the asynchronous
//! endpoints and with `deploy_connector`, which converges one connector to a
//! desired configuration while disturbing it as little as possible.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::connect::base_client::{BaseClient, HttpBaseClient};
use crate::connect::config::{ClientConfig, DEFAULT_PARALLELISM};
use crate::connect::poll::{poll_until, PollOutcome, DEFAULT_POLL_INTERVAL};
use crate::connect::types::*;
use crate::error::{AppError, DeployErrors, SyncOperation};

/// Deadline applied to each synchronous wait unless overridden.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HighLevelClient<C> {
    client: Arc<C>,
    max_parallel_request: usize,
    pause_before_deploy: bool,
    sync_timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<C> Clone for HighLevelClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            max_parallel_request: self.max_parallel_request,
            pause_before_deploy: self.pause_before_deploy,
            sync_timeout: self.sync_timeout,
            poll_interval: self.poll_interval,
            cancel: self.cancel.clone(),
        }
    }
}

impl HighLevelClient<HttpBaseClient> {
    /// HTTP-backed client with every setting taken from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, AppError> {
        let mut client = Self::new(HttpBaseClient::new(config)?);
        client.set_parallelism(config.parallelism);
        client.set_pause_before_deploy(config.pause_before_deploy);
        client.set_sync_timeout(config.sync_timeout());
        client.set_poll_interval(config.poll_interval());
        Ok(client)
    }
}

impl<C: BaseClient + 'static> HighLevelClient<C> {
    pub fn new(client: C) -> Self {
        Self::with_shared(Arc::new(client))
    }

    pub fn with_shared(client: Arc<C>) -> Self {
        Self {
            client,
            max_parallel_request: DEFAULT_PARALLELISM,
            pause_before_deploy: false,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    // --------------------------------------------------------------------
    // Settings
    // --------------------------------------------------------------------

    /// Limit of concurrent deploys in `deploy_multiple_connector`. Defaults to 3.
    pub fn set_parallelism(&mut self, value: usize) {
        self.max_parallel_request = value.max(1);
    }

    pub fn set_pause_before_deploy(&mut self, pause_before_deploy: bool) {
        self.pause_before_deploy = pause_before_deploy;
    }

    pub fn set_sync_timeout(&mut self, timeout: Duration) {
        self.sync_timeout = timeout;
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Every synchronous wait ends with `AppError::Cancelled` once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.max_parallel_request
    }

    pub fn base_client(&self) -> &C {
        &self.client
    }

    // --------------------------------------------------------------------
    // Kafka Connect API
    // --------------------------------------------------------------------

    pub async fn get_all(&self) -> Result<GetAllConnectorsResponse, AppError> {
        self.client.get_all().await
    }

    pub async fn get_connector(&self, req: &ConnectorRequest) -> Result<ConnectorResponse, AppError> {
        self.client.get_connector(req).await
    }

    pub async fn get_connector_config(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorConfigResponse, AppError> {
        self.client.get_connector_config(req).await
    }

    pub async fn get_connector_status(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorStatusResponse, AppError> {
        self.client.get_connector_status(req).await
    }

    pub async fn restart_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        self.client.restart_connector(req).await
    }

    pub async fn get_all_tasks(&self, req: &ConnectorRequest) -> Result<GetAllTasksResponse, AppError> {
        self.client.get_all_tasks(req).await
    }

    pub async fn get_task_status(&self, req: &TaskRequest) -> Result<TaskStatusResponse, AppError> {
        self.client.get_task_status(req).await
    }

    pub async fn restart_task(&self, req: &TaskRequest) -> Result<EmptyResponse, AppError> {
        self.client.restart_task(req).await
    }

    /// Create a connector. With `sync`, wait until the service reports it.
    pub async fn create_connector(
        &self,
        req: &CreateConnectorRequest,
        sync: bool,
    ) -> Result<ConnectorResponse, AppError> {
        let result = self.client.create_connector(req).await?;
        if sync {
            let client = Arc::clone(&self.client);
            let lookup = req.connector_request();
            self.wait_for(SyncOperation::Create, &req.name, move || {
                let client = Arc::clone(&client);
                let lookup = lookup.clone();
                async move { matches!(client.get_connector(&lookup).await, Ok(r) if r.code == 200) }
            })
            .await?;
        }
        Ok(result)
    }

    /// Replace a connector's config (creating it if absent). With `sync`, wait
    /// until the live config equals `req.config`.
    pub async fn update_connector(
        &self,
        req: &CreateConnectorRequest,
        sync: bool,
    ) -> Result<ConnectorResponse, AppError> {
        let result = self.client.update_connector(req).await?;
        if sync {
            let client = Arc::clone(&self.client);
            let desired = req.clone();
            self.wait_for(SyncOperation::Update, &req.name, move || {
                let client = Arc::clone(&client);
                let desired = desired.clone();
                async move {
                    matches!(
                        live_config_matches(client.as_ref(), &desired.name, &desired.config).await,
                        Ok(true)
                    )
                }
            })
            .await?;
        }
        Ok(result)
    }

    /// Delete a connector. With `sync`, wait until the service reports it absent.
    pub async fn delete_connector(
        &self,
        req: &ConnectorRequest,
        sync: bool,
    ) -> Result<EmptyResponse, AppError> {
        let result = self.client.delete_connector(req).await?;
        if sync {
            let client = Arc::clone(&self.client);
            let lookup = req.clone();
            self.wait_for(SyncOperation::Delete, &req.name, move || {
                let client = Arc::clone(&client);
                let lookup = lookup.clone();
                async move { matches!(client.get_connector(&lookup).await, Ok(r) if r.is_not_found()) }
            })
            .await?;
        }
        Ok(result)
    }

    /// Pause a running connector. With `sync`, wait until it reports `PAUSED`.
    pub async fn pause_connector(
        &self,
        req: &ConnectorRequest,
        sync: bool,
    ) -> Result<EmptyResponse, AppError> {
        let result = self.client.pause_connector(req).await?;
        if sync {
            self.wait_for_state(req, ConnectorState::Paused, SyncOperation::Pause)
                .await?;
        }
        Ok(result)
    }

    /// Resume a paused connector. With `sync`, wait until it reports `RUNNING`.
    pub async fn resume_connector(
        &self,
        req: &ConnectorRequest,
        sync: bool,
    ) -> Result<EmptyResponse, AppError> {
        let result = self.client.resume_connector(req).await?;
        if sync {
            self.wait_for_state(req, ConnectorState::Running, SyncOperation::Resume)
                .await?;
        }
        Ok(result)
    }

    // --------------------------------------------------------------------
    // Bounded waits
    // --------------------------------------------------------------------

    async fn wait_for<F, Fut>(
        &self,
        operation: SyncOperation,
        connector: &str,
        predicate: F,
    ) -> Result<(), AppError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        match poll_until(predicate, self.sync_timeout, self.poll_interval, &self.cancel).await {
            PollOutcome::Succeeded => Ok(()),
            PollOutcome::TimedOut => Err(AppError::Timeout {
                operation,
                connector: connector.to_string(),
                after: self.sync_timeout,
            }),
            PollOutcome::Cancelled => Err(AppError::Cancelled(operation)),
        }
    }

    async fn wait_for_state(
        &self,
        req: &ConnectorRequest,
        target: ConnectorState,
        operation: SyncOperation,
    ) -> Result<(), AppError> {
        let client = Arc::clone(&self.client);
        let lookup = req.clone();
        self.wait_for(operation, &req.name, move || {
            let client = Arc::clone(&client);
            let lookup = lookup.clone();
            let target = target.clone();
            async move {
                matches!(client.get_connector_status(&lookup).await, Ok(r) if r.is_in_state(&target))
            }
        })
        .await
    }

    // --------------------------------------------------------------------
    // Reconciliation
    // --------------------------------------------------------------------

    /// Whether the live config of `connector` equals `config`.
    ///
    /// An absent connector is `Ok(false)`, not an error.
    pub async fn is_up_to_date(
        &self,
        connector: &str,
        config: &ConnectorConfig,
    ) -> Result<bool, AppError> {
        live_config_matches(self.client.as_ref(), connector, config).await
    }

    /// Converge one connector to `req`, doing nothing when it is already up to date.
    ///
    /// When pause-before-deploy is on and the connector is `RUNNING`, it is
    /// paused for the update and resumed afterwards on every path, including a
    /// failed update. The first error wins; a failed resume is only returned
    /// when everything before it succeeded.
    pub async fn deploy_connector(&self, req: &CreateConnectorRequest) -> Result<(), AppError> {
        if req.name.trim().is_empty() {
            return Err(AppError::Validation("connector name must not be empty".into()));
        }
        let span = tracing::info_span!("deploy", connector = %req.name);
        self.deploy_inner(req).instrument(span).await
    }

    async fn deploy_inner(&self, req: &CreateConnectorRequest) -> Result<(), AppError> {
        self.ensure_not_cancelled()?;
        tracing::info!("Connector deployment starting");
        let target = req.connector_request();

        let existing = self.client.get_connector(&target).await?;
        let mut pause_needed = false;

        if existing.is_not_found() {
            tracing::info!("Connector does not exist yet, it will be created");
        } else {
            if self.is_up_to_date(&req.name, &req.config).await? {
                tracing::info!("Connector is up to date, skipping update");
                return Ok(());
            }

            if !self.pause_before_deploy {
                tracing::info!("Connector pause before deploy skipped per configuration");
            } else {
                let status = self.client.get_connector_status(&target).await?;
                if status.connector.state.is_running() {
                    pause_needed = true;
                } else {
                    tracing::info!(
                        state = %status.connector.state,
                        "Connector is not RUNNING, it will not be paused"
                    );
                }
            }
        }

        if !pause_needed {
            self.ensure_not_cancelled()?;
            return self.apply_update(req).await;
        }

        self.ensure_not_cancelled()?;
        tracing::info!("Connector is RUNNING, pausing it");
        self.client.pause_connector(&target).await?;

        // From here the connector has been asked to pause: resume on every path.
        let outcome = match self
            .wait_for_state(&target, ConnectorState::Paused, SyncOperation::Pause)
            .await
        {
            Ok(()) => {
                tracing::info!("Connector is now PAUSED");
                self.apply_update(req).await
            }
            Err(e) => Err(e),
        };

        tracing::info!("Connector was RUNNING, resuming it");
        let resumed = self.resume_connector(&target, true).await.map(|_| ());
        settle_cleanup(outcome, resumed)
    }

    fn ensure_not_cancelled(&self) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled(SyncOperation::Deploy));
        }
        Ok(())
    }

    async fn apply_update(&self, req: &CreateConnectorRequest) -> Result<(), AppError> {
        tracing::info!("Connector update starting");
        self.update_connector(req, true).await?;
        tracing::info!("Connector is now updated");
        Ok(())
    }

    /// Deploy every connector with at most `parallelism` deploys in flight.
    ///
    /// Every connector is attempted, and all failures are returned together as
    /// `AppError::Deploy`. Once the client is cancelled no further deploy
    /// starts; the ones not started are reported as cancelled.
    pub async fn deploy_multiple_connector(
        &self,
        connectors: &[CreateConnectorRequest],
    ) -> Result<(), AppError> {
        let slots = self.max_parallel_request;
        let semaphore = Arc::new(Semaphore::new(slots));
        let errors = Arc::new(Mutex::new(DeployErrors::new()));
        let mut handles = Vec::with_capacity(connectors.len());

        tracing::info!(
            connectors = connectors.len(),
            parallelism = slots,
            "Deploying connectors"
        );

        for req in connectors {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    Some(permit.map_err(|e| AppError::Internal(e.to_string()))?)
                }
            };
            let Some(permit) = permit else {
                errors
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(req.name.clone(), AppError::Cancelled(SyncOperation::Deploy));
                continue;
            };
            let this = self.clone();
            let errors = Arc::clone(&errors);
            let req = req.clone();
            let name = req.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = this.deploy_connector(&req).await {
                    tracing::error!(connector = %req.name, error = %e, "Connector deployment failed");
                    errors
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(req.name.clone(), e);
                }
            });
            handles.push((name, handle));
        }

        // Drain barrier: every slot is free again only once every deploy ended.
        let _all_slots = semaphore
            .acquire_many(slots as u32)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        for (name, handle) in handles {
            if let Err(join_err) = handle.await {
                errors
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(name, AppError::Internal(format!("deployment task failed: {}", join_err)));
            }
        }

        let errors = std::mem::take(&mut *errors.lock().unwrap_or_else(|e| e.into_inner()));
        errors.into_result()
    }
}

/// Combine the result of a paused deploy with its cleanup resume.
fn settle_cleanup(
    outcome: Result<(), AppError>,
    resumed: Result<(), AppError>,
) -> Result<(), AppError> {
    match (outcome, resumed) {
        (Ok(()), Ok(())) => {
            tracing::info!("Connector is now RUNNING");
            Ok(())
        }
        (Ok(()), Err(resume_err)) => Err(resume_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(AppError::Cancelled(_))) => {
            tracing::warn!("Connector resume was sent but not confirmed before cancellation");
            Err(e)
        }
        (Err(e), Err(resume_err)) => {
            tracing::error!(error = %resume_err, "Connector could not be resumed after a failed deploy");
            Err(e)
        }
    }
}

// ============================================================================
// Config equality
// ============================================================================

async fn live_config_matches<C: BaseClient + ?Sized>(
    client: &C,
    connector: &str,
    config: &ConnectorConfig,
) -> Result<bool, AppError> {
    let live = client
        .get_connector_config(&ConnectorRequest::new(connector))
        .await?;
    if live.code == NOT_FOUND {
        return Ok(false);
    }
    if live.code >= 400 {
        return Err(AppError::Service {
            status: live.code,
            message: format!("get connector config: status code {}", live.code),
        });
    }
    Ok(configs_equal(connector, config, &live.config))
}

/// Compare a desired config with the one the cluster reports.
///
/// The cluster always includes `name`, so it is added to a copy of `desired`.
/// Values are compared through `canonical_value`, so `1` and `"1"` are equal.
pub fn configs_equal(connector: &str, desired: &ConnectorConfig, live: &ConnectorConfig) -> bool {
    let mut expected = desired.clone();
    expected.insert("name".into(), Value::String(connector.to_string()));

    if expected.len() != live.len() {
        return false;
    }
    live.iter().all(|(key, value)| {
        expected
            .get(key)
            .is_some_and(|local| canonical_value(local) == canonical_value(value))
    })
}

/// Uniform string form of a config value.
pub fn canonical_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Connect stores the number's own text: 2.0 comes back as "2.0".
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
