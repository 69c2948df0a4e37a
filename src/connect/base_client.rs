use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::connect::config::{BasicAuth, ClientConfig};
use crate::connect::types::*;
use crate::error::AppError;

// ============================================================================
// Trait
// ============================================================================

/// One method per Kafka Connect REST endpoint.
///
/// Probing endpoints (`get_connector`, `get_connector_config`,
/// `get_connector_status`, `get_task_status`) report absence as `Ok` with
/// `code == 404`. Every other status >= 400 is an `AppError::Service`.
#[async_trait]
pub trait BaseClient: Send + Sync {
    async fn get_all(&self) -> Result<GetAllConnectorsResponse, AppError>;

    async fn get_connector(&self, req: &ConnectorRequest) -> Result<ConnectorResponse, AppError>;

    async fn create_connector(
        &self,
        req: &CreateConnectorRequest,
    ) -> Result<ConnectorResponse, AppError>;

    /// `PUT /connectors/{name}/config`. The service treats this as an upsert.
    async fn update_connector(
        &self,
        req: &CreateConnectorRequest,
    ) -> Result<ConnectorResponse, AppError>;

    async fn delete_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError>;

    async fn get_connector_config(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorConfigResponse, AppError>;

    async fn get_connector_status(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorStatusResponse, AppError>;

    async fn restart_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError>;

    async fn pause_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError>;

    async fn resume_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError>;

    async fn get_all_tasks(&self, req: &ConnectorRequest) -> Result<GetAllTasksResponse, AppError>;

    async fn get_task_status(&self, req: &TaskRequest) -> Result<TaskStatusResponse, AppError>;

    async fn restart_task(&self, req: &TaskRequest) -> Result<EmptyResponse, AppError>;
}

// ============================================================================
// Helpers
// ============================================================================

fn transport_err(e: impl std::fmt::Display) -> AppError {
    AppError::Transport(e.to_string())
}

fn config_err(e: impl std::fmt::Display) -> AppError {
    AppError::Config(e.to_string())
}

fn connector_path(name: &str) -> String {
    format!("/connectors/{}", urlencoding::encode(name))
}

fn task_path(req: &TaskRequest) -> String {
    format!("{}/tasks/{}", connector_path(&req.connector), req.task_id)
}

/// Whether a 404 is a normal answer for the endpoint being called.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Absence {
    Tolerated,
    Error,
}

// ============================================================================
// HttpBaseClient
// ============================================================================

/// `BaseClient` over HTTP, with transparent retry of 409 Conflict.
pub struct HttpBaseClient {
    http: reqwest::Client,
    base_url: String,
    basic_auth: Option<BasicAuth>,
    conflict_retries: u32,
    retry_wait: Duration,
    retry_max_wait: Duration,
}

impl HttpBaseClient {
    /// Build the client from a validated `ClientConfig`.
    ///
    /// Reads the TLS identity files, if configured, so a bad path fails here
    /// rather than on the first request.
    pub fn new(config: &ClientConfig) -> Result<Self, AppError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for header in &config.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(config_err)?;
            let value = HeaderValue::from_str(&header.value).map_err(config_err)?;
            headers.append(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers);

        if config.insecure_skip_verify {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let (Some(cert), Some(key)) = (&config.client_certificate, &config.client_key) {
            let mut pem = std::fs::read(cert)?;
            pem.push(b'\n');
            pem.extend(std::fs::read(key)?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(config_err)?;
            builder = builder.identity(identity);
        }

        let http = builder.build().map_err(config_err)?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            basic_auth: config.basic_auth.clone(),
            conflict_retries: config.conflict_retries,
            retry_wait: config.retry_wait(),
            retry_max_wait: config.retry_max_wait(),
        })
    }

    // --------------------------------------------------------------------
    // Private HTTP helpers
    // --------------------------------------------------------------------

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.basic_auth {
            Some(auth) => req.basic_auth(&auth.username, Some(&auth.password)),
            None => req,
        }
    }

    /// Send a request, retrying while the service answers 409 Conflict.
    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, AppError> {
        let mut wait = self.retry_wait;
        let mut attempt = 0;
        loop {
            let attempt_req = req
                .try_clone()
                .ok_or_else(|| AppError::Internal("request body cannot be replayed".into()))?;
            let resp = attempt_req.send().await.map_err(transport_err)?;

            tracing::debug!(
                path = %resp.url().path(),
                status = resp.status().as_u16(),
                "Kafka Connect response"
            );

            if resp.status().as_u16() != CONFLICT || attempt >= self.conflict_retries {
                return Ok(resp);
            }

            attempt += 1;
            tracing::warn!(
                path = %resp.url().path(),
                attempt,
                wait_ms = wait.as_millis() as u64,
                "Kafka Connect returned 409 Conflict, retrying"
            );
            tokio::time::sleep(wait).await;
            wait = (wait * 2).min(self.retry_max_wait);
        }
    }

    /// Send a request and deserialize the body. Empty bodies (204, tolerated 404)
    /// decode to `T::default()`.
    async fn send_json<T: DeserializeOwned + Default>(
        &self,
        req: reqwest::RequestBuilder,
        operation: &str,
        absence: Absence,
    ) -> Result<(u16, T), AppError> {
        let resp = self.execute(req).await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport_err)?;

        if status == NOT_FOUND && absence == Absence::Tolerated {
            return Ok((status, T::default()));
        }
        if status >= 400 {
            return Err(service_error(operation, status, &body));
        }
        if body.trim().is_empty() {
            return Ok((status, T::default()));
        }

        let value = serde_json::from_str(&body)
            .map_err(|e| AppError::Transport(format!("{}: malformed response: {}", operation, e)))?;
        Ok((status, value))
    }

    /// Send a request where only the status code matters.
    async fn send_empty(
        &self,
        req: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<EmptyResponse, AppError> {
        let resp = self.execute(req).await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(service_error(operation, status, &body));
        }
        Ok(EmptyResponse { code: status })
    }
}

/// Map an error status to `AppError::Service`, preferring Connect's own message.
fn service_error(operation: &str, status: u16, body: &str) -> AppError {
    let message = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.message.is_empty() => parsed.message,
        _ => body.trim().to_string(),
    };
    AppError::Service {
        status,
        message: format!("{}: {}", operation, message),
    }
}

#[async_trait]
impl BaseClient for HttpBaseClient {
    /// `GET /connectors`
    async fn get_all(&self) -> Result<GetAllConnectorsResponse, AppError> {
        let req = self.request(Method::GET, "/connectors");
        let (code, connectors) = self
            .send_json::<Vec<String>>(req, "get all connectors", Absence::Error)
            .await?;
        Ok(GetAllConnectorsResponse { code, connectors })
    }

    /// `GET /connectors/{name}`
    async fn get_connector(&self, req: &ConnectorRequest) -> Result<ConnectorResponse, AppError> {
        let http_req = self.request(Method::GET, &connector_path(&req.name));
        let (code, mut resp) = self
            .send_json::<ConnectorResponse>(http_req, "get connector", Absence::Tolerated)
            .await?;
        resp.code = code;
        Ok(resp)
    }

    /// `POST /connectors`
    async fn create_connector(
        &self,
        req: &CreateConnectorRequest,
    ) -> Result<ConnectorResponse, AppError> {
        let http_req = self.request(Method::POST, "/connectors").json(req);
        let (code, mut resp) = self
            .send_json::<ConnectorResponse>(http_req, "create connector", Absence::Error)
            .await?;
        resp.code = code;
        Ok(resp)
    }

    /// `PUT /connectors/{name}/config`
    async fn update_connector(
        &self,
        req: &CreateConnectorRequest,
    ) -> Result<ConnectorResponse, AppError> {
        let path = format!("{}/config", connector_path(&req.name));
        let http_req = self.request(Method::PUT, &path).json(&req.config);
        let (code, mut resp) = self
            .send_json::<ConnectorResponse>(http_req, "update connector", Absence::Error)
            .await?;
        resp.code = code;
        Ok(resp)
    }

    /// `DELETE /connectors/{name}`
    async fn delete_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let http_req = self.request(Method::DELETE, &connector_path(&req.name));
        self.send_empty(http_req, "delete connector").await
    }

    /// `GET /connectors/{name}/config`
    async fn get_connector_config(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorConfigResponse, AppError> {
        let path = format!("{}/config", connector_path(&req.name));
        let (code, config) = self
            .send_json::<ConnectorConfig>(
                self.request(Method::GET, &path),
                "get connector config",
                Absence::Tolerated,
            )
            .await?;
        Ok(GetConnectorConfigResponse { code, config })
    }

    /// `GET /connectors/{name}/status`
    async fn get_connector_status(
        &self,
        req: &ConnectorRequest,
    ) -> Result<GetConnectorStatusResponse, AppError> {
        let path = format!("{}/status", connector_path(&req.name));
        let (code, mut resp) = self
            .send_json::<GetConnectorStatusResponse>(
                self.request(Method::GET, &path),
                "get connector status",
                Absence::Tolerated,
            )
            .await?;
        resp.code = code;
        Ok(resp)
    }

    /// `POST /connectors/{name}/restart`
    async fn restart_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let path = format!("{}/restart", connector_path(&req.name));
        self.send_empty(self.request(Method::POST, &path), "restart connector")
            .await
    }

    /// `PUT /connectors/{name}/pause` -- asynchronous on the service side.
    async fn pause_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let path = format!("{}/pause", connector_path(&req.name));
        self.send_empty(self.request(Method::PUT, &path), "pause connector")
            .await
    }

    /// `PUT /connectors/{name}/resume` -- asynchronous on the service side.
    async fn resume_connector(&self, req: &ConnectorRequest) -> Result<EmptyResponse, AppError> {
        let path = format!("{}/resume", connector_path(&req.name));
        self.send_empty(self.request(Method::PUT, &path), "resume connector")
            .await
    }

    /// `GET /connectors/{name}/tasks`
    async fn get_all_tasks(&self, req: &ConnectorRequest) -> Result<GetAllTasksResponse, AppError> {
        let path = format!("{}/tasks", connector_path(&req.name));
        let (code, tasks) = self
            .send_json::<Vec<TaskDetails>>(
                self.request(Method::GET, &path),
                "get all tasks",
                Absence::Error,
            )
            .await?;
        Ok(GetAllTasksResponse { code, tasks })
    }

    /// `GET /connectors/{name}/tasks/{id}/status`
    async fn get_task_status(&self, req: &TaskRequest) -> Result<TaskStatusResponse, AppError> {
        let path = format!("{}/status", task_path(req));
        let (code, status) = self
            .send_json::<TaskStatus>(
                self.request(Method::GET, &path),
                "get task status",
                Absence::Tolerated,
            )
            .await?;
        Ok(TaskStatusResponse { code, status })
    }

    /// `POST /connectors/{name}/tasks/{id}/restart`
    async fn restart_task(&self, req: &TaskRequest) -> Result<EmptyResponse, AppError> {
        let path = format!("{}/restart", task_path(req));
        self.send_empty(self.request(Method::POST, &path), "restart task")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_names_are_percent_encoded() {
        assert_eq!(connector_path("jdbc sink/v2"), "/connectors/jdbc%20sink%2Fv2");
        assert_eq!(
            task_path(&TaskRequest::new("sink-a", 3)),
            "/connectors/sink-a/tasks/3"
        );
    }

    #[test]
    fn test_service_error_prefers_connect_message() {
        let err = service_error(
            "create connector",
            400,
            r#"{"error_code":400,"message":"Connector config is invalid"}"#,
        );
        match err {
            AppError::Service { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "create connector: Connector config is invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_service_error_falls_back_to_raw_body() {
        let err = service_error("get all connectors", 502, "Bad Gateway\n");
        assert_eq!(
            err.to_string(),
            "Kafka Connect error (502): get all connectors: Bad Gateway"
        );
    }

    #[test]
    fn test_new_rejects_invalid_header() {
        let mut config = ClientConfig::default();
        config.headers.push(crate::connect::config::CustomHeader {
            name: "bad header".into(),
            value: "x".into(),
        });
        assert!(matches!(HttpBaseClient::new(&config), Err(AppError::Config(_))));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let client = HttpBaseClient::new(&ClientConfig::new("http://connect:8083/")).unwrap();
        assert_eq!(client.base_url, "http://connect:8083");
    }
}
