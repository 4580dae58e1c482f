use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use crate::error::{ApiResult, BuildClientSnafu, DecodeSnafu, StatusSnafu, TransportSnafu};
use crate::wire::{GenerateRequest, GenerateResponse, RegisterUserRequest, UserRecord};
use crate::{ChatBackend, GENERATE_PATH, HEALTH_PATH, USERS_PATH};

/// Origin used when no API base is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub api_base: String,
    pub timeout: Option<Duration>,
}

impl BackendConfig {
    /// Empty or blank bases fall back to [`DEFAULT_API_BASE`].
    pub fn new(api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        Self {
            api_base: if api_base.is_empty() {
                DEFAULT_API_BASE.to_string()
            } else {
                api_base
            },
            timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// [`ChatBackend`] over HTTP+JSON.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> ApiResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context(BuildClientSnafu {
            stage: "build-http-client",
        })?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    async fn probe_health(&self) -> ApiResult<()> {
        let endpoint = self.endpoint(HEALTH_PATH);
        let response = self.http.get(&endpoint).send().await.context(TransportSnafu {
            stage: "send-health-probe",
            endpoint: endpoint.clone(),
        })?;

        Self::ensure_success(response, &endpoint).await?;
        Ok(())
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> ApiResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = self.endpoint(path);
        let response = self
            .http
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-request",
                endpoint: endpoint.clone(),
            })?;

        let payload = Self::ensure_success(response, &endpoint).await?;
        serde_json::from_str(&payload).context(DecodeSnafu {
            stage: "decode-response",
            endpoint,
        })
    }

    /// Reads the body and turns non-2xx responses into [`crate::ApiError::Status`].
    async fn ensure_success(response: Response, endpoint: &str) -> ApiResult<String> {
        let status = response.status();
        let payload = response.text().await.context(TransportSnafu {
            stage: "read-response-body",
            endpoint: endpoint.to_string(),
        })?;

        if !status.is_success() {
            tracing::debug!(
                endpoint,
                status = status.as_u16(),
                "gateway returned a non-success status"
            );
            return StatusSnafu {
                stage: "response-status",
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        Ok(payload)
    }
}

impl ChatBackend for HttpBackend {
    fn check_health(&self) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(self.probe_health())
    }

    fn register_user(&self, name: String) -> BoxFuture<'_, ApiResult<UserRecord>> {
        Box::pin(async move { self.post_json(USERS_PATH, &RegisterUserRequest { name }).await })
    }

    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, ApiResult<GenerateResponse>> {
        Box::pin(async move { self.post_json(GENERATE_PATH, &request).await })
    }
}
