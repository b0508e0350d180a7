//! Connection to the Ollama server with retry and exponential backoff
//!
//! One HTTP session is kept open between calls. A failed call closes it, so
//! the next attempt reconnects (and re-probes the server) from scratch.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::RwLock;

use crate::application::ports::outbound::{ConnectionStatus, LlmError};
use crate::domain::value_objects::ConnectionParams;

/// Upper bound of a single retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(300);

pub struct OllamaConnection {
    base_url: String,
    params: ConnectionParams,
    session: RwLock<Option<Client>>,
    status: RwLock<ConnectionStatus>,
}

impl OllamaConnection {
    pub fn new(base_url: &str, params: ConnectionParams) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            status: RwLock::new(ConnectionStatus {
                base_url: base_url.clone(),
                ..Default::default()
            }),
            base_url,
            params,
            session: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Return the open session, connecting and probing the server if there is none
    pub async fn ensure_connection(&self) -> Result<Client, LlmError> {
        if let Some(client) = self.session.read().await.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(self.params.timeout_secs))
            .build()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        match self.probe(&client).await {
            Ok(version) => {
                tracing::info!("Connected to Ollama {} at {}", version, self.base_url);
                *self.session.write().await = Some(client.clone());
                self.status.write().await.is_connected = true;
                Ok(client)
            }
            Err(e) => {
                self.status.write().await.is_connected = false;
                Err(e)
            }
        }
    }

    async fn probe(&self, client: &Client) -> Result<String, LlmError> {
        let response = client
            .get(self.url("/api/version"))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed(format!(
                "Version probe returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(body["version"].as_str().unwrap_or("unknown").to_string())
    }

    pub async fn close(&self) {
        if self.session.write().await.take().is_some() {
            tracing::debug!("Closed Ollama session");
        }
    }

    /// Run `operation` with up to `max_retries` attempts
    ///
    /// Each failure is recorded, the session is closed and the next attempt
    /// waits `retry_delay × backoff_factor^(attempt-1)`. The last error is
    /// returned once the attempts are used up.
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, LlmError>
    where
        F: Fn(Client) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let max_retries = self.params.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=max_retries {
            let result = match self.ensure_connection().await {
                Ok(client) => operation(client).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => {
                    self.record_success().await;
                    if attempt > 1 {
                        tracing::info!(
                            attempt,
                            operation = operation_name,
                            "Ollama request succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    self.record_error().await;
                    self.close().await;

                    if attempt < max_retries {
                        let delay = self.backoff_delay(attempt);
                        tracing::warn!(
                            attempt,
                            max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            operation = operation_name,
                            "Ollama request failed, retrying..."
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error =
            last_error.unwrap_or_else(|| LlmError::RequestFailed("Unknown error".to_string()));
        tracing::error!(
            attempts = max_retries,
            error = %error,
            operation = operation_name,
            "Ollama request failed after all retry attempts"
        );
        Err(error)
    }

    /// Delay before the attempt following failed attempt number `attempt`, at most `MAX_BACKOFF`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.params.retry_delay_secs * self.params.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs.max(0.0))
            .map(|delay| delay.min(MAX_BACKOFF))
            .unwrap_or(MAX_BACKOFF)
    }

    /// The error count tracks consecutive failed operations
    async fn record_success(&self) {
        let mut status = self.status.write().await;
        status.is_connected = true;
        status.error_count = 0;
    }

    async fn record_error(&self) {
        let mut status = self.status.write().await;
        status.is_connected = false;
        status.error_count += 1;
        status.last_error_time = Some(Utc::now());
    }

    pub async fn health_check(&self) -> bool {
        let healthy = self.ensure_connection().await.is_ok();
        if healthy {
            self.record_success().await;
        }
        healthy
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.status.read().await.clone()
    }
}
