use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

use crate::engine::CoordinatorApi;
use crate::types::{Role, SubmitRequest, SubmitResponse, SubmitStatus, Template};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("coordinator returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl ClientError {
    /// Server-side errors and transport failures are worth retrying; a 4xx
    /// means the request itself is wrong and will not get better.
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Rejected { status, .. } => *status >= 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP implementation of the worker contract.
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
    miner_id: String,
    role: Role,
    retry: RetryConfig,
}

impl CoordinatorClient {
    pub fn new(base_url: &str, miner_id: &str, role: Role, retry: RetryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            miner_id: miner_id.to_string(),
            role,
            retry,
        }
    }

    async fn template_once(&self, attempts: u64) -> Result<Template, ClientError> {
        let response = self
            .http
            .get(format!("{}/template", self.base_url))
            .query(&[
                ("miner_id", self.miner_id.clone()),
                ("role", self.role.to_string()),
                ("attempts", attempts.to_string()),
            ])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn submit_once(&self, generation: u64, nonce: u64) -> Result<SubmitStatus, ClientError> {
        let response = self
            .http
            .post(format!("{}/submit", self.base_url))
            .json(&SubmitRequest {
                generation,
                miner_id: self.miner_id.clone(),
                nonce,
            })
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: SubmitResponse = response.json().await?;
        Ok(body.status)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    /// Exponential backoff around one request: initial delay, multiplier,
    /// capped, bounded number of retries.
    async fn retrying<T, F, Fut>(&self, what: &str, op: F) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut delay = self.retry.retry_delay;
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retry.max_retries && err.is_retryable() => {
                    attempt += 1;
                    log::debug!(
                        "[{}] {what} failed (attempt {attempt}): {err}, retrying in {delay:?}",
                        self.miner_id
                    );
                    tokio::time::sleep(delay).await;
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * self.retry.backoff_multiplier)
                            .min(self.retry.max_retry_delay.as_secs_f64()),
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl CoordinatorApi for CoordinatorClient {
    async fn fetch_template(&self, attempts: u64) -> Result<Template> {
        Ok(self
            .retrying("template fetch", || self.template_once(attempts))
            .await?)
    }

    async fn submit(&self, generation: u64, nonce: u64) -> Result<SubmitStatus> {
        Ok(self
            .retrying("submit", || self.submit_once(generation, nonce))
            .await?)
    }
}
