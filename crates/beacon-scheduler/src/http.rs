use std::time::Duration;

use async_trait::async_trait;
use beacon_core::config::ExecutorConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};

/// Why an outbound call produced no HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connect,
    Request,
    Body,
}

/// Result of one outbound API call, as recorded in the event log.
///
/// Any HTTP status counts as `Responded`, 5xx included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiOutcome {
    Responded { status: u16, body: Value },
    Failed { error: FailureKind, message: String },
}

impl ApiOutcome {
    /// JSON stored in `event_logs.response`.
    pub fn to_response(&self) -> Value {
        match self {
            ApiOutcome::Responded { status, body } => {
                serde_json::json!({ "status": status, "body": body })
            }
            ApiOutcome::Failed { error, message } => {
                serde_json::json!({ "error": error, "message": message })
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ApiOutcome::Failed { .. })
    }
}

/// Outbound HTTP seam. Implementations never fail: transport problems are
/// folded into [`ApiOutcome::Failed`].
#[async_trait]
pub trait ApiCaller: Send + Sync {
    async fn post_json(&self, endpoint: &str, payload: &Value) -> ApiOutcome;
}

/// [`ApiCaller`] over `reqwest`, with a bounded per-call timeout.
pub struct ReqwestCaller {
    client: reqwest::Client,
}

impl ReqwestCaller {
    pub fn new(cfg: &ExecutorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| SchedulerError::Upstream(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiCaller for ReqwestCaller {
    async fn post_json(&self, endpoint: &str, payload: &Value) -> ApiOutcome {
        debug!(%endpoint, "calling api trigger endpoint");

        let resp = match self.client.post(endpoint).json(payload).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let error = if e.is_timeout() {
                    FailureKind::Timeout
                } else if e.is_connect() {
                    FailureKind::Connect
                } else {
                    FailureKind::Request
                };
                warn!(%endpoint, ?error, "api trigger call failed: {e}");
                return ApiOutcome::Failed {
                    error,
                    message: e.to_string(),
                };
            }
        };

        let status = resp.status().as_u16();
        match resp.text().await {
            Ok(text) => {
                // Keep JSON bodies structured; anything else is stored as a string.
                let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
                if status >= 400 {
                    warn!(%endpoint, status, "api trigger endpoint returned an error status");
                }
                ApiOutcome::Responded { status, body }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Body
                };
                warn!(%endpoint, status, "reading api trigger response failed: {e}");
                ApiOutcome::Failed {
                    error,
                    message: e.to_string(),
                }
            }
        }
    }
}
