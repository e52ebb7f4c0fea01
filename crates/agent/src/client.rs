use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use creditwatch_core::config::AgentConfig;
use creditwatch_core::domain::CustomerSpec;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::prompts::QueryKind;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentQuery {
    pub id: String,
    pub kind: QueryKind,
    pub prompt: String,
}

impl AgentQuery {
    pub fn new(kind: QueryKind, prompt: impl Into<String>) -> Self {
        Self { id: format!("{}-{}", kind.as_str(), Uuid::new_v4()), kind, prompt: prompt.into() }
    }

    pub fn for_customer(kind: QueryKind, customer: &CustomerSpec) -> Self {
        Self::new(kind, kind.prompt(customer))
    }
}

/// Outcome of one query after retries. `Empty` is a legitimate answer with
/// no text; `Failed` means the agent could not be reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentReply {
    Text(String),
    Empty,
    Failed { attempts: u32, last_error: TransportError },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("agent connection failed: {0}")]
    Connect(String),
    #[error("agent request timed out after {0:?}")]
    Timeout(Duration),
    #[error("agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("agent returned an empty body")]
    EmptyBody,
    #[error("agent returned a non-JSON body: {0}")]
    InvalidJson(String),
    #[error("agent returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("agent request failed: {0}")]
    Request(String),
}

/// Posts one JSON-RPC envelope and hands back the decoded response body.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn post(&self, request: &Value) -> Result<Value, TransportError>;
}

pub struct HttpAgentTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAgentTransport {
    pub fn new(config: &AgentConfig) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))?;

        Ok(Self { client, endpoint: config.base_url.trim().to_string(), timeout })
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn post(&self, request: &Value) -> Result<Value, TransportError> {
        let response =
            self.client.post(&self.endpoint).json(request).send().await.map_err(|error| {
                if error.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else if error.is_connect() {
                    TransportError::Connect(error.to_string())
                } else {
                    TransportError::Request(error.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            if error.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Request(error.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        decode_body(&body)
    }
}

pub(crate) fn decode_body(body: &str) -> Result<Value, TransportError> {
    if body.trim().is_empty() {
        return Err(TransportError::EmptyBody);
    }

    serde_json::from_str(body).map_err(|error| TransportError::InvalidJson(error.to_string()))
}

#[derive(Clone)]
pub struct AgentClient {
    transport: Arc<dyn AgentTransport>,
    policy: RetryPolicy,
}

impl AgentClient {
    pub fn new(transport: Arc<dyn AgentTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `query`, retrying transient failures. Never errors: exhausted
    /// retries come back as `AgentReply::Failed`.
    pub async fn send(&self, query: &AgentQuery) -> AgentReply {
        let request = json_rpc_request(query);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let last_error = match self.attempt(&request).await {
                Ok(reply) => {
                    debug!(
                        event_name = "agent.query.completed",
                        query_id = %query.id,
                        attempt,
                        empty = matches!(reply, AgentReply::Empty),
                        "agent query completed"
                    );
                    return reply;
                }
                Err(error) => error,
            };

            warn!(
                event_name = "agent.query.attempt_failed",
                query_id = %query.id,
                attempt,
                max_attempts,
                error = %last_error,
                "agent query attempt failed"
            );

            if attempt >= max_attempts {
                return AgentReply::Failed { attempts: attempt, last_error };
            }

            let delay = self.policy.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn attempt(&self, request: &Value) -> Result<AgentReply, TransportError> {
        let timeout = self.policy.per_attempt_timeout;
        let response = tokio::time::timeout(timeout, self.transport.post(request))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        if let Some(error) = response.get("error").filter(|error| !error.is_null()) {
            return Err(TransportError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        Ok(match unwrap_response_text(&response) {
            Some(text) => AgentReply::Text(text),
            None => AgentReply::Empty,
        })
    }
}

pub fn json_rpc_request(query: &AgentQuery) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": query.id,
        "method": "message/send",
        "params": {
            "message": {
                "role": "user",
                "messageId": Uuid::new_v4().to_string(),
                "parts": [{ "kind": "text", "text": query.prompt }],
            }
        }
    })
}

/// Pulls reply text out of a JSON-RPC response. The first location holding
/// non-empty text wins:
/// `result.artifacts[].parts[]`, `result.status.message.parts[]`,
/// `result.message.parts[]`, `result.parts[]`. A plain string `result` is
/// taken as-is.
pub fn unwrap_response_text(response: &Value) -> Option<String> {
    let result = response.get("result")?;

    if let Some(text) = result.as_str() {
        return non_empty(text.to_string());
    }

    let from_artifacts = result.get("artifacts").and_then(Value::as_array).and_then(|artifacts| {
        let texts = artifacts
            .iter()
            .filter_map(|artifact| artifact.get("parts").and_then(parts_text))
            .collect::<Vec<_>>();
        non_empty(texts.join("\n"))
    });

    from_artifacts
        .or_else(|| result.pointer("/status/message/parts").and_then(parts_text))
        .or_else(|| result.pointer("/message/parts").and_then(parts_text))
        .or_else(|| result.get("parts").and_then(parts_text))
}

fn parts_text(parts: &Value) -> Option<String> {
    let texts = parts
        .as_array()?
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>();

    non_empty(texts.join("\n"))
}

fn non_empty(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}
