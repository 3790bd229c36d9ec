//! Long-running operation polling
//!
//! ARM accepts most writes asynchronously. The initial response tells us
//! where to look: an `Azure-AsyncOperation` status monitor, a `Location`
//! URL, or the resource itself via `provisioningState`.

use super::client::ArmClient;
use super::http::ArmResponse;
use crate::error::{ProviderError, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Status of an in-flight operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Done,
    Failed {
        status: String,
        code: String,
        message: String,
    },
    Running,
    Unknown(String),
}

impl OperationStatus {
    /// Classify a status string as reported by ARM
    pub fn from_state(state: &str, body: &Value) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "succeeded" => OperationStatus::Done,
            "failed" | "canceled" | "cancelled" => {
                let error = body
                    .get("error")
                    .or_else(|| body.pointer("/properties/error"))
                    .cloned()
                    .unwrap_or(Value::Null);
                OperationStatus::Failed {
                    status: state.to_string(),
                    code: error
                        .get("code")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    message: error
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                }
            }
            "inprogress" | "running" | "accepted" | "creating" | "updating" | "deleting"
            | "provisioning" => OperationStatus::Running,
            other => OperationStatus::Unknown(other.to_string()),
        }
    }
}

/// Where progress is read from
#[derive(Debug, Clone, PartialEq)]
enum PollTarget {
    /// `Azure-AsyncOperation` header: body carries `status`
    AsyncOperation(String),
    /// `Location` header: 202 while running
    Location(String),
    /// The resource itself: `properties.provisioningState`
    Resource(String),
}

/// Book-keeping for one operation
struct PendingOperation {
    target: PollTarget,
    delete: bool,
    poll_count: u32,
    started: Instant,
}

/// Wait until the operation started by `initial` reaches a terminal state
pub async fn wait_for_completion(
    client: &ArmClient,
    resource_url: &str,
    initial: ArmResponse,
    delete: bool,
) -> Result<()> {
    let Some(target) = poll_target(resource_url, &initial) else {
        return Ok(());
    };

    let mut pending = PendingOperation {
        target,
        delete,
        poll_count: 0,
        started: Instant::now(),
    };
    let mut wait = retry_after(&initial).unwrap_or(client.poll_interval);

    loop {
        tokio::time::sleep(wait).await;
        pending.poll_count += 1;

        let (status, next_wait) = poll_once(client, &pending).await?;
        match status {
            OperationStatus::Done => {
                tracing::debug!(
                    "Operation on {} completed after {} polls ({:?})",
                    resource_url,
                    pending.poll_count,
                    pending.started.elapsed()
                );
                return Ok(());
            }
            OperationStatus::Failed {
                status,
                code,
                message,
            } => {
                tracing::warn!(
                    "Operation on {} ended in {}: {} {}",
                    resource_url,
                    status,
                    code,
                    message
                );
                return Err(ProviderError::OperationFailed {
                    status,
                    code,
                    message,
                });
            }
            OperationStatus::Running => {}
            OperationStatus::Unknown(state) => {
                tracing::warn!("Unknown operation status '{}' for {}", state, resource_url);
            }
        }
        wait = next_wait.unwrap_or(client.poll_interval);
    }
}

/// Decide whether the initial response needs polling and against what
fn poll_target(resource_url: &str, initial: &ArmResponse) -> Option<PollTarget> {
    if let Some(url) = initial.header("azure-asyncoperation") {
        return Some(PollTarget::AsyncOperation(url.to_string()));
    }
    if initial.status == StatusCode::ACCEPTED {
        if let Some(url) = initial.header("location") {
            return Some(PollTarget::Location(url.to_string()));
        }
        return Some(PollTarget::Resource(resource_url.to_string()));
    }
    if initial.status == StatusCode::NO_CONTENT {
        return None;
    }

    match provisioning_state(&initial.body) {
        Some(state) if OperationStatus::from_state(state, &initial.body) == OperationStatus::Running => {
            Some(PollTarget::Resource(resource_url.to_string()))
        }
        _ => None,
    }
}

async fn poll_once(
    client: &ArmClient,
    pending: &PendingOperation,
) -> Result<(OperationStatus, Option<Duration>)> {
    let token = client.get_token().await?;
    match &pending.target {
        PollTarget::AsyncOperation(url) => {
            let response = client.http.get(url, &token).await?;
            let state = response
                .body
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("InProgress");
            Ok((
                OperationStatus::from_state(state, &response.body),
                retry_after(&response),
            ))
        }
        PollTarget::Location(url) => {
            let response = client.http.get(url, &token).await?;
            let status = if response.status == StatusCode::ACCEPTED {
                OperationStatus::Running
            } else {
                OperationStatus::Done
            };
            Ok((status, retry_after(&response)))
        }
        PollTarget::Resource(url) => match client.http.get(url, &token).await {
            Ok(response) => {
                if pending.delete {
                    return Ok((OperationStatus::Running, retry_after(&response)));
                }
                let status = match provisioning_state(&response.body) {
                    Some(state) => OperationStatus::from_state(state, &response.body),
                    None => OperationStatus::Done,
                };
                Ok((status, retry_after(&response)))
            }
            Err(e) if pending.delete && e.is_not_found() => Ok((OperationStatus::Done, None)),
            Err(e) => Err(e),
        },
    }
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body.pointer("/properties/provisioningState")
        .and_then(|v| v.as_str())
}

/// `Retry-After` in whole seconds
fn retry_after(response: &ArmResponse) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
