//! HTTP utilities for ARM REST API calls

use crate::error::{ProviderError, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and masks potentially sensitive patterns
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Error envelope returned by ARM
#[derive(Debug, Deserialize)]
struct ArmErrorEnvelope {
    error: ArmErrorBody,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// A successful ARM response: status, the headers needed for polling, and the JSON body
#[derive(Debug, Clone)]
pub struct ArmResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ArmResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("azrm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, token: &str) -> Result<ArmResponse> {
        self.send(Method::GET, url, token, None).await
    }

    /// Make a PUT request with a JSON body
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<ArmResponse> {
        self.send(Method::PUT, url, token, Some(body)).await
    }

    /// Make a PATCH request with a JSON body
    pub async fn patch(&self, url: &str, token: &str, body: &Value) -> Result<ArmResponse> {
        self.send(Method::PATCH, url, token, Some(body)).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str, token: &str) -> Result<ArmResponse> {
        self.send(Method::DELETE, url, token, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<ArmResponse> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("{} {} (request id {})", method, url, request_id);

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header("x-ms-client-request-id", &request_id);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(parse_api_error(status, &text));
        }

        // Handle empty response
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        Ok(ArmResponse {
            status,
            headers,
            body,
        })
    }
}

/// Turn a non-success ARM response into a `ProviderError::Api`
fn parse_api_error(status: StatusCode, body: &str) -> ProviderError {
    let (code, message) = match serde_json::from_str::<ArmErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (
            status
                .canonical_reason()
                .unwrap_or("UnknownError")
                .replace(' ', ""),
            sanitize_for_log(body),
        ),
    };

    ProviderError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Format an ARM API error for display, keeping ARM's own code and message
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_arm_error(error: &ProviderError) -> String {
    let (status, code, message) = match error {
        ProviderError::Api {
            status,
            code,
            message,
        } => (*status, code, message),
        ProviderError::Context { source, .. } => {
            return format!("{} ({})", error, format_arm_error(source));
        }
        _ => return error.to_string(),
    };

    let hint = match status {
        403 => "Permission denied. Check the role assignments of the principal.",
        401 => "Authentication failed. Check ARM_CLIENT_ID / ARM_CLIENT_SECRET.",
        404 => "Resource not found.",
        429 => "Rate limit exceeded. Please try again later.",
        409 => "Resource conflict. The resource may already exist or be in use.",
        500 | 503 => "Azure service temporarily unavailable. Please try again.",
        _ => return error.to_string(),
    };

    if message.is_empty() {
        hint.to_string()
    } else {
        format!("{} {}: {}", hint, code, sanitize_for_log(message))
    }
}
