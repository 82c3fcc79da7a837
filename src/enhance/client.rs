use crate::enhance::{EnhanceResponse, EnhancementApi, EnhancementStyle};
use crate::error::ApiError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EnhanceRequest<'a> {
    text: &'a str,
    enhancement_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the hosted enhancement endpoint (`POST {base}/enhance`).
pub struct HttpEnhancementClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEnhancementClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("selection-bubble/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: enhance_endpoint(base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EnhancementApi for HttpEnhancementClient {
    async fn enhance(
        &self,
        text: &str,
        style: EnhancementStyle,
        bearer_token: &str,
    ) -> Result<EnhanceResponse, ApiError> {
        let body = EnhanceRequest {
            text,
            enhancement_type: style.as_str(),
        };

        debug!(endpoint = %self.endpoint, style = style.as_str(), "POST enhance");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(bearer_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &bytes));
        }

        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

fn enhance_endpoint(base_url: &str) -> String {
    format!("{}/enhance", base_url.trim_end_matches('/'))
}

/// Message of a non-2xx reply: the JSON `error` field when present, else
/// `HTTP <code>: <reason>`.
fn failure_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        })
}

fn classify_failure(status: StatusCode, body: &[u8]) -> ApiError {
    let message = failure_message(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(message),
        _ => ApiError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            enhance_endpoint("https://api.example.com/v1/"),
            "https://api.example.com/v1/enhance"
        );
        assert_eq!(
            enhance_endpoint("http://localhost:8787"),
            "http://localhost:8787/enhance"
        );
    }

    #[test]
    fn error_field_is_preferred() {
        let err = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            br#"{"error":"Daily token limit reached"}"#,
        );
        assert_eq!(
            err,
            ApiError::Server {
                status: 429,
                message: "Daily token limit reached".to_string()
            }
        );
    }

    #[test]
    fn falls_back_to_status_line() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
        assert_eq!(
            err,
            ApiError::Server {
                status: 502,
                message: "HTTP 502: Bad Gateway".to_string()
            }
        );
    }

    #[test]
    fn auth_statuses_are_unauthorized() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, b""),
            ApiError::Unauthorized(message) if message == "HTTP 401: Unauthorized"
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, br#"{"error":"expired"}"#),
            ApiError::Unauthorized(message) if message == "expired"
        ));
    }

    #[test]
    fn request_body_uses_wire_names() {
        let body = EnhanceRequest {
            text: "hi there",
            enhancement_type: EnhancementStyle::Concise.as_str(),
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"text":"hi there","enhancement_type":"concise"}"#
        );
    }

    #[test]
    fn response_parses_optional_fields() {
        let response: EnhanceResponse = serde_json::from_str(
            r#"{"enhanced_text":"Hi.","tokens_used_this_request":3,
                "tokens_used_today":10,"tokens_remaining_today":990}"#,
        )
        .unwrap();
        assert_eq!(response.enhanced_text, "Hi.");
        assert_eq!(response.daily_limit, None);
        assert_eq!(response.usage().tokens_remaining_today, 990);
    }
}
