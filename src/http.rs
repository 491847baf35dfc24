use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ModerationError, Service};

/// Build the shared reqwest client. Every outbound call is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static(concat!(
            "slack-moderator/",
            env!("CARGO_PKG_VERSION")
        )),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Send a request and fail on transport errors or non-success statuses.
pub async fn send(
    service: Service,
    request: reqwest::RequestBuilder,
) -> crate::error::Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| ModerationError::transport(service, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ModerationError::Status {
            service,
            status,
            body,
        });
    }

    Ok(response)
}

/// Send a request and decode its JSON body.
pub async fn send_json<T: DeserializeOwned>(
    service: Service,
    request: reqwest::RequestBuilder,
) -> crate::error::Result<T> {
    let response = send(service, request).await?;
    let body = response
        .text()
        .await
        .map_err(|e| ModerationError::transport(service, e))?;
    debug!("{} response: {}", service, body);

    serde_json::from_str(&body).map_err(|e| ModerationError::malformed(service, e.to_string()))
}
