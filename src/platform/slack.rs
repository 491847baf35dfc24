use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SlackConfig;
use crate::error::{ModerationError, Result, Service};
use crate::http;
use crate::platform::ChatPlatform;

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API client authenticated with the bot access token.
pub struct SlackClient {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl SlackClient {
    pub fn new(client: reqwest::Client, config: &SlackConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: config.access_token.trim().to_string(),
        }
    }

    async fn call_form(&self, method: &str, form: &[(&str, &str)]) -> Result<()> {
        let url = format!("{}/{}", self.api_base, method);
        debug!("Calling Slack {}", url);

        let response: SlackApiResponse =
            http::send_json(Service::Slack, self.client.post(&url).form(form)).await?;

        if !response.ok {
            return Err(ModerationError::Api {
                service: Service::Slack,
                reason: format!(
                    "{} failed: {}",
                    method,
                    response.error.unwrap_or_else(|| "unknown error".to_string())
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        let response = http::send(
            Service::Slack,
            self.client.get(url).bearer_auth(&self.access_token),
        )
        .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ModerationError::transport(Service::Slack, e))?;
        info!("Downloaded {} bytes from Slack", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.call_form(
            "files.delete",
            &[("token", self.access_token.as_str()), ("file", file_id)],
        )
        .await
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.call_form(
            "chat.postMessage",
            &[
                ("token", self.access_token.as_str()),
                ("channel", channel),
                ("text", text),
            ],
        )
        .await
    }
}
