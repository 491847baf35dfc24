use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub slack: SlackConfig,
    pub visual_recognition: VisualRecognitionConfig,
    pub natural_language: NaturalLanguageConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    /// Pre-shared secret every event must present in its `token` field.
    pub verification_token: String,
    /// Bot token used for file downloads, deletions and posts.
    pub access_token: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisualRecognitionConfig {
    pub api_key: String,
    #[serde(default = "default_visual_recognition_url")]
    pub url: String,
    #[serde(default = "default_visual_recognition_version")]
    pub version: String,
    /// Minimum class score the service should report.
    #[serde(default = "default_classifier_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NaturalLanguageConfig {
    /// IAM key; takes precedence over username/password.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_natural_language_url")]
    pub url: String,
    #[serde(default = "default_natural_language_version")]
    pub version: String,
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: u32,
}

impl NaturalLanguageConfig {
    /// Basic-auth pair for the analyze endpoint.
    pub fn credentials(&self) -> Option<(String, String)> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Some(("apikey".to_string(), key.to_string()));
        }
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() => {
                Some((user.to_string(), pass.to_string()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModerationConfig {
    #[serde(default = "default_explicit_notice")]
    pub explicit_notice: String,
    #[serde(default = "default_civility_notice")]
    pub civility_notice: String,
    /// Disgust or anger strictly above this marks text as hostile.
    #[serde(default = "default_hostility_threshold")]
    pub hostility_threshold: f64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            explicit_notice: default_explicit_notice(),
            civility_notice: default_civility_notice(),
            hostility_threshold: default_hostility_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Where downloaded images are staged; the system temp dir when unset.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
            staging_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_visual_recognition_url() -> String {
    "https://gateway.watsonplatform.net/visual-recognition/api".to_string()
}

fn default_visual_recognition_version() -> String {
    "2016-05-20".to_string()
}

fn default_classifier_threshold() -> f64 {
    0.6
}

fn default_natural_language_url() -> String {
    "https://gateway.watsonplatform.net/natural-language-understanding/api".to_string()
}

fn default_natural_language_version() -> String {
    "2018-03-16".to_string()
}

fn default_keyword_limit() -> u32 {
    2
}

fn default_explicit_notice() -> String {
    "File removed due to containing explicit content".to_string()
}

fn default_civility_notice() -> String {
    "please be more polite ...".to_string()
}

fn default_hostility_threshold() -> f64 {
    0.5
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.slack.verification_token.trim().is_empty() {
            bail!("slack.verification_token must not be empty");
        }
        if self.slack.access_token.trim().is_empty() {
            bail!("slack.access_token must not be empty");
        }
        if self.visual_recognition.api_key.trim().is_empty() {
            bail!("visual_recognition.api_key must not be empty");
        }
        if self.natural_language.credentials().is_none() {
            bail!("natural_language needs either api_key or username and password");
        }
        if !(0.0..=1.0).contains(&self.visual_recognition.threshold) {
            bail!(
                "visual_recognition.threshold must be within [0, 1], got {}",
                self.visual_recognition.threshold
            );
        }
        if !(0.0..=1.0).contains(&self.moderation.hostility_threshold) {
            bail!(
                "moderation.hostility_threshold must be within [0, 1], got {}",
                self.moderation.hostility_threshold
            );
        }
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be at least 1");
        }
        Ok(())
    }
}
