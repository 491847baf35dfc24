use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::TextAnalyzer;
use crate::config::NaturalLanguageConfig;
use crate::error::{ModerationError, Result, Service};
use crate::http;

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    features: Features,
}

#[derive(Debug, Serialize)]
struct Features {
    entities: FeatureOptions,
    keywords: FeatureOptions,
}

#[derive(Debug, Serialize)]
struct FeatureOptions {
    emotion: bool,
    sentiment: bool,
    limit: u32,
}

impl FeatureOptions {
    fn scored(limit: u32) -> Self {
        Self {
            emotion: true,
            sentiment: true,
            limit,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub keywords: Vec<Keyword>,
}

/// Keywords arrive ordered by relevance; only the first one is read.
#[derive(Debug, Clone, Deserialize)]
pub struct Keyword {
    pub text: String,
    #[serde(default)]
    pub emotion: Option<Emotion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Emotion {
    pub disgust: f64,
    pub anger: f64,
}

impl Emotion {
    /// Either disgust or anger strictly above `threshold`.
    pub fn is_hostile(&self, threshold: f64) -> bool {
        self.disgust > threshold || self.anger > threshold
    }
}

impl AnalysisResponse {
    /// Emotion scores of the most relevant keyword, if any keyword came back.
    pub fn top_emotion(&self) -> Result<Option<Emotion>> {
        let Some(keyword) = self.keywords.first() else {
            return Ok(None);
        };
        keyword.emotion.map(Some).ok_or_else(|| {
            ModerationError::malformed(
                Service::NaturalLanguage,
                format!("keyword '{}' has no emotion scores", keyword.text),
            )
        })
    }
}

/// Natural Language Understanding v1 client.
pub struct NaturalLanguageClient {
    client: reqwest::Client,
    url: String,
    version: String,
    keyword_limit: u32,
    username: String,
    password: String,
}

impl NaturalLanguageClient {
    pub fn new(client: reqwest::Client, config: &NaturalLanguageConfig) -> anyhow::Result<Self> {
        let (username, password) = config
            .credentials()
            .ok_or_else(|| anyhow::anyhow!("natural_language credentials are not configured"))?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            version: config.version.clone(),
            keyword_limit: config.keyword_limit,
            username,
            password,
        })
    }
}

#[async_trait]
impl TextAnalyzer for NaturalLanguageClient {
    async fn analyze(&self, text: &str) -> Result<AnalysisResponse> {
        let url = format!("{}/v1/analyze", self.url);
        let body = AnalyzeRequest {
            text,
            features: Features {
                entities: FeatureOptions::scored(self.keyword_limit),
                keywords: FeatureOptions::scored(self.keyword_limit),
            },
        };

        let request = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("version", self.version.as_str())])
            .json(&body);

        let response: AnalysisResponse = http::send_json(Service::NaturalLanguage, request).await?;
        info!("Text analyzed: {} keyword(s)", response.keywords.len());
        Ok(response)
    }
}
