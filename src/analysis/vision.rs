use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::analysis::ImageClassifier;
use crate::config::VisualRecognitionConfig;
use crate::error::{ModerationError, Result, Service};
use crate::http;
use crate::staging::StagedImage;

pub const EXPLICIT_CLASSIFIER: &str = "explicit";
pub const EXPLICIT_CLASS: &str = "explicit";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub images: Vec<ImageResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageResult {
    #[serde(default)]
    pub classifiers: Vec<ClassifierResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierResult {
    pub classifier_id: String,
    #[serde(default)]
    pub classes: Vec<ImageClass>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageClass {
    pub class: String,
    #[serde(default)]
    pub score: f64,
}

impl ClassifyResponse {
    /// The image is explicit iff the top-ranked class of the `explicit`
    /// classifier is itself `explicit`.
    ///
    /// A response with no image entry is malformed. A missing classifier entry
    /// or an empty class list (everything fell under the threshold) is clean.
    pub fn is_explicit(&self) -> Result<bool> {
        let image = self.images.first().ok_or_else(|| {
            ModerationError::malformed(Service::VisualRecognition, "response has no images")
        })?;

        Ok(image
            .classifiers
            .iter()
            .filter(|c| c.classifier_id == EXPLICIT_CLASSIFIER)
            .filter_map(|c| c.classes.first())
            .any(|top| top.class == EXPLICIT_CLASS))
    }
}

/// Visual Recognition v3 client.
pub struct VisualRecognitionClient {
    client: reqwest::Client,
    config: VisualRecognitionConfig,
}

impl VisualRecognitionClient {
    pub fn new(client: reqwest::Client, config: VisualRecognitionConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ImageClassifier for VisualRecognitionClient {
    async fn classify(&self, image: &StagedImage) -> Result<ClassifyResponse> {
        let url = format!("{}/v3/classify", self.config.url.trim_end_matches('/'));
        let bytes = image.read().await?;

        let part = Part::bytes(bytes)
            .file_name(image.file_name().to_string())
            .mime_str(image.mime_type())
            .map_err(|e| ModerationError::transport(Service::VisualRecognition, e))?;
        let form = Form::new().part("images_file", part);

        let threshold = self.config.threshold.to_string();
        let request = self
            .client
            .post(&url)
            .basic_auth("apikey", Some(&self.config.api_key))
            .query(&[
                ("version", self.config.version.as_str()),
                ("classifier_ids", EXPLICIT_CLASSIFIER),
                ("threshold", threshold.as_str()),
            ])
            .multipart(form);

        let response: ClassifyResponse =
            http::send_json(Service::VisualRecognition, request).await?;
        info!("Image {} classified", image.file_name());
        for class in response
            .images
            .iter()
            .flat_map(|i| &i.classifiers)
            .flat_map(|c| &c.classes)
        {
            debug!("  {} scored {:.3}", class.class, class.score);
        }
        Ok(response)
    }
}
