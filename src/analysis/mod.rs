//! Content analysis backed by the Watson image and text services.

pub mod language;
pub mod vision;

use async_trait::async_trait;

use crate::error::Result;
use crate::staging::StagedImage;

pub use language::AnalysisResponse;
pub use vision::ClassifyResponse;

/// Labels an uploaded image with the `explicit` classifier.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, image: &StagedImage) -> Result<ClassifyResponse>;
}

/// Extracts keywords with emotion and sentiment scores from text.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<AnalysisResponse>;
}
