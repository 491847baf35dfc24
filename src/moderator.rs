use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analysis::{ImageClassifier, TextAnalyzer};
use crate::config::ModerationConfig;
use crate::error::Result;
use crate::event::{EventEnvelope, EventResponse, FileRef, ModerationEvent};
use crate::platform::ChatPlatform;
use crate::staging::StagedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TokenMismatch,
}

/// What the moderator did with an acknowledged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FileRemoved { file_id: String },
    ImageCleared,
    CivilityWarned,
    TextCleared,
    BotEchoIgnored,
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rejected(RejectReason),
    Challenge(String),
    Acknowledged(Action),
}

impl Outcome {
    /// The wire payload; a rejected event gets none.
    pub fn response(&self) -> Option<EventResponse> {
        match self {
            Outcome::Rejected(_) => None,
            Outcome::Challenge(challenge) => Some(EventResponse::Challenge {
                challenge: challenge.clone(),
            }),
            Outcome::Acknowledged(_) => Some(EventResponse::done()),
        }
    }
}

/// Handles one Slack event: verify, classify, analyze, act.
pub struct Moderator {
    verification_token: String,
    platform: Arc<dyn ChatPlatform>,
    classifier: Arc<dyn ImageClassifier>,
    analyzer: Arc<dyn TextAnalyzer>,
    policy: ModerationConfig,
    staging_dir: PathBuf,
}

impl Moderator {
    pub fn new(
        verification_token: String,
        platform: Arc<dyn ChatPlatform>,
        classifier: Arc<dyn ImageClassifier>,
        analyzer: Arc<dyn TextAnalyzer>,
        policy: ModerationConfig,
    ) -> Self {
        Self {
            verification_token,
            platform,
            classifier,
            analyzer,
            policy,
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Stage downloaded images under `dir` instead of the system temp dir.
    pub fn with_staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = dir;
        self
    }

    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<Outcome> {
        let span = info_span!("event", id = %Uuid::new_v4());
        self.handle_inner(envelope).instrument(span).await
    }

    async fn handle_inner(&self, envelope: &EventEnvelope) -> Result<Outcome> {
        debug!("Validating {:?} delivery", envelope.envelope_type);
        if envelope.token != self.verification_token {
            warn!("Presented with invalid token, ignoring event");
            return Ok(Outcome::Rejected(RejectReason::TokenMismatch));
        }

        let action = match ModerationEvent::classify(envelope) {
            ModerationEvent::Challenge(challenge) => {
                info!("Answering URL verification challenge");
                return Ok(Outcome::Challenge(challenge));
            }
            ModerationEvent::ImageShare { channel, file } => {
                self.moderate_image(&channel, &file).await?
            }
            ModerationEvent::BotEcho => {
                info!("Skipping bot message");
                Action::BotEchoIgnored
            }
            ModerationEvent::Text { channel, text } => self.moderate_text(&channel, &text).await?,
            ModerationEvent::Other => {
                info!("Nothing to moderate");
                Action::Nothing
            }
        };

        Ok(Outcome::Acknowledged(action))
    }

    async fn moderate_image(&self, channel: &str, file: &FileRef) -> Result<Action> {
        info!(
            "Checking {} ({}, {} bytes) for explicit content",
            file.id, file.mime_type, file.size
        );

        let bytes = self.platform.download_file(&file.url).await?;
        let explicit = {
            let staged = StagedImage::stage(&self.staging_dir, file, bytes).await?;
            self.classifier.classify(&staged).await?.is_explicit()?
        };

        if !explicit {
            info!("Image {} is clean", file.id);
            return Ok(Action::ImageCleared);
        }

        info!("Image {} is explicit, deleting it", file.id);
        self.platform.delete_file(&file.id).await?;
        self.platform
            .post_message(channel, &self.policy.explicit_notice)
            .await?;

        Ok(Action::FileRemoved {
            file_id: file.id.clone(),
        })
    }

    async fn moderate_text(&self, channel: &str, text: &str) -> Result<Action> {
        info!("Analyzing text message in {}", channel);

        let analysis = self.analyzer.analyze(text).await?;
        let Some(emotion) = analysis.top_emotion()? else {
            return Ok(Action::TextCleared);
        };

        if !emotion.is_hostile(self.policy.hostility_threshold) {
            return Ok(Action::TextCleared);
        }

        info!(
            "Inappropriate text (disgust {:.2}, anger {:.2})",
            emotion.disgust, emotion.anger
        );
        self.platform
            .post_message(channel, &self.policy.civility_notice)
            .await?;
        Ok(Action::CivilityWarned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisResponse, ClassifyResponse};
    use crate::error::{ModerationError, Service};
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Download(String),
        Delete(String),
        Post(String, String),
        Classify(String),
        Analyze(String),
    }

    type CallLog = Arc<Mutex<Vec<Call>>>;

    /// A Slack action the fake should refuse.
    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Refuse {
        Delete,
        Post,
    }

    struct FakeSlack {
        calls: CallLog,
        refuse: Option<Refuse>,
    }

    impl FakeSlack {
        fn refused(&self, action: Refuse, reason: &str) -> Result<()> {
            if self.refuse == Some(action) {
                return Err(ModerationError::Api {
                    service: Service::Slack,
                    reason: reason.to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ChatPlatform for FakeSlack {
        async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(Call::Download(url.to_string()));
            Ok(b"image-bytes".to_vec())
        }

        async fn delete_file(&self, file_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Delete(file_id.to_string()));
            self.refused(Refuse::Delete, "cant_delete_file")
        }

        async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Post(channel.to_string(), text.to_string()));
            self.refused(Refuse::Post, "not_in_channel")
        }
    }

    /// Returns a canned response, or a 500 when `response` is None.
    struct FakeClassifier {
        calls: CallLog,
        response: Option<serde_json::Value>,
        staged_paths: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ImageClassifier for FakeClassifier {
        async fn classify(&self, image: &StagedImage) -> Result<ClassifyResponse> {
            assert_eq!(image.read().await.unwrap(), b"image-bytes");
            self.staged_paths
                .lock()
                .unwrap()
                .push(image.path().to_path_buf());
            self.calls
                .lock()
                .unwrap()
                .push(Call::Classify(image.file_name().to_string()));
            match &self.response {
                Some(value) => Ok(serde_json::from_value(value.clone()).unwrap()),
                None => Err(ModerationError::Status {
                    service: Service::VisualRecognition,
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "boom".to_string(),
                }),
            }
        }
    }

    struct FakeAnalyzer {
        calls: CallLog,
        response: serde_json::Value,
    }

    #[async_trait]
    impl TextAnalyzer for FakeAnalyzer {
        async fn analyze(&self, text: &str) -> Result<AnalysisResponse> {
            self.calls.lock().unwrap().push(Call::Analyze(text.to_string()));
            Ok(serde_json::from_value(self.response.clone()).unwrap())
        }
    }

    struct Harness {
        moderator: Moderator,
        calls: CallLog,
        classifier: Arc<FakeClassifier>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn staging_dir(&self) -> &Path {
            self.dir.path()
        }
    }

    fn classified_as(class: &str) -> Option<serde_json::Value> {
        Some(json!({
            "images": [{
                "classifiers": [{
                    "classifier_id": "explicit",
                    "classes": [{"class": class, "score": 0.9}]
                }]
            }]
        }))
    }

    fn emotions(disgust: f64, anger: f64) -> serde_json::Value {
        json!({
            "keywords": [{
                "text": "keyword",
                "relevance": 0.9,
                "emotion": {"sadness": 0.0, "joy": 0.0, "fear": 0.0, "disgust": disgust, "anger": anger}
            }]
        })
    }

    fn harness(classification: Option<serde_json::Value>, analysis: serde_json::Value) -> Harness {
        harness_refusing(classification, analysis, None)
    }

    fn harness_refusing(
        classification: Option<serde_json::Value>,
        analysis: serde_json::Value,
        refuse: Option<Refuse>,
    ) -> Harness {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(FakeClassifier {
            calls: calls.clone(),
            response: classification,
            staged_paths: Mutex::new(Vec::new()),
        });
        let moderator = Moderator::new(
            "verif".to_string(),
            Arc::new(FakeSlack {
                calls: calls.clone(),
                refuse,
            }),
            classifier.clone(),
            Arc::new(FakeAnalyzer {
                calls: calls.clone(),
                response: analysis,
            }),
            ModerationConfig::default(),
        )
        .with_staging_dir(dir.path().to_path_buf());
        Harness {
            moderator,
            calls,
            classifier,
            dir,
        }
    }

    fn envelope(value: serde_json::Value) -> EventEnvelope {
        serde_json::from_value(value).unwrap()
    }

    fn image_event(mimetype: &str) -> EventEnvelope {
        envelope(json!({
            "token": "verif",
            "event": {
                "channel": "C1",
                "subtype": "file_share",
                "text": "you are disgusting",
                "files": [{
                    "id": "F1",
                    "url_private": "https://files.slack.com/F1",
                    "mimetype": mimetype,
                    "size": 11
                }]
            }
        }))
    }

    fn text_event(text: &str) -> EventEnvelope {
        envelope(json!({
            "token": "verif",
            "event": {"channel": "C1", "text": text}
        }))
    }

    #[tokio::test]
    async fn test_token_mismatch_is_rejected_without_calls() {
        let h = harness(classified_as("explicit"), emotions(0.9, 0.9));
        let mut event = image_event("image/png");
        event.token = "forged".to_string();

        let outcome = h.moderator.handle(&event).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(RejectReason::TokenMismatch));
        assert_eq!(outcome.response(), None);
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_challenge_echoed_regardless_of_other_fields() {
        let h = harness(classified_as("explicit"), emotions(0.9, 0.9));
        let event = envelope(json!({
            "token": "verif",
            "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P",
            "type": "url_verification",
            "event": {"channel": "C1", "text": "you are disgusting"}
        }));

        let outcome = h.moderator.handle(&event).await.unwrap();
        assert_eq!(
            outcome.response(),
            Some(EventResponse::Challenge {
                challenge: "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P".to_string()
            })
        );
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_image_is_deleted_and_announced() {
        let h = harness(classified_as("explicit"), emotions(0.9, 0.9));

        let outcome = h.moderator.handle(&image_event("image/jpeg")).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Acknowledged(Action::FileRemoved {
                file_id: "F1".to_string()
            })
        );
        assert_eq!(outcome.response(), Some(EventResponse::done()));
        assert_eq!(
            h.calls(),
            vec![
                Call::Download("https://files.slack.com/F1".to_string()),
                Call::Classify("F1.jpg".to_string()),
                Call::Delete("F1".to_string()),
                Call::Post(
                    "C1".to_string(),
                    "File removed due to containing explicit content".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_clean_image_takes_no_action_and_skips_text() {
        for mime in ["image/png", "image/jpeg", "image/jpg"] {
            let h = harness(classified_as("default"), emotions(0.9, 0.9));

            let outcome = h.moderator.handle(&image_event(mime)).await.unwrap();
            assert_eq!(outcome, Outcome::Acknowledged(Action::ImageCleared));
            let calls = h.calls();
            assert_eq!(calls.len(), 2, "{mime}: {calls:?}");
            assert!(!calls
                .iter()
                .any(|c| matches!(c, Call::Analyze(_) | Call::Delete(_) | Call::Post(..))));
        }
    }

    #[tokio::test]
    async fn test_non_image_file_goes_to_text_branch() {
        let h = harness(classified_as("explicit"), emotions(0.9, 0.1));

        let outcome = h
            .moderator
            .handle(&image_event("application/pdf"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::CivilityWarned));
        assert_eq!(
            h.calls(),
            vec![
                Call::Analyze("you are disgusting".to_string()),
                Call::Post("C1".to_string(), "please be more polite ...".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_hostile_text_gets_civility_notice() {
        let h = harness(None, emotions(0.9, 0.1));

        let outcome = h.moderator.handle(&text_event("ugh gross")).await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::CivilityWarned));
        assert_eq!(
            h.calls(),
            vec![
                Call::Analyze("ugh gross".to_string()),
                Call::Post("C1".to_string(), "please be more polite ...".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mild_text_is_left_alone() {
        let h = harness(None, emotions(0.4, 0.3));

        let outcome = h.moderator.handle(&text_event("meh")).await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::TextCleared));
        assert_eq!(h.calls(), vec![Call::Analyze("meh".to_string())]);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let h = harness(None, emotions(0.5, 0.5));

        let outcome = h.moderator.handle(&text_event("borderline")).await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::TextCleared));
        assert!(!h.calls().iter().any(|c| matches!(c, Call::Post(..))));
    }

    #[tokio::test]
    async fn test_no_keywords_is_clean() {
        let h = harness(None, json!({"keywords": []}));

        let outcome = h.moderator.handle(&text_event("ok")).await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::TextCleared));
    }

    #[tokio::test]
    async fn test_bot_message_never_analyzed() {
        let h = harness(None, emotions(0.9, 0.9));
        let event = envelope(json!({
            "token": "verif",
            "event": {"channel": "C1", "subtype": "bot_message", "text": "please be more polite ..."}
        }));

        let outcome = h.moderator.handle(&event).await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::BotEchoIgnored));
        assert_eq!(outcome.response(), Some(EventResponse::done()));
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_event_acknowledged_without_calls() {
        let h = harness(None, emotions(0.9, 0.9));
        let event = envelope(json!({"token": "verif", "event": {"channel": "C1"}}));

        let outcome = h.moderator.handle(&event).await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::Nothing));
        assert_eq!(outcome.response(), Some(EventResponse::done()));
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_propagates_and_cleans_up() {
        let h = harness(None, emotions(0.9, 0.9));

        let err = h
            .moderator
            .handle(&image_event("image/png"))
            .await
            .unwrap_err();
        assert_eq!(err.service(), Some(Service::VisualRecognition));
        assert!(!h.calls().iter().any(|c| matches!(c, Call::Delete(_))));

        let staged = h.classifier.staged_paths.lock().unwrap().clone();
        assert_eq!(staged.len(), 1);
        assert!(!staged[0].exists());
        assert_eq!(std::fs::read_dir(h.staging_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_delete_posts_no_notice() {
        let h = harness_refusing(
            classified_as("explicit"),
            emotions(0.0, 0.0),
            Some(Refuse::Delete),
        );

        let err = h
            .moderator
            .handle(&image_event("image/png"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModerationError::Api {
                service: Service::Slack,
                ..
            }
        ));
        let calls = h.calls();
        assert_eq!(calls.last(), Some(&Call::Delete("F1".to_string())));
        assert!(!calls.iter().any(|c| matches!(c, Call::Post(..))));
    }

    #[tokio::test]
    async fn test_failed_explicit_notice_fails_event() {
        let h = harness_refusing(
            classified_as("explicit"),
            emotions(0.0, 0.0),
            Some(Refuse::Post),
        );

        let err = h
            .moderator
            .handle(&image_event("image/png"))
            .await
            .unwrap_err();
        assert_eq!(err.service(), Some(Service::Slack));
        assert!(h.calls().contains(&Call::Delete("F1".to_string())));
    }

    #[tokio::test]
    async fn test_failed_civility_notice_is_an_error() {
        let h = harness_refusing(None, emotions(0.9, 0.9), Some(Refuse::Post));

        let err = h
            .moderator
            .handle(&text_event("you are vile"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModerationError::Api {
                service: Service::Slack,
                ..
            }
        ));
        assert_eq!(
            h.calls(),
            vec![
                Call::Analyze("you are vile".to_string()),
                Call::Post("C1".to_string(), "please be more polite ...".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_event_acknowledged_without_calls() {
        let h = harness(classified_as("explicit"), emotions(0.9, 0.9));
        let event = EventEnvelope::from_value(json!({
            "token": "verif",
            "event": {"type": "channel_rename", "channel": {"id": "C1", "name": "renamed"}}
        }));

        let outcome = h.moderator.handle(&event).await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged(Action::Nothing));
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn test_staged_image_removed_after_success() {
        let h = harness(classified_as("explicit"), emotions(0.0, 0.0));

        h.moderator.handle(&image_event("image/png")).await.unwrap();

        let staged = h.classifier.staged_paths.lock().unwrap().clone();
        assert_eq!(staged.len(), 1);
        assert!(!staged[0].exists());
    }

    #[tokio::test]
    async fn test_custom_notice_is_posted() {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let moderator = Moderator::new(
            "verif".to_string(),
            Arc::new(FakeSlack {
                calls: calls.clone(),
                refuse: None,
            }),
            Arc::new(FakeClassifier {
                calls: calls.clone(),
                response: None,
                staged_paths: Mutex::new(Vec::new()),
            }),
            Arc::new(FakeAnalyzer {
                calls: calls.clone(),
                response: emotions(0.1, 0.8),
            }),
            ModerationConfig {
                civility_notice: "Keep it civil, please.".to_string(),
                ..ModerationConfig::default()
            },
        );

        moderator.handle(&text_event("grr")).await.unwrap();
        assert!(calls
            .lock()
            .unwrap()
            .contains(&Call::Post("C1".to_string(), "Keep it civil, please.".to_string())));
    }
}
