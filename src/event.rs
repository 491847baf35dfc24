//! Slack Events API payloads and their classification into moderation cases.
//!
//! Slack delivers many event shapes through the same endpoint. Decoding never
//! fails on an unfamiliar shape: a field of the wrong type reads as absent, so
//! the token check still runs and the delivery is acknowledged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// MIME types the image branch accepts. Matching is exact and case-sensitive.
pub const SUPPORTED_IMAGES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

const FILE_SHARE: &str = "file_share";
const BOT_MESSAGE: &str = "bot_message";

/// Decode a field, falling back to its default when the JSON has another shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// The outer envelope Slack POSTs for every delivery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventEnvelope {
    #[serde(default, deserialize_with = "lenient")]
    pub token: String,
    #[serde(default, deserialize_with = "lenient")]
    pub challenge: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub envelope_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub event: Option<MessageEvent>,
}

impl EventEnvelope {
    /// Read a delivery body. A body that is not a JSON object yields an empty
    /// envelope, which fails token verification.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e| {
            debug!("Delivery is not an event envelope: {}", e);
            Self::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    /// Only message events carry a channel id here; others use an object.
    #[serde(default, deserialize_with = "lenient")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    /// Raw file entries; tombstones such as `hidden_by_limit` lack most fields.
    #[serde(default, deserialize_with = "lenient")]
    pub files: Vec<Value>,
}

impl MessageEvent {
    /// The first attached file, if it carries everything a download needs.
    pub fn first_file(&self) -> Option<FileRef> {
        let entry = self.files.first()?;
        serde_json::from_value(entry.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileRef {
    pub id: String,
    #[serde(rename = "url_private")]
    pub url: String,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    #[serde(default, deserialize_with = "lenient")]
    pub size: u64,
}

impl FileRef {
    pub fn is_supported_image(&self) -> bool {
        SUPPORTED_IMAGES.contains(&self.mime_type.as_str())
    }

    /// File extension matching the MIME type, used for the staged upload.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            _ => "jpg",
        }
    }
}

/// One delivery, reduced to the case the moderator acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationEvent {
    Challenge(String),
    ImageShare { channel: String, file: FileRef },
    BotEcho,
    Text { channel: String, text: String },
    Other,
}

impl ModerationEvent {
    /// Classify an envelope. Token verification happens before this.
    pub fn classify(envelope: &EventEnvelope) -> Self {
        if let Some(challenge) = &envelope.challenge {
            return Self::Challenge(challenge.clone());
        }

        let Some(event) = &envelope.event else {
            return Self::Other;
        };
        let subtype = event.subtype.as_deref();

        // An image share never reaches the text branch, even with a caption.
        if subtype == Some(FILE_SHARE) {
            if let (Some(channel), Some(file)) = (&event.channel, event.first_file()) {
                if file.is_supported_image() {
                    return Self::ImageShare {
                        channel: channel.clone(),
                        file,
                    };
                }
            }
        }

        if subtype == Some(BOT_MESSAGE) {
            return Self::BotEcho;
        }

        match (&event.channel, event.text.as_deref()) {
            (Some(channel), Some(text)) if !text.is_empty() => Self::Text {
                channel: channel.clone(),
                text: text.to_string(),
            },
            _ => Self::Other,
        }
    }
}

/// What goes back to Slack on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventResponse {
    Challenge { challenge: String },
    Payload { payload: String },
}

impl EventResponse {
    pub fn done() -> Self {
        Self::Payload {
            payload: "Done".to_string(),
        }
    }
}
