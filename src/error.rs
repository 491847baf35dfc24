use std::fmt;

use thiserror::Error;

/// The external collaborator a failed call was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Slack,
    VisualRecognition,
    NaturalLanguage,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Slack => write!(f, "slack"),
            Service::VisualRecognition => write!(f, "visual recognition"),
            Service::NaturalLanguage => write!(f, "natural language understanding"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {body}")]
    Status {
        service: Service,
        status: reqwest::StatusCode,
        body: String,
    },

    /// Slack answers 200 with `ok: false` for most API failures.
    #[error("{service} API error: {reason}")]
    Api { service: Service, reason: String },

    #[error("malformed {service} response: {detail}")]
    MalformedResponse { service: Service, detail: String },

    #[error("failed to stage image: {0}")]
    Staging(#[from] std::io::Error),
}

impl ModerationError {
    pub fn transport(service: Service, source: reqwest::Error) -> Self {
        Self::Transport { service, source }
    }

    pub fn malformed(service: Service, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service,
            detail: detail.into(),
        }
    }

    /// Which collaborator caused the failure, if any.
    pub fn service(&self) -> Option<Service> {
        match self {
            Self::Transport { service, .. }
            | Self::Status { service, .. }
            | Self::Api { service, .. }
            | Self::MalformedResponse { service, .. } => Some(*service),
            Self::Staging(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModerationError>;
