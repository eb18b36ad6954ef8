//! Failure taxonomy for event handling.
//!
//! Everything below [`Error::Configuration`] is contained by the pipeline and
//! rendered to the user with [`Error::diagnostic`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid startup configuration. Fatal before serving.
    #[error("{0}")]
    Configuration(String),

    /// Bad command argument, unknown alias, unknown key.
    #[error("{0}")]
    Validation(String),

    /// Voice input, images against a non-vision model, stickers and the like.
    #[error("{0}")]
    UnsupportedContent(String),

    #[error("free usage limit of {limit} messages reached")]
    QuotaExceeded { limit: u32 },

    #[error("{source}")]
    CompletionService {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The front end could not deliver an attachment. Retryable.
    #[error("attachment download failed: {source}")]
    Attachment {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The completion service did not answer in time. Retryable.
    #[error("completion service timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedContent(message.into())
    }

    #[must_use]
    pub fn completion(source: anyhow::Error) -> Self {
        Self::CompletionService {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn attachment(source: anyhow::Error) -> Self {
        Self::Attachment {
            source: source.into(),
        }
    }

    /// Text shown to the user in place of a reply.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Configuration(_) | Self::Validation(_) | Self::UnsupportedContent(_) => {
                format!("⚠️{self}")
            },
            Self::QuotaExceeded { limit } => format!(
                "⚠️You have used all {limit} free messages. Ask the operator to add you to the allowlist."
            ),
            Self::Attachment { .. } => {
                "⚠️Could not download the photo. Please try again.".to_string()
            },
            Self::Timeout { secs } => format!(
                "⚠️The completion service did not answer within {secs}s. Please try again."
            ),
            Self::CompletionService { .. } | Self::Message { .. } => {
                format!("An error occurred. e: {self}")
            },
        }
    }

    /// Whether retrying the same input may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::CompletionService { .. } | Self::Attachment { .. }
        )
    }
}

impl parley_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

parley_common::impl_context!();

pub type Result<T> = std::result::Result<T, Error>;
