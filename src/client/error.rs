//! Failure kinds surfaced by [`super::ChatClient::send_chat`].

use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub(crate) const MAX_BODY_DETAIL_CHARS: usize = 1000;

/// Diagnostic body captured from a non-success upstream response.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    Text(String),
}

impl UpstreamBody {
    /// Parses `raw` as JSON when possible, otherwise keeps its first
    /// [`MAX_BODY_DETAIL_CHARS`] characters. Empty bodies yield `None`.
    pub(crate) fn capture(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(Self::Json(value)),
            Err(_) => Some(Self::Text(truncate_chars(raw, MAX_BODY_DETAIL_CHARS))),
        }
    }
}

impl fmt::Display for UpstreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

pub(crate) fn truncate_chars(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => raw[..idx].to_string(),
        None => raw.to_string(),
    }
}

fn describe_body(body: &Option<UpstreamBody>) -> String {
    body.as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<empty body>".to_string())
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Unauthorized - invalid API key for provider")]
    Unauthorized,

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Upstream API error (status {status}): {}", describe_body(.body))]
    Upstream {
        status: u16,
        body: Option<UpstreamBody>,
    },

    #[error("Malformed response from provider")]
    MalformedResponse {
        #[source]
        source: Option<BoxError>,
    },

    #[error("The request to the LLM API timed out.")]
    Timeout {
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not connect to the LLM API. Check network.")]
    ConnectionFailure {
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected error when calling the LLM API. Check logs for details.")]
    Unexpected {
        #[source]
        source: BoxError,
    },
}

impl ChatError {
    pub(crate) fn malformed(source: impl Into<BoxError>) -> Self {
        Self::MalformedResponse {
            source: Some(source.into()),
        }
    }

    pub(crate) fn unexpected(source: impl Into<BoxError>) -> Self {
        Self::Unexpected {
            source: source.into(),
        }
    }

    /// Stable machine-readable identifier for the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::Upstream { .. } => "upstream_error",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Timeout { .. } => "timeout",
            Self::ConnectionFailure { .. } => "connection_error",
            Self::Unexpected { .. } => "unexpected_error",
        }
    }

    /// HTTP status most closely describing the failure, when one applies.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::RateLimited => Some(429),
            Self::Upstream { status, .. } => Some(*status),
            Self::Timeout { .. } => Some(504),
            Self::ConnectionFailure { .. } => Some(503),
            Self::MalformedResponse { .. } | Self::Unexpected { .. } => None,
        }
    }
}
