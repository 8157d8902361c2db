#![forbid(unsafe_code)]

use thiserror::Error;

/// Failure of one pane's annotation load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport client rejected the request (network, server error).
    #[error("transport rejected the load: {0}")]
    Rejected(String),
    /// The payload could not be decoded as a compact annotated text.
    #[error("malformed annotation payload: {0}")]
    Malformed(String),
    /// No response arrived within the configured load timeout.
    #[error("annotation load timed out after {after_ms} ms")]
    TimedOut { after_ms: u64 },
}

/// Failure reported by the rendering widget's apply call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidgetError {
    #[error("widget failed to apply annotations: {0}")]
    Apply(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to parse editor config JSON: {0}")]
    Json(String),
    #[error("invalid editor config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Whole-payload decoding failure. Individual malformed records are skipped,
/// see [`crate::compact::UnpackReport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnpackError {
    #[error("failed to parse compact annotated text: {0}")]
    Json(String),
    #[error("document window is inverted: [{start}, {end})")]
    InvalidWindow { start: usize, end: usize },
}

impl From<UnpackError> for TransportError {
    fn from(err: UnpackError) -> Self {
        Self::Malformed(err.to_string())
    }
}
