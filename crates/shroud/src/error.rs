use crate::store::StoreError;

/// Error types that can occur inside the privacy pipeline.
///
/// Every kind carries one stable machine-readable code (see
/// [`ShroudError::code`]) so callers can branch without string-matching the
/// display output.
#[derive(Debug, thiserror::Error)]
pub enum ShroudError {
    /// Empty or malformed input handed to the detector.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The detector emitted a label the configured replacer cannot handle.
    #[error("unsupported entity label `{0}`")]
    UnsupportedEntity(String),
    /// An assistant message carries a tool call without an id; the turn
    /// cannot be redacted reliably.
    #[error("tool call is missing an id")]
    MissingToolCallId,
    /// The detector could not be reached after bounded retries.
    #[error("detector unavailable: {0}")]
    DetectorUnavailable(String),
    /// The wrapped LLM backend failed for this turn.
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),
    /// A storage backend could not be reached after bounded retries.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Overlapping spans, a broken span/text correspondence, or a mapping
    /// bijection violation.
    #[error("integrity violation: {0}")]
    Integrity(String),
    /// Invalid component combination or bad configuration file.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Message (de)serialisation failure.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ShroudError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ShroudError::InvalidInput(_) => "invalid_input",
            ShroudError::UnsupportedEntity(_) => "unsupported_entity",
            ShroudError::MissingToolCallId => "missing_tool_call_id",
            ShroudError::DetectorUnavailable(_) => "detector_unavailable",
            ShroudError::LlmUnavailable(_) => "llm_unavailable",
            ShroudError::StoreUnavailable(_) => "store_unavailable",
            ShroudError::Integrity(_) => "integrity_error",
            ShroudError::Configuration(_) => "configuration_error",
            ShroudError::Codec(_) => "codec_error",
        }
    }
}

impl From<StoreError> for ShroudError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => {
                ShroudError::InvalidInput(format!("no such entry: {what}"))
            }
            StoreError::Unavailable(msg) => ShroudError::StoreUnavailable(msg),
            StoreError::Codec(msg) => ShroudError::Codec(msg),
            StoreError::Integrity(msg) => ShroudError::Integrity(msg),
            StoreError::Unsupported(op) => ShroudError::Configuration(format!(
                "operation `{op}` is not supported by the configured store backend"
            )),
        }
    }
}

impl From<serde_json::Error> for ShroudError {
    fn from(err: serde_json::Error) -> Self {
        ShroudError::Codec(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}

impl From<url::ParseError> for ShroudError {
    fn from(err: url::ParseError) -> Self {
        ShroudError::Configuration(format!("error parsing provided url: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ShroudError::InvalidInput("x".into()).code(),
            "invalid_input"
        );
        assert_eq!(ShroudError::MissingToolCallId.code(), "missing_tool_call_id");
        assert_eq!(
            ShroudError::DetectorUnavailable("x".into()).code(),
            "detector_unavailable"
        );
        assert_eq!(ShroudError::Integrity("x".into()).code(), "integrity_error");
    }

    #[test]
    fn unsupported_store_op_maps_to_configuration() {
        let err: ShroudError = StoreError::Unsupported("put").into();
        assert_eq!(err.code(), "configuration_error");
    }
}
