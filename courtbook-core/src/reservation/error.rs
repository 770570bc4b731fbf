use serde::Serialize;
use thiserror::Error;

use crate::browser::AdapterError;

pub type BookingResult<T> = Result<T, BookingError>;

/// Fatal conditions of a booking run. None of them is retried; a retry is a
/// whole new run started by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BookingError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),
    #[error("run cancelled by operator")]
    Cancelled,
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BookingError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BookingError::Cancelled)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Configuration(_) => "configuration",
            BookingError::Navigation(_) => "navigation",
            BookingError::ElementNotFound(_) => "element_not_found",
            BookingError::Timeout(_) => "timeout",
            BookingError::SubmissionRejected(_) => "submission_rejected",
            BookingError::Cancelled => "cancelled",
            BookingError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<AdapterError> for BookingError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Launch(detail) | AdapterError::Navigation(detail) => {
                BookingError::Navigation(detail)
            }
            AdapterError::NotFound(detail) => BookingError::ElementNotFound(detail),
            AdapterError::Timeout(detail) => BookingError::Timeout(detail),
            AdapterError::Configuration(detail) => BookingError::Configuration(detail),
            AdapterError::Backend(detail) => BookingError::Unexpected(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_map_onto_the_booking_taxonomy() {
        assert_eq!(
            BookingError::from(AdapterError::NotFound(".field-box".into())).kind(),
            "element_not_found"
        );
        assert_eq!(
            BookingError::from(AdapterError::Launch("no chromium".into())).kind(),
            "navigation"
        );
        assert_eq!(
            BookingError::from(AdapterError::Backend("socket closed".into())).kind(),
            "unexpected"
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(BookingError::SubmissionRejected("disabled".into()))
            .unwrap();
        assert_eq!(json["kind"], "submission_rejected");
        assert_eq!(json["detail"], "disabled");
    }
}
