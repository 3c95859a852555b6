use lambda_http::http::StatusCode;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Every failure a request can end in. The variant name is the machine-checkable kind.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },
    #[error("{0}")]
    InvalidSignature(String),
    #[error("{0}")]
    PaymentInit(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::invalid_fields(vec![FieldError::new(field, message)])
    }

    pub fn invalid_fields(fields: Vec<FieldError>) -> Self {
        let message = fields
            .iter()
            .map(|f| format!("{}: {}", f.field, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        ApiError::Validation { message, fields }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Validation { .. } => "ValidationError",
            ApiError::InvalidSignature(_) => "InvalidSignature",
            ApiError::PaymentInit(_) => "PaymentInitError",
            ApiError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation { .. } | ApiError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            ApiError::PaymentInit(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::PaymentInit(_) => "Failed to create checkout session".to_string(),
            other => other.to_string(),
        }
    }

    pub fn fields(&self) -> &[FieldError] {
        match self {
            ApiError::Validation { fields, .. } => fields,
            _ => &[],
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("Serialization failed: {}", err))
    }
}

impl From<lambda_http::http::Error> for ApiError {
    fn from(err: lambda_http::http::Error) -> Self {
        ApiError::Internal(format!("Failed to build response: {}", err))
    }
}

/// Parse a JSON request body. An empty body parses as `T::default()`.
pub fn parse_body<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::validation("body", format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_statuses() {
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::InvalidSignature("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PaymentInit("x".into()).kind(), "PaymentInitError");
        assert_eq!(ApiError::validation("price", "must be positive").kind(), "ValidationError");
    }

    #[test]
    fn test_internal_details_are_not_public() {
        let err = ApiError::Internal("dynamo exploded at table foo".into());
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_validation_collects_fields() {
        let err = ApiError::invalid_fields(vec![
            FieldError::new("title", "is required"),
            FieldError::new("price", "must be positive"),
        ]);
        assert_eq!(err.fields().len(), 2);
        assert_eq!(err.to_string(), "title: is required; price: must be positive");
    }

    #[test]
    fn test_parse_body_empty_and_malformed() {
        let parsed: crate::types::FollowRequest = parse_body(b"").unwrap();
        assert!(parsed.trainer_id.is_none());

        let err = parse_body::<crate::types::FollowRequest>(b"{not json").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }
}
