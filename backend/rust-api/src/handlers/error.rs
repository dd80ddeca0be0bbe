use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use validator::ValidationErrors;

use crate::error::{camel_case, GradingError, ValidationIssue};

#[derive(Debug)]
pub enum ApiError {
    BadRequest {
        message: String,
        issues: Vec<ValidationIssue>,
    },
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable {
        message: String,
        diagnostics: Option<String>,
    },
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GradingError> for ApiError {
    fn from(err: GradingError) -> Self {
        match err {
            GradingError::Validation(issues) => ApiError::BadRequest {
                message: "Validation failed".to_string(),
                issues,
            },
            GradingError::ExternalProcessing {
                message,
                diagnostics,
            } => ApiError::Unprocessable {
                message,
                diagnostics,
            },
            e @ GradingError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            e @ GradingError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            GradingError::InvalidState(message) => ApiError::Conflict(message),
            GradingError::Storage(message) => {
                tracing::error!("Storage failure: {}", message);
                ApiError::Internal("Internal storage error".to_string())
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut issues: Vec<ValidationIssue> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    ValidationIssue::new(camel_case(&field), message)
                })
            })
            .collect();
        if issues.is_empty() {
            issues.push(ValidationIssue::new("body", errors.to_string()));
        }
        issues.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::BadRequest {
            message: "Validation failed".to_string(),
            issues,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest { message, issues } if issues.is_empty() => {
                json!({ "message": message, "status": status.as_u16() })
            }
            ApiError::BadRequest { message, issues } => {
                json!({ "message": message, "status": status.as_u16(), "issues": issues })
            }
            ApiError::Unprocessable {
                message,
                diagnostics,
            } => json!({
                "message": message,
                "status": status.as_u16(),
                "diagnostics": diagnostics,
            }),
            ApiError::Forbidden(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::Internal(message) => {
                json!({ "message": message, "status": status.as_u16() })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        let cases = vec![
            (GradingError::validation("keys", "empty"), StatusCode::BAD_REQUEST),
            (GradingError::not_found("exam", "e1"), StatusCode::NOT_FOUND),
            (GradingError::conflict("attempt", "a1"), StatusCode::CONFLICT),
            (
                GradingError::InvalidState("attempt is already finished".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                GradingError::processing("scanner timed out after 60s", None),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                GradingError::Storage("connection reset".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn storage_details_are_not_leaked() {
        match ApiError::from(GradingError::Storage("mongodb://secret-host".to_string())) {
            ApiError::Internal(message) => assert!(!message.contains("secret-host")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
