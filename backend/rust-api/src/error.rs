use serde::Serialize;
use thiserror::Error;

/// A single rejected input item, reported back to the caller so the input can be fixed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<i64>,
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            question_number: None,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn for_question(
        question_number: i64,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            question_number: Some(question_number),
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("validation failed: {}", describe_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// The OMR process failed or produced nothing usable.
    #[error("{message}")]
    ExternalProcessing {
        message: String,
        diagnostics: Option<String>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic version check failed; the caller should reload and re-derive.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl GradingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        GradingError::Validation(vec![ValidationIssue::new(field, message)])
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        GradingError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        GradingError::Conflict {
            entity,
            id: id.into(),
        }
    }

    pub fn processing(message: impl Into<String>, diagnostics: Option<String>) -> Self {
        GradingError::ExternalProcessing {
            message: message.into(),
            diagnostics,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, GradingError::Conflict { .. })
    }
}

impl From<mongodb::error::Error> for GradingError {
    fn from(err: mongodb::error::Error) -> Self {
        GradingError::Storage(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for GradingError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        GradingError::Storage(format!("failed to encode document: {}", err))
    }
}

/// Request field names are reported the way clients send them.
pub(crate) fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn describe_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| match issue.question_number {
            Some(number) => format!("question {}: {}", number, issue.message),
            None => issue.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
