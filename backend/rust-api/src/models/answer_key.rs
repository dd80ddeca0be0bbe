use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::ValidationIssue;

/// One row of a teacher-authored answer key.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKeyEntry {
    #[validate(range(min = 1, message = "Invalid question number"))]
    pub question_number: i64,
    #[validate(custom(function = "validate_not_blank", message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "Point value must be greater than 0"))]
    pub point_value: f64,
    #[validate(range(min = 1, max = 4, message = "Correct option must be between 1 and 4"))]
    pub correct_option: i64,
    #[validate(range(min = 10, message = "Response time must be at least 10 seconds"))]
    pub response_time_seconds: i64,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Entries are checked one by one by the service, not rejected as a whole.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKeySubmission {
    #[serde(default)]
    pub keys: Vec<AnswerKeyEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKeyReport {
    pub exam_id: String,
    pub total_keys: usize,
    pub saved_count: usize,
    /// Answer-key questions removed before the new key was written.
    pub replaced_count: u64,
    pub issues: Vec<ValidationIssue>,
}

/// Defaults used when an extracted key is stored right away.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyKeyDefaults {
    #[validate(custom(function = "validate_not_blank", message = "Category is required"))]
    pub category: String,
    #[validate(range(exclusive_min = 0.0, message = "Point value must be greater than 0"))]
    pub point_value: f64,
    #[validate(range(min = 10, message = "Response time must be at least 10 seconds"))]
    pub response_time_seconds: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScanKeyRequest {
    #[validate(length(min = 1, message = "imagePath is required"))]
    pub image_path: String,
    #[serde(default)]
    pub scanner: Option<String>,
    /// Number of bubble rows on the sheet; defaults to the configured key length.
    #[serde(default)]
    #[validate(range(min = 1, max = 500))]
    pub question_count: Option<usize>,
    #[serde(default)]
    #[validate(nested)]
    pub apply: Option<ApplyKeyDefaults>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedKey {
    /// Mark per question, 1-based position; 0 where nothing was marked.
    pub answers: Vec<u8>,
    pub total_questions: usize,
    pub blank_questions: Vec<u32>,
    pub multiple_marked_questions: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<AnswerKeyReport>,
}
