use serde::{Deserialize, Serialize};
use validator::Validate;

use super::attempt::AttemptRecord;

/// Output contract of the OMR scanner. Question numbers in the lists are 1-based;
/// `user_answers[i]` is the mark read for question `i + 1` (0 = blank).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(rename = "rightAnswers", default)]
    pub right_answers: Vec<u32>,
    #[serde(rename = "wrongAnswers", default)]
    pub wrong_answers: Vec<u32>,
    #[serde(rename = "multipleAnswers", default)]
    pub multiple_answers: Vec<u32>,
    #[serde(rename = "unAnswered", default)]
    pub unanswered: Vec<u32>,
    #[serde(rename = "Useranswers", default)]
    pub user_answers: Vec<u8>,
    #[serde(
        rename = "correctedImageUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub corrected_image_url: Option<String>,
    #[serde(rename = "qRCodeData", default, skip_serializing_if = "Option::is_none")]
    pub qr_code_data: Option<String>,
}

impl ScanResult {
    pub fn has_marks(&self) -> bool {
        self.user_answers.iter().any(|mark| *mark != 0)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScanSheetRequest {
    #[validate(length(min = 1, message = "participantId is required"))]
    pub participant_id: String,
    #[validate(length(min = 1, message = "imagePath is required"))]
    pub image_path: String,
    #[serde(default)]
    pub scanner: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ManualScanRequest {
    #[validate(length(min = 1, message = "participantId is required"))]
    pub participant_id: String,
    pub scan_result: ScanResult,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanRequest {
    #[validate(length(min = 1, max = 200, message = "between 1 and 200 images per batch"))]
    pub image_paths: Vec<String>,
    #[serde(default)]
    pub scanner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanItem {
    pub image_path: String,
    pub participant_id: String,
    pub attempt_id: String,
    pub sum_score: f64,
    pub max_score: f64,
}

impl BatchScanItem {
    pub fn from_record(image_path: &str, record: &AttemptRecord) -> Self {
        Self {
            image_path: image_path.to_string(),
            participant_id: record.participant_id.clone(),
            attempt_id: record.id.clone(),
            sum_score: record.sum_score,
            max_score: record.max_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanFailure {
    pub image_path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanReport {
    pub total: usize,
    pub graded: Vec<BatchScanItem>,
    pub failed: Vec<BatchScanFailure>,
}
