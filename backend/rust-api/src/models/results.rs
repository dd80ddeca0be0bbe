use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::attempt::{Answer, GradingStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: String,
    pub total_questions: u32,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub unanswered_questions: u32,
    pub pending_grading: u32,
    pub earned_score: f64,
    pub max_score: f64,
}

impl CategoryStats {
    pub fn empty(category: &str) -> Self {
        Self {
            category: category.to_string(),
            total_questions: 0,
            correct_answers: 0,
            wrong_answers: 0,
            unanswered_questions: 0,
            pending_grading: 0,
            earned_score: 0.0,
            max_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolStats {
    pub total_participants: usize,
    pub average_score: f64,
    pub average_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub rank: usize,
    pub percentile: f64,
    pub participant_id: String,
    pub attempt_id: String,
    pub sum_score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummaryView {
    pub sum_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub correct_answer_count: u32,
    pub wrong_answer_count: u32,
    pub unanswered_count: u32,
    pub pending_grading_count: u32,
    pub grading_status: GradingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Result as shown to a participant or staff member. Everything score-related is
/// omitted when `scores_visible` is false.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    pub exam_id: String,
    pub exam_name: String,
    pub exam_code: String,
    pub participant_id: String,
    pub scores_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScoreSummaryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_results: Option<Vec<CategoryStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_stats: Option<SchoolStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<Answer>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRanking {
    pub exam_id: String,
    pub school_stats: SchoolStats,
    pub ranking: Vec<RankEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamCategoryReport {
    pub exam_id: String,
    pub finished_attempts: usize,
    pub categories: Vec<CategoryStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionScoreUpdate {
    pub question_id: String,
    pub new_point_value: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdateRequest {
    #[validate(length(min = 1, message = "At least one question update is required"))]
    pub updates: Vec<QuestionScoreUpdate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateRequest {
    /// Only these attempts; all attempts of the exam when absent.
    #[serde(default)]
    pub attempt_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttempt {
    pub attempt_id: String,
    pub participant_id: String,
    pub reason: String,
}

/// Outcome of a cascade run. Per-record failures are listed, not raised.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub exam_id: String,
    pub updated_questions: usize,
    pub total_attempts: usize,
    pub updated_attempts: usize,
    pub unchanged_attempts: usize,
    pub failed_attempts: Vec<FailedAttempt>,
}

impl CascadeReport {
    pub fn is_partial_failure(&self) -> bool {
        !self.failed_attempts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_update_needs_at_least_one_entry() {
        let empty: ScoreUpdateRequest = serde_json::from_value(serde_json::json!({ "updates": [] })).unwrap();
        let errors = empty.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("updates"));

        let one: ScoreUpdateRequest = serde_json::from_value(serde_json::json!({
            "updates": [{ "questionId": "q1", "newPointValue": 3.0 }]
        }))
        .unwrap();
        assert!(one.validate().is_ok());
        assert_eq!(one.updates[0].new_point_value, 3.0);
    }
}
