use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum QuestionKind {
    /// Options are numbered 1..=4.
    MultipleChoice { correct_option: u8 },
    /// Free-form answer scored by a grader.
    Open,
}

/// Question document (collection `exam_questions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub exam_id: String,
    pub number: u32,
    pub kind: QuestionKind,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub points: f64,
    /// Paper exams: the question exists only as an answer-key row.
    #[serde(default)]
    pub answer_key_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_seconds: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn multiple_choice(exam_id: &str, number: u32, correct_option: u8, points: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            exam_id: exam_id.to_string(),
            number,
            kind: QuestionKind::MultipleChoice { correct_option },
            category: "General".to_string(),
            topic: None,
            points,
            answer_key_only: false,
            response_time_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn open(exam_id: &str, number: u32, points: f64) -> Self {
        Self {
            kind: QuestionKind::Open,
            ..Self::multiple_choice(exam_id, number, 1, points)
        }
    }

    pub fn with_category(mut self, category: &str, topic: Option<&str>) -> Self {
        self.category = category.to_string();
        self.topic = topic.map(str::to_string);
        self
    }

    /// Stable id for answer-key questions, so re-submitting a key keeps
    /// existing answers pointing at the same question.
    pub fn answer_key_id(exam_id: &str, number: u32) -> String {
        format!("key_{}_{}", exam_id, number)
    }

    pub fn correct_option(&self) -> Option<u8> {
        match self.kind {
            QuestionKind::MultipleChoice { correct_option } => Some(correct_option),
            QuestionKind::Open => None,
        }
    }

    /// Mark passed to the sheet scanner. Open questions get a placeholder.
    pub fn expected_mark(&self) -> u8 {
        self.correct_option().unwrap_or(1)
    }
}
