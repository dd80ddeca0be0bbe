use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::exam::Exam;
use super::scan::ScanResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradingStatus {
    InProgress,
    Finished,
    Scanned,
    ManuallyGraded,
    NeedsGrading,
}

impl GradingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingStatus::InProgress => "in-progress",
            GradingStatus::Finished => "finished",
            GradingStatus::Scanned => "scanned",
            GradingStatus::ManuallyGraded => "manually-graded",
            GradingStatus::NeedsGrading => "needs-grading",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    Unanswered,
    NeedsGrading,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Correct => "correct",
            Verdict::Incorrect => "incorrect",
            Verdict::Unanswered => "unanswered",
            Verdict::NeedsGrading => "needs_grading",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeSource {
    Engine,
    Scanner,
    Teacher,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    #[serde(default)]
    pub value: Option<String>,
    pub verdict: Verdict,
    /// Copy of the question's point value at the last (re)derivation.
    pub max_score: f64,
    /// Unset while the answer waits for a grader.
    #[serde(default)]
    pub earned_score: Option<f64>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub graded_by: GradeSource,
}

impl Answer {
    pub fn earned(&self) -> f64 {
        self.earned_score.unwrap_or(0.0)
    }
}

/// One participant's work on one exam (collection `exam_attempts`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub exam_id: String,
    pub participant_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
    pub is_finished: bool,
    pub grading_status: GradingStatus,
    pub sum_score: f64,
    pub max_score: f64,
    pub correct_answer_count: u32,
    pub wrong_answer_count: u32,
    pub unanswered_count: u32,
    #[serde(default)]
    pub pending_grading_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanResult>,
    /// Bumped by the store on every write; writes are conditional on it.
    #[serde(default)]
    pub version: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn start(exam: &Exam, participant_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            exam_id: exam.id.clone(),
            participant_id: participant_id.to_string(),
            tenant_id: exam.tenant_id.clone(),
            answers: Vec::new(),
            is_finished: false,
            grading_status: GradingStatus::InProgress,
            sum_score: 0.0,
            max_score: 0.0,
            correct_answer_count: 0,
            wrong_answer_count: 0,
            unanswered_count: 0,
            pending_grading_count: 0,
            scan: None,
            version: 0,
            started_at: now,
            submitted_at: None,
            graded_at: None,
            updated_at: now,
        }
    }

    pub fn answer_for(&self, question_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    /// Replaces the answer for the same question in place, or appends it.
    pub fn put_answer(&mut self, answer: Answer) {
        match self
            .answers
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
        {
            Some(existing) => *existing = answer,
            None => self.answers.push(answer),
        }
    }

    /// True when answers, aggregates and status are identical; timestamps and
    /// version are ignored.
    pub fn same_grading(&self, other: &AttemptRecord) -> bool {
        self.answers == other.answers
            && self.sum_score == other.sum_score
            && self.max_score == other.max_score
            && self.correct_answer_count == other.correct_answer_count
            && self.wrong_answer_count == other.wrong_answer_count
            && self.unanswered_count == other.unanswered_count
            && self.pending_grading_count == other.pending_grading_count
            && self.grading_status == other.grading_status
    }

    pub fn has_teacher_grades(&self) -> bool {
        self.answers
            .iter()
            .any(|a| a.graded_by == GradeSource::Teacher)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, message = "questionId is required"))]
    pub question_id: String,
    /// Absent or blank clears the answer.
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GradeAnswerRequest {
    #[validate(length(min = 1, message = "questionId is required"))]
    pub question_id: String,
    #[validate(range(min = 0.0, message = "score must not be negative"))]
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(question_id: &str, verdict: Verdict) -> Answer {
        Answer {
            question_id: question_id.to_string(),
            value: None,
            verdict,
            max_score: 1.0,
            earned_score: Some(0.0),
            category: "Math".to_string(),
            topic: None,
            graded_by: GradeSource::Engine,
        }
    }

    #[test]
    fn put_answer_replaces_existing_entry() {
        let exam = Exam::new("school-1", "Midterm", "MT1");
        let mut record = AttemptRecord::start(&exam, "p1");

        record.put_answer(answer("q1", Verdict::Incorrect));
        record.put_answer(answer("q2", Verdict::Unanswered));
        record.put_answer(answer("q1", Verdict::Correct));

        assert_eq!(record.answers.len(), 2);
        assert_eq!(record.answers[0].verdict, Verdict::Correct);
        assert_eq!(record.answer_for("q2").map(|a| a.verdict), Some(Verdict::Unanswered));
    }

    #[test]
    fn status_serializes_kebab_case() {
        let value = serde_json::to_value(GradingStatus::ManuallyGraded).unwrap();
        assert_eq!(value, "manually-graded");
        assert_eq!(GradingStatus::NeedsGrading.as_str(), "needs-grading");
    }

    #[test]
    fn same_grading_ignores_timestamps() {
        let exam = Exam::new("school-1", "Midterm", "MT1");
        let record = AttemptRecord::start(&exam, "p1");
        let mut later = record.clone();
        later.updated_at = Utc::now() + chrono::Duration::seconds(30);
        later.version += 1;

        assert!(record.same_grading(&later));

        later.sum_score = 2.0;
        assert!(!record.same_grading(&later));
    }
}
