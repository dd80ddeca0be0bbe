use async_trait::async_trait;

use crate::error::GradingError;
use crate::models::{AttemptRecord, Exam, Question};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub finished_only: bool,
    pub tenant_id: Option<String>,
    pub attempt_ids: Option<Vec<String>>,
}

impl AttemptFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn finished_in_tenant(tenant_id: &str) -> Self {
        Self {
            finished_only: true,
            tenant_id: Some(tenant_id.to_string()),
            attempt_ids: None,
        }
    }

    pub fn matches(&self, record: &AttemptRecord) -> bool {
        (!self.finished_only || record.is_finished)
            && self
                .tenant_id
                .as_deref()
                .is_none_or(|tenant| record.tenant_id == tenant)
            && self
                .attempt_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&record.id))
    }
}

/// Persistence boundary for the grading engine.
///
/// Listing operations return questions ordered by number and attempts ordered by
/// start time, then id; ranking ties rely on that order. Attempt updates are
/// conditional on `record.version` and fail with [`GradingError::Conflict`] when the
/// stored version moved on.
#[async_trait]
pub trait GradingStore: Send + Sync {
    async fn ping(&self) -> Result<(), GradingError>;

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, GradingError>;
    async fn insert_exam(&self, exam: &Exam) -> Result<(), GradingError>;

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, GradingError>;
    async fn insert_question(&self, question: &Question) -> Result<(), GradingError>;
    /// Returns false when no question matched.
    async fn update_question_points(
        &self,
        exam_id: &str,
        question_id: &str,
        points: f64,
    ) -> Result<bool, GradingError>;
    async fn delete_answer_key_questions(&self, exam_id: &str) -> Result<u64, GradingError>;

    async fn find_attempt(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError>;
    async fn find_attempt_by_id(
        &self,
        attempt_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError>;
    async fn list_attempts(
        &self,
        exam_id: &str,
        filter: &AttemptFilter,
    ) -> Result<Vec<AttemptRecord>, GradingError>;
    /// Fails with a conflict when the participant already has a record for the exam.
    async fn insert_attempt(&self, record: &AttemptRecord) -> Result<(), GradingError>;
    /// Writes the record with `version + 1` and returns the new version.
    async fn update_attempt(&self, record: &AttemptRecord) -> Result<u64, GradingError>;
}

pub(crate) fn sort_attempts(records: &mut [AttemptRecord]) {
    records.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn sort_questions(questions: &mut [Question]) {
    questions.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)));
}
