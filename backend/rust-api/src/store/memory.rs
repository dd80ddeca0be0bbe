use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{sort_attempts, sort_questions, AttemptFilter, GradingStore};
use crate::error::GradingError;
use crate::models::{AttemptRecord, Exam, Question};

#[derive(Default)]
struct Collections {
    exams: HashMap<String, Exam>,
    questions: Vec<Question>,
    attempts: Vec<AttemptRecord>,
}

/// Process-local store for `storage.backend = "memory"` and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GradingStore for MemoryStore {
    async fn ping(&self) -> Result<(), GradingError> {
        Ok(())
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, GradingError> {
        Ok(self.inner.read().await.exams.get(exam_id).cloned())
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), GradingError> {
        let mut inner = self.inner.write().await;
        if inner.exams.contains_key(&exam.id) {
            return Err(GradingError::conflict("exam", &exam.id));
        }
        inner.exams.insert(exam.id.clone(), exam.clone());
        Ok(())
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, GradingError> {
        let mut questions: Vec<Question> = self
            .inner
            .read()
            .await
            .questions
            .iter()
            .filter(|q| q.exam_id == exam_id)
            .cloned()
            .collect();
        sort_questions(&mut questions);
        Ok(questions)
    }

    async fn insert_question(&self, question: &Question) -> Result<(), GradingError> {
        let mut inner = self.inner.write().await;
        if inner.questions.iter().any(|q| q.id == question.id) {
            return Err(GradingError::conflict("question", &question.id));
        }
        inner.questions.push(question.clone());
        Ok(())
    }

    async fn update_question_points(
        &self,
        exam_id: &str,
        question_id: &str,
        points: f64,
    ) -> Result<bool, GradingError> {
        let mut inner = self.inner.write().await;
        match inner
            .questions
            .iter_mut()
            .find(|q| q.exam_id == exam_id && q.id == question_id)
        {
            Some(question) => {
                question.points = points;
                question.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_answer_key_questions(&self, exam_id: &str) -> Result<u64, GradingError> {
        let mut inner = self.inner.write().await;
        let before = inner.questions.len();
        inner
            .questions
            .retain(|q| !(q.exam_id == exam_id && q.answer_key_only));
        Ok((before - inner.questions.len()) as u64)
    }

    async fn find_attempt(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError> {
        Ok(self
            .inner
            .read()
            .await
            .attempts
            .iter()
            .find(|r| r.exam_id == exam_id && r.participant_id == participant_id)
            .cloned())
    }

    async fn find_attempt_by_id(
        &self,
        attempt_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError> {
        Ok(self
            .inner
            .read()
            .await
            .attempts
            .iter()
            .find(|r| r.id == attempt_id)
            .cloned())
    }

    async fn list_attempts(
        &self,
        exam_id: &str,
        filter: &AttemptFilter,
    ) -> Result<Vec<AttemptRecord>, GradingError> {
        let mut records: Vec<AttemptRecord> = self
            .inner
            .read()
            .await
            .attempts
            .iter()
            .filter(|r| r.exam_id == exam_id && filter.matches(r))
            .cloned()
            .collect();
        sort_attempts(&mut records);
        Ok(records)
    }

    async fn insert_attempt(&self, record: &AttemptRecord) -> Result<(), GradingError> {
        let mut inner = self.inner.write().await;
        if inner.attempts.iter().any(|r| {
            r.id == record.id
                || (r.exam_id == record.exam_id && r.participant_id == record.participant_id)
        }) {
            return Err(GradingError::conflict("attempt", &record.id));
        }
        inner.attempts.push(record.clone());
        Ok(())
    }

    async fn update_attempt(&self, record: &AttemptRecord) -> Result<u64, GradingError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .attempts
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| GradingError::not_found("attempt", &record.id))?;

        if stored.version != record.version {
            return Err(GradingError::conflict("attempt", &record.id));
        }

        let mut next = record.clone();
        next.version = record.version + 1;
        *stored = next;
        Ok(record.version + 1)
    }
}
