use chrono::Utc;
use std::sync::Arc;

use super::scoring;
use crate::error::GradingError;
use crate::metrics::record_scored;
use crate::models::{AttemptRecord, Exam, GradeSource, GradingStatus, Question, QuestionKind};
use crate::store::GradingStore;
use crate::utils::retry::{retry_async_when, RetryConfig};

/// What a single answer write carries.
#[derive(Debug, Clone)]
pub enum AnswerWrite {
    /// Participant submission, scored by the engine.
    Submitted(Option<String>),
    /// Grader score for an answer.
    Graded(f64),
}

pub struct AttemptService {
    store: Arc<dyn GradingStore>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn GradingStore>) -> Self {
        Self { store }
    }

    /// Returns the participant's record, creating it on first call.
    pub async fn start_attempt(
        &self,
        exam: &Exam,
        participant_id: &str,
    ) -> Result<AttemptRecord, GradingError> {
        if let Some(existing) = self.store.find_attempt(&exam.id, participant_id).await? {
            return Ok(existing);
        }

        let record = AttemptRecord::start(exam, participant_id);
        match self.store.insert_attempt(&record).await {
            Ok(()) => {
                tracing::info!(
                    exam_id = %exam.id,
                    participant_id = participant_id,
                    "Attempt started"
                );
                Ok(record)
            }
            // lost a race with a concurrent start
            Err(e) if e.is_conflict() => self
                .store
                .find_attempt(&exam.id, participant_id)
                .await?
                .ok_or_else(|| GradingError::not_found("attempt", participant_id)),
            Err(e) => Err(e),
        }
    }

    pub async fn submit_answer(
        &self,
        exam: &Exam,
        participant_id: &str,
        question_id: &str,
        value: Option<String>,
    ) -> Result<AttemptRecord, GradingError> {
        self.write_answer(exam, participant_id, question_id, AnswerWrite::Submitted(value))
            .await
    }

    pub async fn grade_answer(
        &self,
        exam: &Exam,
        participant_id: &str,
        question_id: &str,
        score: f64,
    ) -> Result<AttemptRecord, GradingError> {
        self.write_answer(exam, participant_id, question_id, AnswerWrite::Graded(score))
            .await
    }

    /// Single write path for participant submissions and grader scores. The write
    /// is versioned; on conflict the record is reloaded and the write re-applied.
    pub async fn write_answer(
        &self,
        exam: &Exam,
        participant_id: &str,
        question_id: &str,
        write: AnswerWrite,
    ) -> Result<AttemptRecord, GradingError> {
        let questions = self.store.list_questions(&exam.id).await?;
        let question = questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| GradingError::not_found("question", question_id))?;

        retry_async_when(
            RetryConfig::version_conflict(),
            || self.try_write(exam, participant_id, question, &write),
            GradingError::is_conflict,
        )
        .await
    }

    async fn try_write(
        &self,
        exam: &Exam,
        participant_id: &str,
        question: &Question,
        write: &AnswerWrite,
    ) -> Result<AttemptRecord, GradingError> {
        let mut record = self
            .store
            .find_attempt(&exam.id, participant_id)
            .await?
            .ok_or_else(|| GradingError::not_found("attempt", participant_id))?;

        match write {
            AnswerWrite::Submitted(value) => {
                if record.is_finished {
                    return Err(GradingError::InvalidState(
                        "attempt is already finished".to_string(),
                    ));
                }
                let answer =
                    scoring::answer_question(question, value.as_deref(), GradeSource::Engine);
                record_scored(answer.verdict.as_str(), "engine");
                record.put_answer(answer);
            }
            AnswerWrite::Graded(score) => {
                if !matches!(question.kind, QuestionKind::Open) {
                    return Err(GradingError::InvalidState(format!(
                        "question {} is scored from the answer key and cannot be graded manually",
                        question.number
                    )));
                }
                if !record.is_finished {
                    return Err(GradingError::InvalidState(
                        "attempt must be finished before grading".to_string(),
                    ));
                }
                let mut answer = match record.answer_for(&question.id) {
                    Some(existing) => existing.clone(),
                    None => scoring::answer_question(question, None, GradeSource::Engine),
                };
                scoring::apply_grade(&mut answer, *score)?;
                record_scored(answer.verdict.as_str(), "teacher");
                record.put_answer(answer);
            }
        }

        scoring::refresh_aggregates(&mut record);
        let now = Utc::now();
        record.updated_at = now;
        if record.is_finished && record.grading_status != GradingStatus::NeedsGrading {
            record.graded_at = Some(now);
        }

        record.version = self.store.update_attempt(&record).await?;
        Ok(record)
    }

    /// Closes the attempt: unanswered questions get explicit blank answers and the
    /// answers are put in question order. Finishing twice is a no-op.
    pub async fn finish_attempt(
        &self,
        exam: &Exam,
        participant_id: &str,
    ) -> Result<AttemptRecord, GradingError> {
        let questions = self.store.list_questions(&exam.id).await?;

        retry_async_when(
            RetryConfig::version_conflict(),
            || self.try_finish(exam, participant_id, &questions),
            GradingError::is_conflict,
        )
        .await
    }

    async fn try_finish(
        &self,
        exam: &Exam,
        participant_id: &str,
        questions: &[Question],
    ) -> Result<AttemptRecord, GradingError> {
        let mut record = self
            .store
            .find_attempt(&exam.id, participant_id)
            .await?
            .ok_or_else(|| GradingError::not_found("attempt", participant_id))?;

        if record.is_finished {
            return Ok(record);
        }

        let mut ordered = Vec::with_capacity(questions.len().max(record.answers.len()));
        for question in questions {
            match record.answer_for(&question.id) {
                Some(existing) => ordered.push(existing.clone()),
                None => {
                    ordered.push(scoring::answer_question(question, None, GradeSource::Engine))
                }
            }
        }
        // answers whose question no longer exists are kept at the end
        for answer in &record.answers {
            if !questions.iter().any(|q| q.id == answer.question_id) {
                ordered.push(answer.clone());
            }
        }
        record.answers = ordered;
        record.is_finished = true;

        scoring::refresh_aggregates(&mut record);
        let now = Utc::now();
        record.submitted_at = Some(now);
        record.updated_at = now;
        if record.grading_status != GradingStatus::NeedsGrading {
            record.graded_at = Some(now);
        }

        record.version = self.store.update_attempt(&record).await?;

        tracing::info!(
            exam_id = %exam.id,
            participant_id = participant_id,
            status = record.grading_status.as_str(),
            sum_score = record.sum_score,
            max_score = record.max_score,
            "Attempt finished"
        );
        Ok(record)
    }
}
