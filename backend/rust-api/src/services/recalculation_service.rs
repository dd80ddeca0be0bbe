use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::scoring::{self, SnapshotMap};
use crate::error::{GradingError, ValidationIssue};
use crate::metrics::{CASCADE_DURATION_SECONDS, CASCADE_RECORDS_TOTAL};
use crate::models::results::{CascadeReport, FailedAttempt, QuestionScoreUpdate};
use crate::models::{AttemptRecord, Exam};
use crate::store::{AttemptFilter, GradingStore};
use crate::utils::retry::{retry_async_when, RetryConfig};

enum RecordOutcome {
    Updated,
    Unchanged,
}

pub struct RecalculationService {
    store: Arc<dyn GradingStore>,
    concurrency: usize,
}

impl RecalculationService {
    pub fn new(store: Arc<dyn GradingStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Persists new point values, then re-derives every attempt of the exam.
    ///
    /// All updates are checked before anything is written: values must be finite
    /// and non-negative and every question must belong to the exam.
    pub async fn update_question_scores(
        &self,
        exam: &Exam,
        updates: &[QuestionScoreUpdate],
    ) -> Result<CascadeReport, GradingError> {
        validate_updates(updates)?;

        let questions = self.store.list_questions(&exam.id).await?;
        if let Some(missing) = updates
            .iter()
            .find(|u| !questions.iter().any(|q| q.id == u.question_id))
        {
            return Err(GradingError::not_found("question", &missing.question_id));
        }

        for update in updates {
            let matched = self
                .store
                .update_question_points(&exam.id, &update.question_id, update.new_point_value)
                .await?;
            if !matched {
                return Err(GradingError::not_found("question", &update.question_id));
            }
        }

        tracing::info!(
            exam_id = %exam.id,
            updated_questions = updates.len(),
            "Question point values updated, recalculating attempts"
        );

        let mut report = self.run(exam, AttemptFilter::all(), "score_update").await?;
        report.updated_questions = updates.len();
        Ok(report)
    }

    /// Re-derives all attempts, or only the listed ones, from current question values.
    pub async fn recalculate(
        &self,
        exam: &Exam,
        attempt_ids: Option<Vec<String>>,
    ) -> Result<CascadeReport, GradingError> {
        let filter = AttemptFilter {
            attempt_ids,
            ..AttemptFilter::all()
        };
        self.run(exam, filter, "manual").await
    }

    async fn run(
        &self,
        exam: &Exam,
        filter: AttemptFilter,
        trigger: &str,
    ) -> Result<CascadeReport, GradingError> {
        let started = Instant::now();
        let snapshots = Arc::new(scoring::snapshot(&self.store.list_questions(&exam.id).await?));
        let records = self.store.list_attempts(&exam.id, &filter).await?;
        let total_attempts = records.len();

        let outcomes: Vec<(String, String, Result<RecordOutcome, GradingError>)> =
            stream::iter(records)
                .map(|record| {
                    let store = self.store.clone();
                    let snapshots = snapshots.clone();
                    let attempt_id = record.id.clone();
                    let participant_id = record.participant_id.clone();
                    async move {
                        // a panicking record is reported as failed
                        let outcome = tokio::spawn(refresh_record(store, record, snapshots))
                            .await
                            .unwrap_or_else(|e| {
                                Err(GradingError::InvalidState(format!(
                                    "recalculation task failed: {}",
                                    e
                                )))
                            });
                        (attempt_id, participant_id, outcome)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut report = CascadeReport {
            exam_id: exam.id.clone(),
            updated_questions: 0,
            total_attempts,
            updated_attempts: 0,
            unchanged_attempts: 0,
            failed_attempts: Vec::new(),
        };

        for (attempt_id, participant_id, outcome) in outcomes {
            match outcome {
                Ok(RecordOutcome::Updated) => report.updated_attempts += 1,
                Ok(RecordOutcome::Unchanged) => report.unchanged_attempts += 1,
                Err(e) => report.failed_attempts.push(FailedAttempt {
                    attempt_id,
                    participant_id,
                    reason: e.to_string(),
                }),
            }
        }
        report
            .failed_attempts
            .sort_by(|a, b| a.attempt_id.cmp(&b.attempt_id));

        CASCADE_RECORDS_TOTAL
            .with_label_values(&["updated"])
            .inc_by(report.updated_attempts as u64);
        CASCADE_RECORDS_TOTAL
            .with_label_values(&["unchanged"])
            .inc_by(report.unchanged_attempts as u64);
        CASCADE_RECORDS_TOTAL
            .with_label_values(&["failed"])
            .inc_by(report.failed_attempts.len() as u64);
        CASCADE_DURATION_SECONDS
            .with_label_values(&[trigger])
            .observe(started.elapsed().as_secs_f64());

        if report.is_partial_failure() {
            tracing::warn!(
                exam_id = %exam.id,
                failed = report.failed_attempts.len(),
                failed_ids = ?report
                    .failed_attempts
                    .iter()
                    .map(|f| f.attempt_id.as_str())
                    .collect::<Vec<_>>(),
                "Recalculation finished with failures"
            );
        } else {
            tracing::info!(
                exam_id = %exam.id,
                total = report.total_attempts,
                updated = report.updated_attempts,
                unchanged = report.unchanged_attempts,
                "Recalculation finished"
            );
        }

        Ok(report)
    }
}

fn validate_updates(updates: &[QuestionScoreUpdate]) -> Result<(), GradingError> {
    if updates.is_empty() {
        return Err(GradingError::validation(
            "updates",
            "At least one question update is required",
        ));
    }

    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    for update in updates {
        if update.question_id.trim().is_empty() {
            issues.push(ValidationIssue::new("questionId", "questionId is required"));
        } else if !seen.insert(update.question_id.as_str()) {
            issues.push(ValidationIssue::new(
                "questionId",
                format!("question {} is updated more than once", update.question_id),
            ));
        }
        if !update.new_point_value.is_finite() || update.new_point_value < 0.0 {
            issues.push(ValidationIssue::new(
                "newPointValue",
                format!(
                    "point value for question {} must be a non-negative number",
                    update.question_id
                ),
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(GradingError::Validation(issues))
    }
}

/// Re-derives one record and writes it back if anything changed. On a version
/// conflict the record is reloaded and re-derived.
async fn refresh_record(
    store: Arc<dyn GradingStore>,
    record: AttemptRecord,
    snapshots: Arc<SnapshotMap>,
) -> Result<RecordOutcome, GradingError> {
    let attempt_id = record.id.clone();
    let prefetched = Mutex::new(Some(record));

    retry_async_when(
        RetryConfig::version_conflict(),
        || async {
            let cached = prefetched.lock().ok().and_then(|mut slot| slot.take());
            let current = match cached {
                Some(record) => record,
                None => store
                    .find_attempt_by_id(&attempt_id)
                    .await?
                    .ok_or_else(|| GradingError::not_found("attempt", &attempt_id))?,
            };

            let mut refreshed = scoring::rederive_record(&current, &snapshots);
            if refreshed.same_grading(&current) {
                return Ok(RecordOutcome::Unchanged);
            }

            refreshed.updated_at = Utc::now();
            store.update_attempt(&refreshed).await?;
            Ok(RecordOutcome::Updated)
        },
        GradingError::is_conflict,
    )
    .await
}
