use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;

use super::scanner::{ScanMode, ScanProcessor, ScanRequest};
use super::scoring;
use crate::error::GradingError;
use crate::metrics::record_scored;
use crate::models::scan::{BatchScanFailure, BatchScanItem, BatchScanReport};
use crate::models::{
    Answer, AttemptRecord, Exam, GradeSource, GradingStatus, Question, QuestionKind, ScanResult,
    Verdict,
};
use crate::store::GradingStore;
use crate::utils::retry::{retry_async_when, RetryConfig};

pub struct ScanService {
    store: Arc<dyn GradingStore>,
    scanner: Arc<dyn ScanProcessor>,
    batch_concurrency: usize,
}

impl ScanService {
    pub fn new(
        store: Arc<dyn GradingStore>,
        scanner: Arc<dyn ScanProcessor>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            store,
            scanner,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Scans one participant sheet against the exam's key and stores the result.
    pub async fn grade_sheet(
        &self,
        exam: &Exam,
        participant_id: &str,
        image_path: &str,
        script: Option<&str>,
    ) -> Result<AttemptRecord, GradingError> {
        let questions = self.exam_questions(exam).await?;
        let result = self
            .scanner
            .process(&sheet_request(&questions, image_path, script))
            .await?;
        self.store_scan(exam, participant_id, &questions, result).await
    }

    /// Stores a scan produced outside this service (e.g. a mobile client).
    pub async fn ingest_result(
        &self,
        exam: &Exam,
        participant_id: &str,
        result: ScanResult,
    ) -> Result<AttemptRecord, GradingError> {
        let questions = self.exam_questions(exam).await?;
        self.store_scan(exam, participant_id, &questions, result).await
    }

    /// Grades several sheets; the participant comes from each sheet's QR code.
    /// A failing sheet is reported and does not affect the others.
    pub async fn grade_batch(
        &self,
        exam: &Exam,
        image_paths: &[String],
        script: Option<&str>,
    ) -> Result<BatchScanReport, GradingError> {
        let questions = self.exam_questions(exam).await?;

        let outcomes: Vec<(String, Result<AttemptRecord, GradingError>)> =
            stream::iter(image_paths.iter().cloned())
                .map(|image_path| {
                    let questions = &questions;
                    async move {
                        let outcome = self
                            .grade_identified_sheet(exam, questions, &image_path, script)
                            .await;
                        (image_path, outcome)
                    }
                })
                .buffered(self.batch_concurrency)
                .collect()
                .await;

        let mut graded = Vec::new();
        let mut failed = Vec::new();
        for (image_path, outcome) in outcomes {
            match outcome {
                Ok(record) => graded.push(BatchScanItem::from_record(&image_path, &record)),
                Err(e) => {
                    tracing::warn!(exam_id = %exam.id, image = %image_path, "Sheet failed: {}", e);
                    failed.push(BatchScanFailure {
                        image_path,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            exam_id = %exam.id,
            graded = graded.len(),
            failed = failed.len(),
            "Batch scan finished"
        );

        Ok(BatchScanReport {
            total: image_paths.len(),
            graded,
            failed,
        })
    }

    async fn grade_identified_sheet(
        &self,
        exam: &Exam,
        questions: &[Question],
        image_path: &str,
        script: Option<&str>,
    ) -> Result<AttemptRecord, GradingError> {
        let result = self
            .scanner
            .process(&sheet_request(questions, image_path, script))
            .await?;
        let participant_id = participant_from_qr(result.qr_code_data.as_deref(), &exam.code)?;
        self.store_scan(exam, &participant_id, questions, result).await
    }

    async fn exam_questions(&self, exam: &Exam) -> Result<Vec<Question>, GradingError> {
        let questions = self.store.list_questions(&exam.id).await?;
        if questions.is_empty() {
            return Err(GradingError::InvalidState(format!(
                "exam {} has no questions or answer key",
                exam.id
            )));
        }
        Ok(questions)
    }

    /// Upserts the participant's record by exam and participant, keeping its id
    /// and start time.
    async fn store_scan(
        &self,
        exam: &Exam,
        participant_id: &str,
        questions: &[Question],
        result: ScanResult,
    ) -> Result<AttemptRecord, GradingError> {
        let answers = answers_from_scan(questions, &result);
        for answer in &answers {
            record_scored(answer.verdict.as_str(), "scanner");
        }

        let record = retry_async_when(
            RetryConfig::version_conflict(),
            || self.try_store_scan(exam, participant_id, &answers, &result),
            GradingError::is_conflict,
        )
        .await?;

        tracing::info!(
            exam_id = %exam.id,
            participant_id = participant_id,
            sum_score = record.sum_score,
            max_score = record.max_score,
            "Scanned sheet stored"
        );
        Ok(record)
    }

    async fn try_store_scan(
        &self,
        exam: &Exam,
        participant_id: &str,
        answers: &[Answer],
        result: &ScanResult,
    ) -> Result<AttemptRecord, GradingError> {
        let existing = self.store.find_attempt(&exam.id, participant_id).await?;
        let mut record = existing
            .clone()
            .unwrap_or_else(|| AttemptRecord::start(exam, participant_id));

        let now = Utc::now();
        record.answers = answers.to_vec();
        record.scan = Some(result.clone());
        record.is_finished = true;
        scoring::refresh_aggregates(&mut record);
        record.submitted_at = Some(now);
        record.graded_at = (record.grading_status != GradingStatus::NeedsGrading).then_some(now);
        record.updated_at = now;

        match existing {
            Some(_) => record.version = self.store.update_attempt(&record).await?,
            None => self.store.insert_attempt(&record).await?,
        }
        Ok(record)
    }
}

/// Sheet rows are question numbers, so a key with gaps still lines up with
/// the printed sheet. Missing numbers get a dummy mark.
fn sheet_request(questions: &[Question], image_path: &str, script: Option<&str>) -> ScanRequest {
    let rows = questions.iter().map(|q| q.number).max().unwrap_or(0);
    let expected = (1..=rows)
        .map(|number| {
            questions
                .iter()
                .find(|q| q.number == number)
                .map_or(1, Question::expected_mark)
        })
        .collect();

    ScanRequest {
        image_path: image_path.to_string(),
        expected,
        script: script.map(str::to_string),
        mode: ScanMode::Sheet,
    }
}

/// One answer per question, in question order. The scanner's classification
/// lists decide the verdict; `Useranswers` only supplies the stored value.
pub fn answers_from_scan(questions: &[Question], result: &ScanResult) -> Vec<Answer> {
    let right: HashSet<u32> = result.right_answers.iter().copied().collect();
    let wrong: HashSet<u32> = result.wrong_answers.iter().copied().collect();
    let multiple: HashSet<u32> = result.multiple_answers.iter().copied().collect();

    questions
        .iter()
        .map(|question| {
            let number = question.number;
            let mark = (number as usize)
                .checked_sub(1)
                .and_then(|row| result.user_answers.get(row))
                .copied()
                .filter(|m| *m != 0);
            let listed = right.contains(&number) || wrong.contains(&number);

            let verdict = if multiple.contains(&number) {
                Verdict::Incorrect
            } else if matches!(question.kind, QuestionKind::Open) {
                if mark.is_some() || listed {
                    Verdict::NeedsGrading
                } else {
                    Verdict::Unanswered
                }
            } else if right.contains(&number) {
                Verdict::Correct
            } else if wrong.contains(&number) {
                Verdict::Incorrect
            } else {
                Verdict::Unanswered
            };

            let earned_score = match verdict {
                Verdict::Correct => Some(question.points),
                Verdict::NeedsGrading => None,
                _ => Some(0.0),
            };

            Answer {
                question_id: question.id.clone(),
                value: mark.map(|m| m.to_string()),
                verdict,
                max_score: question.points,
                earned_score,
                category: question.category.clone(),
                topic: question.topic.clone(),
                graded_by: GradeSource::Scanner,
            }
        })
        .collect()
}

/// QR payloads are `<participantId>-<examCode>` or a bare participant id.
pub fn participant_from_qr(qr: Option<&str>, exam_code: &str) -> Result<String, GradingError> {
    let payload = qr
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| GradingError::validation("qrCode", "no QR code found on the sheet"))?;

    if !exam_code.is_empty() {
        if let Some(participant) = payload.strip_suffix(exam_code).and_then(|p| p.strip_suffix('-')) {
            if participant.is_empty() {
                return Err(GradingError::validation("qrCode", "QR code has no participant id"));
            }
            return Ok(participant.to_string());
        }
    }

    Ok(payload.to_string())
}
