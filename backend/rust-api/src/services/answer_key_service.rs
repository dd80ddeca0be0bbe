use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

use super::scanner::{ScanMode, ScanProcessor, ScanRequest};
use crate::error::{camel_case, GradingError, ValidationIssue};
use crate::metrics::ANSWER_KEY_ENTRIES_TOTAL;
use crate::models::answer_key::{
    AnswerKeyEntry, AnswerKeyReport, ExtractedKey, ScanKeyRequest,
};
use crate::models::{Exam, Question, QuestionKind, ScanResult};
use crate::store::GradingStore;

pub struct AnswerKeyService {
    store: Arc<dyn GradingStore>,
    scanner: Arc<dyn ScanProcessor>,
    dummy_key_length: usize,
}

impl AnswerKeyService {
    pub fn new(
        store: Arc<dyn GradingStore>,
        scanner: Arc<dyn ScanProcessor>,
        dummy_key_length: usize,
    ) -> Self {
        Self {
            store,
            scanner,
            dummy_key_length,
        }
    }

    /// Replaces every answer-key question of the exam with the valid entries.
    ///
    /// Invalid entries are reported and skipped. When nothing is valid the call
    /// fails and the existing key is left untouched.
    pub async fn replace_answer_key(
        &self,
        exam: &Exam,
        entries: &[AnswerKeyEntry],
    ) -> Result<AnswerKeyReport, GradingError> {
        if entries.is_empty() {
            return Err(GradingError::validation(
                "keys",
                "At least one answer key entry is required",
            ));
        }

        let (valid, mut issues) = validate_entries(entries);
        ANSWER_KEY_ENTRIES_TOTAL
            .with_label_values(&["rejected"])
            .inc_by((entries.len() - valid.len()) as u64);
        if valid.is_empty() {
            return Err(GradingError::Validation(issues));
        }

        let replaced_count = self.store.delete_answer_key_questions(&exam.id).await?;

        let mut saved_count = 0;
        for entry in valid {
            let question = key_question(&exam.id, entry);
            match self.store.insert_question(&question).await {
                Ok(()) => saved_count += 1,
                Err(e) => {
                    tracing::warn!(
                        exam_id = %exam.id,
                        question_number = entry.question_number,
                        "Failed to save answer key entry: {}",
                        e
                    );
                    ANSWER_KEY_ENTRIES_TOTAL.with_label_values(&["failed"]).inc();
                    issues.push(ValidationIssue::for_question(
                        entry.question_number,
                        "storage",
                        e.to_string(),
                    ));
                }
            }
        }

        if saved_count == 0 {
            return Err(GradingError::Storage(
                "no answer key entries could be saved".to_string(),
            ));
        }
        ANSWER_KEY_ENTRIES_TOTAL
            .with_label_values(&["saved"])
            .inc_by(saved_count as u64);

        tracing::info!(
            exam_id = %exam.id,
            saved = saved_count,
            replaced = replaced_count,
            rejected = issues.len(),
            "Answer key replaced"
        );

        Ok(AnswerKeyReport {
            exam_id: exam.id.clone(),
            total_keys: entries.len(),
            saved_count,
            replaced_count,
            issues,
        })
    }

    /// Reads a filled-in key sheet. The scanner gets a placeholder key; only the
    /// marks it reads are used.
    pub async fn extract_from_sheet(
        &self,
        exam: &Exam,
        request: &ScanKeyRequest,
    ) -> Result<ExtractedKey, GradingError> {
        let length = request.question_count.unwrap_or(self.dummy_key_length);
        let result = self
            .scanner
            .process(&ScanRequest {
                image_path: request.image_path.clone(),
                expected: vec![1; length],
                script: request.scanner.clone(),
                mode: ScanMode::AnswerKey,
            })
            .await?;

        let mut extracted = key_from_marks(&result, request.question_count)?;

        if let Some(defaults) = &request.apply {
            let entries: Vec<AnswerKeyEntry> = extracted
                .answers
                .iter()
                .enumerate()
                .map(|(index, mark)| AnswerKeyEntry {
                    question_number: index as i64 + 1,
                    category: defaults.category.clone(),
                    topic: None,
                    point_value: defaults.point_value,
                    correct_option: i64::from(*mark),
                    response_time_seconds: defaults.response_time_seconds,
                })
                .collect();
            extracted.applied = Some(self.replace_answer_key(exam, &entries).await?);
        }

        Ok(extracted)
    }
}

/// Splits entries into valid ones and per-question issues. A repeated question
/// number is reported on every occurrence after the first.
pub fn validate_entries(entries: &[AnswerKeyEntry]) -> (Vec<&AnswerKeyEntry>, Vec<ValidationIssue>) {
    let mut valid = Vec::new();
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for entry in entries {
        if let Err(report) = entry.validate() {
            let mut entry_issues: Vec<ValidationIssue> = report
                .field_errors()
                .into_iter()
                .flat_map(|(field, errors)| {
                    errors.iter().map(move |error| {
                        let message = error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| error.code.to_string());
                        ValidationIssue::for_question(
                            entry.question_number,
                            camel_case(&field),
                            message,
                        )
                    })
                })
                .collect();
            entry_issues.sort_by(|a, b| a.field.cmp(&b.field));
            issues.extend(entry_issues);
            continue;
        }

        if !seen.insert(entry.question_number) {
            issues.push(ValidationIssue::for_question(
                entry.question_number,
                "questionNumber",
                "Duplicate question number",
            ));
            continue;
        }

        valid.push(entry);
    }

    (valid, issues)
}

fn key_question(exam_id: &str, entry: &AnswerKeyEntry) -> Question {
    // ranges were checked by validate_entries
    let number = entry.question_number as u32;
    let now = Utc::now();
    Question {
        id: Question::answer_key_id(exam_id, number),
        exam_id: exam_id.to_string(),
        number,
        kind: QuestionKind::MultipleChoice {
            correct_option: entry.correct_option as u8,
        },
        category: entry.category.trim().to_string(),
        topic: entry
            .topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        points: entry.point_value,
        answer_key_only: true,
        response_time_seconds: Some(entry.response_time_seconds as u32),
        created_at: now,
        updated_at: now,
    }
}

/// Turns scanner marks into a key. Without an explicit question count, trailing
/// blank rows of the placeholder sheet are dropped.
pub fn key_from_marks(
    result: &ScanResult,
    question_count: Option<usize>,
) -> Result<ExtractedKey, GradingError> {
    if !result.has_marks() {
        return Err(GradingError::processing(
            "no marks detected on the answer key sheet",
            None,
        ));
    }

    let mut answers = result.user_answers.clone();
    match question_count {
        Some(count) => answers.resize(count, 0),
        None => {
            while answers.last() == Some(&0) {
                answers.pop();
            }
        }
    }

    let blank_questions = answers
        .iter()
        .enumerate()
        .filter(|(_, mark)| **mark == 0)
        .map(|(index, _)| index as u32 + 1)
        .collect();

    let mut multiple_marked_questions: Vec<u32> = result
        .multiple_answers
        .iter()
        .copied()
        .filter(|n| *n >= 1 && (*n as usize) <= answers.len())
        .collect();
    multiple_marked_questions.sort_unstable();
    multiple_marked_questions.dedup();

    Ok(ExtractedKey {
        total_questions: answers.len(),
        answers,
        blank_questions,
        multiple_marked_questions,
        corrected_image_url: result.corrected_image_url.clone(),
        applied: None,
    })
}
