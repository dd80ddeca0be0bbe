use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GradingError;
use crate::models::results::{
    CategoryStats, ExamCategoryReport, ExamRanking, ParticipantResult, RankEntry, SchoolStats,
    ScoreSummaryView,
};
use crate::models::{Answer, AttemptRecord, Exam, Verdict};
use crate::store::{AttemptFilter, GradingStore};

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Participant,
    Staff,
}

/// Per-category totals, categories in order of first appearance.
pub fn category_breakdown<'a>(answers: impl IntoIterator<Item = &'a Answer>) -> Vec<CategoryStats> {
    let mut order: HashMap<String, usize> = HashMap::new();
    let mut stats: Vec<CategoryStats> = Vec::new();

    for answer in answers {
        let name = match answer.category.trim() {
            "" => UNCATEGORIZED,
            trimmed => trimmed,
        };
        let index = *order.entry(name.to_string()).or_insert_with(|| {
            stats.push(CategoryStats::empty(name));
            stats.len() - 1
        });

        let entry = &mut stats[index];
        entry.total_questions += 1;
        entry.earned_score += answer.earned();
        entry.max_score += answer.max_score;
        match answer.verdict {
            Verdict::Correct => entry.correct_answers += 1,
            Verdict::Incorrect => entry.wrong_answers += 1,
            Verdict::Unanswered => entry.unanswered_questions += 1,
            Verdict::NeedsGrading => entry.pending_grading += 1,
        }
    }

    stats
}

pub fn school_stats(records: &[AttemptRecord]) -> SchoolStats {
    let total_participants = records.len();
    let total_score: f64 = records.iter().map(|r| r.sum_score).sum();
    let total_max: f64 = records.iter().map(|r| r.max_score).sum();

    SchoolStats {
        total_participants,
        average_score: if total_participants > 0 {
            total_score / total_participants as f64
        } else {
            0.0
        },
        average_percentage: if total_max > 0.0 {
            total_score / total_max * 100.0
        } else {
            0.0
        },
        rank: None,
        percentile: None,
    }
}

pub fn percentile(rank: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (total.saturating_sub(rank)) as f64 / total as f64 * 100.0
}

/// Orders by score, highest first. Equal scores keep the input order.
pub fn rank(records: &[AttemptRecord]) -> Vec<RankEntry> {
    let mut ordered: Vec<&AttemptRecord> = records.iter().collect();
    ordered.sort_by(|a, b| b.sum_score.total_cmp(&a.sum_score));

    let total = ordered.len();
    ordered
        .into_iter()
        .enumerate()
        .map(|(index, record)| RankEntry {
            rank: index + 1,
            percentile: percentile(index + 1, total),
            participant_id: record.participant_id.clone(),
            attempt_id: record.id.clone(),
            sum_score: record.sum_score,
            max_score: record.max_score,
        })
        .collect()
}

fn summary_view(record: &AttemptRecord) -> ScoreSummaryView {
    ScoreSummaryView {
        sum_score: record.sum_score,
        max_score: record.max_score,
        percentage: if record.max_score > 0.0 {
            record.sum_score / record.max_score * 100.0
        } else {
            0.0
        },
        correct_answer_count: record.correct_answer_count,
        wrong_answer_count: record.wrong_answer_count,
        unanswered_count: record.unanswered_count,
        pending_grading_count: record.pending_grading_count,
        grading_status: record.grading_status,
        submitted_at: record.submitted_at,
    }
}

/// Computed on every request from the finished attempts; nothing is cached.
pub struct StatisticsService {
    store: Arc<dyn GradingStore>,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn GradingStore>) -> Self {
        Self { store }
    }

    async fn finished_attempts(&self, exam: &Exam) -> Result<Vec<AttemptRecord>, GradingError> {
        self.store
            .list_attempts(&exam.id, &AttemptFilter::finished_in_tenant(&exam.tenant_id))
            .await
    }

    pub async fn participant_result(
        &self,
        exam: &Exam,
        participant_id: &str,
        viewer: Viewer,
    ) -> Result<ParticipantResult, GradingError> {
        let record = self
            .store
            .find_attempt(&exam.id, participant_id)
            .await?
            .ok_or_else(|| GradingError::not_found("attempt", participant_id))?;

        if !record.is_finished {
            return Err(GradingError::InvalidState(
                "participant has not completed this exam".to_string(),
            ));
        }

        let mut result = ParticipantResult {
            exam_id: exam.id.clone(),
            exam_name: exam.name.clone(),
            exam_code: exam.code.clone(),
            participant_id: participant_id.to_string(),
            scores_visible: viewer == Viewer::Staff || exam.settings.show_score_after_exam,
            summary: None,
            category_results: None,
            school_stats: None,
            answers: None,
        };
        if !result.scores_visible {
            return Ok(result);
        }

        let finished = self.finished_attempts(exam).await?;
        let ranking = rank(&finished);
        let mut stats = school_stats(&finished);
        if let Some(entry) = ranking.iter().find(|e| e.attempt_id == record.id) {
            stats.rank = Some(entry.rank);
            stats.percentile = Some(entry.percentile);
        }

        result.summary = Some(summary_view(&record));
        result.category_results = Some(category_breakdown(&record.answers));
        result.school_stats = Some(stats);
        result.answers = Some(record.answers);
        Ok(result)
    }

    pub async fn exam_ranking(&self, exam: &Exam) -> Result<ExamRanking, GradingError> {
        let finished = self.finished_attempts(exam).await?;
        Ok(ExamRanking {
            exam_id: exam.id.clone(),
            school_stats: school_stats(&finished),
            ranking: rank(&finished),
        })
    }

    pub async fn exam_categories(&self, exam: &Exam) -> Result<ExamCategoryReport, GradingError> {
        let finished = self.finished_attempts(exam).await?;
        Ok(ExamCategoryReport {
            exam_id: exam.id.clone(),
            finished_attempts: finished.len(),
            categories: category_breakdown(finished.iter().flat_map(|r| r.answers.iter())),
        })
    }
}
