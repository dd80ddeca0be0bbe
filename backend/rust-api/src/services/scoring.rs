//! Pure scoring rules. Nothing here touches storage, so every write path
//! (live submission, sheet scan, grader, cascade) derives numbers the same way.

use std::collections::HashMap;

use crate::error::GradingError;
use crate::models::{
    Answer, AttemptRecord, GradeSource, GradingStatus, Question, QuestionKind, Verdict,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub verdict: Verdict,
    pub earned_score: Option<f64>,
}

/// Scores a submitted value against a question.
pub fn score(question: &Question, submitted: Option<&str>) -> Scored {
    let Some(value) = normalize(submitted) else {
        return Scored {
            verdict: Verdict::Unanswered,
            earned_score: Some(0.0),
        };
    };

    match question.kind {
        QuestionKind::Open => Scored {
            verdict: Verdict::NeedsGrading,
            earned_score: None,
        },
        QuestionKind::MultipleChoice { correct_option } => {
            if value.parse::<u8>().ok() == Some(correct_option) {
                Scored {
                    verdict: Verdict::Correct,
                    earned_score: Some(question.points),
                }
            } else {
                Scored {
                    verdict: Verdict::Incorrect,
                    earned_score: Some(0.0),
                }
            }
        }
    }
}

fn normalize(submitted: Option<&str>) -> Option<&str> {
    submitted.map(str::trim).filter(|v| !v.is_empty())
}

/// Builds the stored answer for a question, copying point value and tags.
pub fn answer_question(question: &Question, submitted: Option<&str>, source: GradeSource) -> Answer {
    let scored = score(question, submitted);
    Answer {
        question_id: question.id.clone(),
        value: normalize(submitted).map(str::to_string),
        verdict: scored.verdict,
        max_score: question.points,
        earned_score: scored.earned_score,
        category: question.category.clone(),
        topic: question.topic.clone(),
        graded_by: source,
    }
}

/// Grader write. Partial credit is kept as given; any positive score counts as correct.
pub fn apply_grade(answer: &mut Answer, score: f64) -> Result<(), GradingError> {
    if !score.is_finite() || score < 0.0 || score > answer.max_score {
        return Err(GradingError::validation(
            "score",
            format!("score must be between 0 and {}", answer.max_score),
        ));
    }

    answer.earned_score = Some(score);
    answer.verdict = if score > 0.0 {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    };
    answer.graded_by = GradeSource::Teacher;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSnapshot {
    pub points: f64,
    pub category: String,
    pub topic: Option<String>,
    pub open: bool,
}

pub type SnapshotMap = HashMap<String, QuestionSnapshot>;

pub fn snapshot(questions: &[Question]) -> SnapshotMap {
    questions
        .iter()
        .map(|q| {
            (
                q.id.clone(),
                QuestionSnapshot {
                    points: q.points,
                    category: q.category.clone(),
                    topic: q.topic.clone(),
                    open: matches!(q.kind, QuestionKind::Open),
                },
            )
        })
        .collect()
}

/// Refreshes denormalized fields from the current question values and recomputes
/// the earned score. Answers whose question is gone keep their previous values.
pub fn rederive(answer: &Answer, snapshot: Option<&QuestionSnapshot>) -> Answer {
    let mut refreshed = answer.clone();
    if let Some(current) = snapshot {
        refreshed.max_score = current.points;
        refreshed.category = current.category.clone();
        refreshed.topic = current.topic.clone();
    }

    // Grader scores only survive on open questions; choice answers follow the key.
    let open = snapshot.map_or(refreshed.graded_by == GradeSource::Teacher, |s| s.open);
    let max = refreshed.max_score;
    match (refreshed.graded_by, refreshed.verdict) {
        (_, Verdict::NeedsGrading) => refreshed.earned_score = None,
        (GradeSource::Teacher, _) if open => {
            let kept = refreshed.earned().max(0.0).min(max);
            refreshed.earned_score = Some(kept);
            refreshed.verdict = if kept > 0.0 {
                Verdict::Correct
            } else {
                Verdict::Incorrect
            };
        }
        (_, Verdict::Correct) => refreshed.earned_score = Some(max),
        _ => refreshed.earned_score = Some(0.0),
    }
    refreshed
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreSummary {
    pub sum_score: f64,
    pub max_score: f64,
    pub correct: u32,
    pub wrong: u32,
    pub unanswered: u32,
    pub pending: u32,
}

pub fn summarize(answers: &[Answer]) -> ScoreSummary {
    answers
        .iter()
        .fold(ScoreSummary::default(), |mut summary, answer| {
            summary.sum_score += answer.earned();
            summary.max_score += answer.max_score;
            match answer.verdict {
                Verdict::Correct => summary.correct += 1,
                Verdict::Incorrect => summary.wrong += 1,
                Verdict::Unanswered => summary.unanswered += 1,
                Verdict::NeedsGrading => summary.pending += 1,
            }
            summary
        })
}

pub fn resolve_status(record: &AttemptRecord) -> GradingStatus {
    if !record.is_finished {
        GradingStatus::InProgress
    } else if record.pending_grading_count > 0 {
        GradingStatus::NeedsGrading
    } else if record.has_teacher_grades() {
        GradingStatus::ManuallyGraded
    } else if record.scan.is_some() {
        GradingStatus::Scanned
    } else {
        GradingStatus::Finished
    }
}

/// Recomputes aggregates and status from the record's answers.
pub fn refresh_aggregates(record: &mut AttemptRecord) {
    let summary = summarize(&record.answers);
    record.sum_score = summary.sum_score;
    record.max_score = summary.max_score;
    record.correct_answer_count = summary.correct;
    record.wrong_answer_count = summary.wrong;
    record.unanswered_count = summary.unanswered;
    record.pending_grading_count = summary.pending;
    record.grading_status = resolve_status(record);
}

pub fn rederive_record(record: &AttemptRecord, snapshots: &SnapshotMap) -> AttemptRecord {
    let mut refreshed = record.clone();
    refreshed.answers = record
        .answers
        .iter()
        .map(|answer| rederive(answer, snapshots.get(&answer.question_id)))
        .collect();
    refresh_aggregates(&mut refreshed);
    refreshed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Exam;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn mc(number: u32, correct: u8, points: f64) -> Question {
        Question::multiple_choice("exam-1", number, correct, points)
    }

    fn record_for(questions: &[Question], values: &[Option<&str>]) -> AttemptRecord {
        let exam = Exam::new("school-1", "Mock", "MCK");
        let mut record = AttemptRecord::start(&exam, "p1");
        for (question, value) in questions.iter().zip(values) {
            record.put_answer(answer_question(question, *value, GradeSource::Engine));
        }
        record.is_finished = true;
        refresh_aggregates(&mut record);
        record
    }

    #[test]
    fn scores_each_verdict() {
        let question = mc(1, 2, 3.0);

        assert_eq!(
            score(&question, Some("2")),
            Scored { verdict: Verdict::Correct, earned_score: Some(3.0) }
        );
        assert_eq!(
            score(&question, Some(" 2 ")),
            Scored { verdict: Verdict::Correct, earned_score: Some(3.0) }
        );
        assert_eq!(
            score(&question, Some("4")),
            Scored { verdict: Verdict::Incorrect, earned_score: Some(0.0) }
        );
        assert_eq!(
            score(&question, Some("B")),
            Scored { verdict: Verdict::Incorrect, earned_score: Some(0.0) }
        );
        assert_eq!(
            score(&question, Some("   ")),
            Scored { verdict: Verdict::Unanswered, earned_score: Some(0.0) }
        );
        assert_eq!(
            score(&question, None),
            Scored { verdict: Verdict::Unanswered, earned_score: Some(0.0) }
        );
    }

    #[test]
    fn open_question_waits_for_grader() {
        let question = Question::open("exam-1", 1, 5.0);
        let answer = answer_question(&question, Some("photosynthesis"), GradeSource::Engine);

        assert_eq!(answer.verdict, Verdict::NeedsGrading);
        assert_eq!(answer.earned_score, None);
        assert_eq!(answer.max_score, 5.0);
    }

    #[test]
    fn grader_score_must_fit_max() {
        let question = Question::open("exam-1", 1, 4.0);
        let mut answer = answer_question(&question, Some("essay"), GradeSource::Engine);

        assert!(apply_grade(&mut answer, 4.5).is_err());
        assert!(apply_grade(&mut answer, -1.0).is_err());
        assert!(apply_grade(&mut answer, f64::NAN).is_err());

        apply_grade(&mut answer, 2.5).unwrap();
        assert_eq!(answer.verdict, Verdict::Correct);
        assert_eq!(answer.earned_score, Some(2.5));
        assert_eq!(answer.graded_by, GradeSource::Teacher);

        apply_grade(&mut answer, 0.0).unwrap();
        assert_eq!(answer.verdict, Verdict::Incorrect);
    }

    // Answers [1,2,3] against key [1,1,1] give the (1,2,0) split; [1,2,1] would make question 3 correct.
    #[test]
    fn worked_example_before_and_after_point_edit() {
        let mut questions = vec![mc(1, 1, 1.0), mc(2, 1, 1.0), mc(3, 1, 2.0)];
        let record = record_for(&questions, &[Some("1"), Some("2"), Some("3")]);

        assert_eq!(record.sum_score, 1.0);
        assert_eq!(record.max_score, 4.0);
        assert_eq!(
            (record.correct_answer_count, record.wrong_answer_count, record.unanswered_count),
            (1, 2, 0)
        );

        questions[2].points = 5.0;
        let updated = rederive_record(&record, &snapshot(&questions));

        assert_eq!(updated.max_score, 7.0);
        assert_eq!(updated.sum_score, 1.0);
        assert_eq!(updated.answers[2].max_score, 5.0);
    }

    #[test]
    fn rederive_keeps_answers_for_deleted_questions() {
        let questions = vec![mc(1, 1, 1.0), mc(2, 3, 2.0)];
        let record = record_for(&questions, &[Some("1"), Some("3")]);

        let remaining = snapshot(&questions[..1]);
        let updated = rederive_record(&record, &remaining);

        assert_eq!(updated.answers.len(), 2);
        assert_eq!(updated.answers[1].max_score, 2.0);
        assert_eq!(updated.sum_score, 3.0);
    }

    #[test]
    fn teacher_grade_is_clamped_to_new_maximum() {
        let mut questions = vec![Question::open("exam-1", 1, 4.0)];
        let mut record = record_for(&questions, &[Some("essay")]);
        apply_grade(&mut record.answers[0], 3.0).unwrap();
        refresh_aggregates(&mut record);
        assert_eq!(record.grading_status, GradingStatus::ManuallyGraded);

        questions[0].points = 2.0;
        let shrunk = rederive_record(&record, &snapshot(&questions));
        assert_eq!(shrunk.answers[0].earned_score, Some(2.0));
        assert_eq!(shrunk.sum_score, 2.0);

        questions[0].points = 0.0;
        let zeroed = rederive_record(&shrunk, &snapshot(&questions));
        assert_eq!(zeroed.answers[0].earned_score, Some(0.0));
        assert_eq!(zeroed.answers[0].verdict, Verdict::Incorrect);
    }

    #[test]
    fn correct_choice_answer_earns_new_maximum_even_if_graded() {
        let mut questions = vec![mc(1, 2, 2.0)];
        let mut record = record_for(&questions, &[Some("2")]);
        apply_grade(&mut record.answers[0], 1.0).unwrap();
        refresh_aggregates(&mut record);
        assert_eq!(record.sum_score, 1.0);

        questions[0].points = 5.0;
        let updated = rederive_record(&record, &snapshot(&questions));
        assert_eq!(updated.answers[0].verdict, Verdict::Correct);
        assert_eq!(updated.answers[0].earned_score, Some(5.0));
        assert_eq!(updated.sum_score, 5.0);
    }

    #[test]
    fn ungraded_open_answer_stays_unset_through_rederive() {
        let mut questions = vec![Question::open("exam-1", 1, 4.0), mc(2, 2, 1.0)];
        let record = record_for(&questions, &[Some("essay"), Some("2")]);
        assert_eq!(record.grading_status, GradingStatus::NeedsGrading);

        questions[0].points = 6.0;
        let updated = rederive_record(&record, &snapshot(&questions));

        assert_eq!(updated.answers[0].earned_score, None);
        assert_eq!(updated.pending_grading_count, 1);
        assert_eq!(updated.max_score, 7.0);
        assert_eq!(updated.sum_score, 1.0);
    }

    fn random_exam(rng: &mut StdRng) -> Vec<Question> {
        let count = rng.random_range(1..=30);
        (1..=count)
            .map(|number| {
                let points = f64::from(rng.random_range(0..=10u32)) * 0.5;
                if rng.random_bool(0.15) {
                    Question::open("exam-1", number, points)
                } else {
                    mc(number, rng.random_range(1..=4), points)
                }
            })
            .collect()
    }

    fn random_values(rng: &mut StdRng, questions: &[Question]) -> Vec<Option<String>> {
        questions
            .iter()
            .map(|_| match rng.random_range(0..6) {
                0 => None,
                1 => Some(String::new()),
                _ => Some(rng.random_range(1..=4u8).to_string()),
            })
            .collect()
    }

    #[test]
    fn aggregates_always_match_answers() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..300 {
            let questions = random_exam(&mut rng);
            let values = random_values(&mut rng, &questions);
            let refs: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
            let record = record_for(&questions, &refs);

            let earned: f64 = record.answers.iter().map(Answer::earned).sum();
            let max: f64 = record.answers.iter().map(|a| a.max_score).sum();
            assert_eq!(record.sum_score, earned);
            assert_eq!(record.max_score, max);
            assert_eq!(
                record.correct_answer_count
                    + record.wrong_answer_count
                    + record.unanswered_count
                    + record.pending_grading_count,
                record.answers.len() as u32
            );
            assert!(record
                .answers
                .iter()
                .all(|a| a.earned() >= 0.0 && a.earned() <= a.max_score));
        }
    }

    #[test]
    fn rederive_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let mut questions = random_exam(&mut rng);
            let values = random_values(&mut rng, &questions);
            let refs: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
            let record = record_for(&questions, &refs);

            for question in questions.iter_mut() {
                if rng.random_bool(0.3) {
                    question.points = f64::from(rng.random_range(0..=10u32)) * 0.5;
                }
            }
            let snapshots = snapshot(&questions);

            let once = rederive_record(&record, &snapshots);
            let twice = rederive_record(&once, &snapshots);
            assert!(once.same_grading(&twice));
            assert!(once
                .answers
                .iter()
                .all(|a| a.max_score == snapshots[&a.question_id].points));
        }
    }

    #[test]
    fn point_edit_moves_max_by_delta_and_sum_only_when_correct() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut questions = random_exam(&mut rng);
            let values = random_values(&mut rng, &questions);
            let refs: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
            let record = record_for(&questions, &refs);

            let index = rng.random_range(0..questions.len());
            let old_points = questions[index].points;
            let new_points = f64::from(rng.random_range(0..=10u32)) * 0.5;
            questions[index].points = new_points;
            let delta = new_points - old_points;

            let updated = rederive_record(&record, &snapshot(&questions));
            assert_eq!(updated.max_score, record.max_score + delta);

            let expected_sum = if record.answers[index].verdict == Verdict::Correct {
                record.sum_score + delta
            } else {
                record.sum_score
            };
            assert_eq!(updated.sum_score, expected_sum);
        }
    }
}
