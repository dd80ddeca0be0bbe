use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Document},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};

use super::{sort_attempts, sort_questions, AttemptFilter, GradingStore};
use crate::error::GradingError;
use crate::metrics::track_db_operation;
use crate::models::{AttemptRecord, Exam, Question};

const EXAMS: &str = "exams";
const QUESTIONS: &str = "exam_questions";
const ATTEMPTS: &str = "exam_attempts";

pub struct MongoStore {
    db: Database,
    exams: Collection<Exam>,
    questions: Collection<Question>,
    attempts: Collection<AttemptRecord>,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self {
            exams: db.collection(EXAMS),
            questions: db.collection(QUESTIONS),
            attempts: db.collection(ATTEMPTS),
            db,
        }
    }

    /// One attempt per participant and exam; questions are listed by exam.
    pub async fn ensure_indexes(&self) -> Result<(), GradingError> {
        self.attempts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "examId": 1, "participantId": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        self.questions
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "examId": 1, "number": 1 })
                    .build(),
            )
            .await?;
        Ok(())
    }

    fn attempt_filter(exam_id: &str, filter: &AttemptFilter) -> Document {
        let mut query = doc! { "examId": exam_id };
        if filter.finished_only {
            query.insert("isFinished", true);
        }
        if let Some(tenant_id) = &filter.tenant_id {
            query.insert("tenantId", tenant_id.as_str());
        }
        if let Some(ids) = &filter.attempt_ids {
            query.insert("_id", doc! { "$in": ids.clone() });
        }
        query
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == 11000
    )
}

#[async_trait]
impl GradingStore for MongoStore {
    async fn ping(&self) -> Result<(), GradingError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, GradingError> {
        track_db_operation("find_one", EXAMS, async {
            Ok(self.exams.find_one(doc! { "_id": exam_id }).await?)
        })
        .await
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), GradingError> {
        track_db_operation("insert_one", EXAMS, async {
            match self.exams.insert_one(exam).await {
                Ok(_) => Ok(()),
                Err(e) if is_duplicate_key(&e) => Err(GradingError::conflict("exam", &exam.id)),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, GradingError> {
        track_db_operation("find", QUESTIONS, async {
            let cursor = self
                .questions
                .find(doc! { "examId": exam_id })
                .sort(doc! { "number": 1, "_id": 1 })
                .await?;
            let mut questions: Vec<Question> = cursor.try_collect().await?;
            sort_questions(&mut questions);
            Ok(questions)
        })
        .await
    }

    async fn insert_question(&self, question: &Question) -> Result<(), GradingError> {
        track_db_operation("insert_one", QUESTIONS, async {
            match self.questions.insert_one(question).await {
                Ok(_) => Ok(()),
                Err(e) if is_duplicate_key(&e) => {
                    Err(GradingError::conflict("question", &question.id))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn update_question_points(
        &self,
        exam_id: &str,
        question_id: &str,
        points: f64,
    ) -> Result<bool, GradingError> {
        track_db_operation("update_one", QUESTIONS, async {
            let result = self
                .questions
                .update_one(
                    doc! { "_id": question_id, "examId": exam_id },
                    doc! { "$set": { "points": points, "updatedAt": to_bson(&Utc::now())? } },
                )
                .await?;
            Ok(result.matched_count > 0)
        })
        .await
    }

    async fn delete_answer_key_questions(&self, exam_id: &str) -> Result<u64, GradingError> {
        track_db_operation("delete_many", QUESTIONS, async {
            let result = self
                .questions
                .delete_many(doc! { "examId": exam_id, "answerKeyOnly": true })
                .await?;
            Ok(result.deleted_count)
        })
        .await
    }

    async fn find_attempt(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError> {
        track_db_operation("find_one", ATTEMPTS, async {
            Ok(self
                .attempts
                .find_one(doc! { "examId": exam_id, "participantId": participant_id })
                .await?)
        })
        .await
    }

    async fn find_attempt_by_id(
        &self,
        attempt_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError> {
        track_db_operation("find_one", ATTEMPTS, async {
            Ok(self.attempts.find_one(doc! { "_id": attempt_id }).await?)
        })
        .await
    }

    async fn list_attempts(
        &self,
        exam_id: &str,
        filter: &AttemptFilter,
    ) -> Result<Vec<AttemptRecord>, GradingError> {
        track_db_operation("find", ATTEMPTS, async {
            let cursor = self
                .attempts
                .find(Self::attempt_filter(exam_id, filter))
                .await?;
            let mut records: Vec<AttemptRecord> = cursor.try_collect().await?;
            // timestamps are stored as RFC 3339 strings, so order in memory
            sort_attempts(&mut records);
            Ok(records)
        })
        .await
    }

    async fn insert_attempt(&self, record: &AttemptRecord) -> Result<(), GradingError> {
        track_db_operation("insert_one", ATTEMPTS, async {
            match self.attempts.insert_one(record).await {
                Ok(_) => Ok(()),
                Err(e) if is_duplicate_key(&e) => {
                    Err(GradingError::conflict("attempt", &record.id))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn update_attempt(&self, record: &AttemptRecord) -> Result<u64, GradingError> {
        track_db_operation("replace_one", ATTEMPTS, async {
            let mut next = record.clone();
            next.version = record.version + 1;

            let result = self
                .attempts
                .replace_one(
                    doc! { "_id": &record.id, "version": record.version as i64 },
                    &next,
                )
                .await?;

            if result.matched_count == 0 {
                let exists = self
                    .attempts
                    .find_one(doc! { "_id": &record.id })
                    .await?
                    .is_some();
                return Err(if exists {
                    GradingError::conflict("attempt", &record.id)
                } else {
                    GradingError::not_found("attempt", &record.id)
                });
            }

            Ok(next.version)
        })
        .await
    }
}
