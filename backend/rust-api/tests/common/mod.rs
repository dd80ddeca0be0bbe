#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use exam_grading_api::{
    config::Config,
    create_router,
    error::GradingError,
    middlewares::auth::{JwtClaims, JwtService},
    models::{AttemptRecord, Exam, Question, ScanResult},
    services::{
        scanner::{ScanProcessor, ScanRequest},
        AppState,
    },
    store::{AttemptFilter, GradingStore, MemoryStore},
};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const TENANT: &str = "school-1";
pub const OTHER_TENANT: &str = "school-2";

/// Scanner double keyed by image path. Unknown images fail like an unreadable sheet.
#[derive(Default)]
pub struct ScriptedScanner {
    outcomes: Mutex<HashMap<String, Result<ScanResult, String>>>,
    calls: Mutex<Vec<ScanRequest>>,
}

impl ScriptedScanner {
    pub fn on(&self, image_path: &str, result: ScanResult) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(image_path.to_string(), Ok(result));
    }

    pub fn fail(&self, image_path: &str, message: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(image_path.to_string(), Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<ScanRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanProcessor for ScriptedScanner {
    async fn process(&self, request: &ScanRequest) -> Result<ScanResult, GradingError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.outcomes.lock().unwrap().get(&request.image_path) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(GradingError::processing(
                message.clone(),
                Some("Traceback: scripted failure".to_string()),
            )),
            None => Err(GradingError::not_found("image", &request.image_path)),
        }
    }
}

/// Memory store whose attempt updates fail for selected participants.
pub struct FlakyStore {
    inner: MemoryStore,
    failing_participants: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_participants: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_updates_for(&self, participant_id: &str) {
        self.failing_participants
            .lock()
            .unwrap()
            .insert(participant_id.to_string());
    }
}

#[async_trait]
impl GradingStore for FlakyStore {
    async fn ping(&self) -> Result<(), GradingError> {
        self.inner.ping().await
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, GradingError> {
        self.inner.find_exam(exam_id).await
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), GradingError> {
        self.inner.insert_exam(exam).await
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, GradingError> {
        self.inner.list_questions(exam_id).await
    }

    async fn insert_question(&self, question: &Question) -> Result<(), GradingError> {
        self.inner.insert_question(question).await
    }

    async fn update_question_points(
        &self,
        exam_id: &str,
        question_id: &str,
        points: f64,
    ) -> Result<bool, GradingError> {
        self.inner
            .update_question_points(exam_id, question_id, points)
            .await
    }

    async fn delete_answer_key_questions(&self, exam_id: &str) -> Result<u64, GradingError> {
        self.inner.delete_answer_key_questions(exam_id).await
    }

    async fn find_attempt(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError> {
        self.inner.find_attempt(exam_id, participant_id).await
    }

    async fn find_attempt_by_id(
        &self,
        attempt_id: &str,
    ) -> Result<Option<AttemptRecord>, GradingError> {
        self.inner.find_attempt_by_id(attempt_id).await
    }

    async fn list_attempts(
        &self,
        exam_id: &str,
        filter: &AttemptFilter,
    ) -> Result<Vec<AttemptRecord>, GradingError> {
        self.inner.list_attempts(exam_id, filter).await
    }

    async fn insert_attempt(&self, record: &AttemptRecord) -> Result<(), GradingError> {
        self.inner.insert_attempt(record).await
    }

    async fn update_attempt(&self, record: &AttemptRecord) -> Result<u64, GradingError> {
        if self
            .failing_participants
            .lock()
            .unwrap()
            .contains(&record.participant_id)
        {
            return Err(GradingError::Storage("write timed out".to_string()));
        }
        self.inner.update_attempt(record).await
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn GradingStore>,
    pub scanner: Arc<ScriptedScanner>,
    jwt: JwtService,
}

pub fn test_config() -> Config {
    let settings = ::config::Config::builder()
        .set_override("storage.backend", "memory")
        .unwrap()
        .set_override("auth.jwt_secret", JWT_SECRET)
        .unwrap()
        .set_override("metrics.auth", "metrics:secret")
        .unwrap()
        .set_override("grading.cascade_concurrency", 4i64)
        .unwrap()
        .build()
        .unwrap();
    Config::from_settings(&settings, "test").expect("Failed to build test configuration")
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_store(Arc::new(MemoryStore::new())).await
}

pub async fn create_test_app_with_store(store: Arc<dyn GradingStore>) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let scanner = Arc::new(ScriptedScanner::default());
    let app_state = Arc::new(AppState::with_components(
        test_config(),
        store.clone(),
        scanner.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        store,
        scanner,
        jwt: JwtService::new(JWT_SECRET),
    }
}

impl TestApp {
    pub fn token(&self, sub: &str, role: &str, tenant_id: &str) -> String {
        self.jwt
            .generate_token(&JwtClaims::new(sub, role, tenant_id, 3600))
            .unwrap()
    }

    pub fn teacher(&self) -> String {
        self.token("teacher-1", "teacher", TENANT)
    }

    pub fn participant(&self, participant_id: &str) -> String {
        self.token(participant_id, "participant", TENANT)
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn seed_exam(&self, show_scores: bool) -> Exam {
        seed_exam(self.store.as_ref(), TENANT, show_scores).await
    }
}

pub async fn seed_exam(store: &dyn GradingStore, tenant_id: &str, show_scores: bool) -> Exam {
    let mut exam = Exam::new(tenant_id, "Mathematics final", "MATH-F");
    exam.settings.show_score_after_exam = show_scores;
    store.insert_exam(&exam).await.unwrap();
    exam
}

/// Answer key body for `(correct_option, points)` rows numbered from 1.
pub fn key_body(rows: &[(i64, f64)]) -> Value {
    let keys: Vec<Value> = rows
        .iter()
        .enumerate()
        .map(|(i, (correct, points))| {
            serde_json::json!({
                "questionNumber": i + 1,
                "category": if i % 2 == 0 { "Algebra" } else { "Geometry" },
                "pointValue": points,
                "correctOption": correct,
                "responseTimeSeconds": 60
            })
        })
        .collect();
    serde_json::json!({ "keys": keys })
}

pub fn key_id(exam: &Exam, number: u32) -> String {
    Question::answer_key_id(&exam.id, number)
}
