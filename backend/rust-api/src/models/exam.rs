use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exam document (collection `exams`). Authoring happens elsewhere; the engine
/// only reads exams, except for seeding in local runs and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    #[serde(rename = "_id")]
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub settings: ExamSettings,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSettings {
    /// Participants may see their own scores once the attempt is finished.
    #[serde(default)]
    pub show_score_after_exam: bool,
}

impl Exam {
    pub fn new(tenant_id: &str, name: &str, code: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            settings: ExamSettings::default(),
            created_at: Utc::now(),
        }
    }
}
