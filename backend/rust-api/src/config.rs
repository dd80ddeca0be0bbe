use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

/// OMR scanner process settings.
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub interpreter: String,
    pub script_dir: PathBuf,
    pub default_script: String,
    /// Script names (without extension) a request may select.
    pub allowed_scripts: Vec<String>,
    /// Image paths in requests are resolved relative to this directory.
    pub upload_dir: PathBuf,
    pub timeout: Duration,
    /// Length of the placeholder key used for answer-key extraction.
    pub dummy_key_length: usize,
    pub batch_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub storage: StorageBackend,
    pub bind_addr: String,
    pub metrics_auth: String,
    pub cascade_concurrency: usize,
    pub scanner: ScannerSettings,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_settings(&settings, &app_env)
    }

    /// Extracts values with fallbacks to plain ENV variables or defaults.
    pub fn from_settings(
        settings: &config::Config,
        app_env: &str,
    ) -> Result<Self, config::ConfigError> {
        let string_or = |key: &str, env_key: &str, default: &str| {
            settings
                .get_string(key)
                .or_else(|_| env::var(env_key))
                .unwrap_or_else(|_| default.to_string())
        };
        let usize_or = |key: &str, env_key: &str, default: usize| -> usize {
            settings
                .get_int(key)
                .ok()
                .and_then(|v| usize::try_from(v).ok())
                .or_else(|| env::var(env_key).ok().and_then(|v| v.parse().ok()))
                .unwrap_or(default)
        };

        let mongo_uri = string_or("database.mongo_uri", "MONGO_URI", "mongodb://localhost:27017");
        let mongo_database = string_or("database.mongo_database", "MONGO_DATABASE", "exam_grading");

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!("Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let storage = match string_or("storage.backend", "STORAGE_BACKEND", "mongo")
            .to_ascii_lowercase()
            .as_str()
        {
            "mongo" | "mongodb" => StorageBackend::Mongo,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "unknown storage backend '{}'",
                    other
                )))
            }
        };

        let allowed_scripts = settings
            .get::<Vec<String>>("scanner.allowed_scripts")
            .or_else(|_| settings.get_string("scanner.allowed_scripts").map(|s| split_list(&s)))
            .or_else(|_| env::var("SCANNER_ALLOWED_SCRIPTS").map(|s| split_list(&s)))
            .unwrap_or_else(|_| {
                ["scanner", "scanner2", "scanner3", "scanner4"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        let scanner = ScannerSettings {
            interpreter: string_or("scanner.interpreter", "SCANNER_INTERPRETER", "python3"),
            script_dir: PathBuf::from(string_or("scanner.script_dir", "SCANNER_SCRIPT_DIR", "scanner")),
            default_script: string_or("scanner.default_script", "SCANNER_DEFAULT_SCRIPT", "scanner"),
            allowed_scripts,
            upload_dir: PathBuf::from(string_or("scanner.upload_dir", "SCANNER_UPLOAD_DIR", "uploads")),
            timeout: Duration::from_secs(
                usize_or("scanner.timeout_secs", "SCANNER_TIMEOUT_SECS", 60) as u64,
            ),
            dummy_key_length: usize_or("scanner.dummy_key_length", "SCANNER_DUMMY_KEY_LENGTH", 120),
            batch_concurrency: usize_or("scanner.batch_concurrency", "SCANNER_BATCH_CONCURRENCY", 2)
                .max(1),
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            jwt_secret,
            storage,
            bind_addr: string_or("server.bind_addr", "BIND_ADDR", "0.0.0.0:8081"),
            metrics_auth: string_or("metrics.auth", "METRICS_AUTH", "admin:changeme"),
            cascade_concurrency: usize_or("grading.cascade_concurrency", "CASCADE_CONCURRENCY", 8)
                .max(1),
            scanner,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
