//! Re-derives stored attempts of one exam from the current question values.
//!
//! Usage: `recalculate <exam_id> [attempt_id...]`

use anyhow::Context;
use tracing_subscriber::fmt::init;

use exam_grading_api::{config::Config, services::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();

    let mut args = std::env::args().skip(1);
    let exam_id = args
        .next()
        .context("usage: recalculate <exam_id> [attempt_id...]")?;
    let attempt_ids: Vec<String> = args.collect();

    let config = Config::load().context("Failed to load configuration")?;
    let app_state = AppState::new(config)
        .await
        .context("Failed to initialize app state")?;

    let exam = app_state
        .store
        .find_exam(&exam_id)
        .await?
        .with_context(|| format!("exam {} not found", exam_id))?;

    let targeted = (!attempt_ids.is_empty()).then_some(attempt_ids);
    let report = app_state.recalculation().recalculate(&exam, targeted).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_partial_failure() {
        anyhow::bail!(
            "{} of {} attempts could not be recalculated",
            report.failed_attempts.len(),
            report.total_attempts
        );
    }
    Ok(())
}
