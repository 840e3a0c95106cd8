//! `turnsync` entry point.
use anyhow::Result;
use turn_client::{ClientConfig, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = ClientConfig::from_env();
    let _guard = logging::setup_logging(config.log_dir.as_deref())?;
    tracing::info!(turns = config.turns, "starting turnsync");

    let summary = turn_client::run(&config).await?;
    for report in &summary.turns {
        tracing::info!(
            epoch = %report.epoch,
            advanced = report.advanced(),
            moves = report.moves_dispatched,
            rejected = report.rejected_inputs,
            "turn finished"
        );
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
