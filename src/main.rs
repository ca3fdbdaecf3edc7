use chrono::{DateTime, FixedOffset, Utc};
use env_logger::Builder;
use log::LevelFilter;
use pairbot::config::PairTradeConfig;
use pairbot::runner::PairTradeRunner;
use std::env;
use std::io::Write;
use std::str::FromStr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with local timezone
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(3600);
    let offset = FixedOffset::east_opt(offset_seconds)
        .ok_or_else(|| anyhow::anyhow!("invalid TIMEZONE_OFFSET {}", offset_seconds))?;
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
                .unwrap_or(LevelFilter::Debug),
        )
        .init();

    let git_hash = option_env!("PAIRBOT_GIT_HASH").unwrap_or("unknown");
    log::info!("pairbot git: {}", git_hash);
    log::info!("Starting pair-trade replay...");
    let cfg = PairTradeConfig::from_env_or_yaml()?;
    let mut runner = PairTradeRunner::new(&cfg)?;
    let summary = runner.run().await?;
    log::info!("[REPLAY] summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}
