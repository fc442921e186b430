use anyhow::Result;
use clap::Parser;
use push_courier::config;
use push_courier::db;
use push_courier::dispatch::{BatchDispatcher, DispatchConfig};
use push_courier::push::GatewayClient;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/push-courier.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let sender = GatewayClient::new(&cfg.push.endpoint, cfg.push.api_key.clone())?;
    let dispatcher = BatchDispatcher::new(DispatchConfig {
        batch_per_cycle: cfg.app.batch_per_cycle,
        send_concurrency: cfg.app.send_concurrency,
    });

    info!(
        interval_ms = cfg.app.cycle_interval_ms,
        batch = cfg.app.batch_per_cycle,
        "starting dispatch cycles"
    );
    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.app.cycle_interval_ms));
    loop {
        ticker.tick().await;
        match dispatcher.run_cycle(&pool, &sender).await {
            Ok(summaries) if summaries.is_empty() => {}
            Ok(summaries) => info!(notifications = summaries.len(), "cycle complete"),
            Err(err) => error!(?err, "cycle failed"),
        }
    }
}
