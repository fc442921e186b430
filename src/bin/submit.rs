//! Enqueue one notification from the command line and print the response
//! envelope.

use anyhow::Result;
use clap::Parser;
use push_courier::{api, config, db};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    #[arg(long)]
    title: String,
    #[arg(long)]
    message: String,
    #[arg(long)]
    country_id: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/push-courier.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let response = api::send(&pool, &args.title, &args.message, args.country_id).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
