use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use seesturm_sync::{config, store, sync, wordpress::WordpressApi};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Print an example config file and exit
    #[arg(long)]
    print_example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.print_example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/seesturm.db", cfg.app.data_dir));

    let pool = store::init_pool(&database_url).await?;
    store::run_migrations(&pool).await?;
    let documents = store::SqliteDocumentStore::new(pool);

    let base_url = Url::parse(&cfg.api.base_url).context("invalid api.base_url")?;
    let api = WordpressApi::with_base_url(base_url);

    info!("starting posts sync");
    let report = sync::sync_posts(&documents, api, cfg.app.page_size).await?;
    info!(
        fetched = report.fetched,
        inserted = report.inserted,
        updated = report.updated,
        unchanged = report.unchanged,
        "sync complete"
    );
    Ok(())
}
