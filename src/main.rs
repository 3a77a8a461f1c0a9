use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use maki_updater::anilist::AnilistClient;
use maki_updater::config;
use maki_updater::db::{self, PgStore};
use maki_updater::{scheduler, updater};

/// Exit status used when the configuration cannot be resolved.
const EXIT_BAD_CONFIG: i32 = 5;

#[derive(Debug, Parser)]
#[command(author, version, about = "Keep the anime tables in sync with AniList")]
struct Args {
    /// Optional YAML settings file; environment variables take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = match config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };
    info!(?cfg, "configuration loaded");

    let pool = db::init_pool(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;
    let store = PgStore::new(pool);
    let anilist = AnilistClient::from_config(&cfg)?;

    if args.once {
        let report = updater::run_cycle(&anilist, &store, cfg.pages_per_cycle).await;
        store.close().await;
        let report = report?;
        info!(
            pages = report.pages,
            upserted = report.upserted,
            failed = report.failed,
            "single update cycle finished"
        );
        return Ok(());
    }

    info!("starting AniList updater");
    scheduler::run(&anilist, &store, &cfg, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(?err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await;

    store.close().await;
    Ok(())
}
