use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use chime_core::ChimeConfig;
use chime_discord::DiscordGateway;
use chime_scheduler::{
    ClockCorrector, HttpDateTimeSource, ReminderProcessor, SqliteReminderStore, SystemClock,
    TimeSource,
};

#[derive(Parser, Debug)]
#[command(name = "chime-daemon")]
#[command(about = "Delivers scheduled Discord reminders")]
struct Cli {
    /// Config file (default: ~/.chime/chime.toml)
    #[arg(long, env = "CHIME_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chime_daemon=info,chime_scheduler=info,chime_discord=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = ChimeConfig::load(cli.config.as_deref()).context("loading config")?;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = open_db(db_path)?;
    let store = Arc::new(SqliteReminderStore::new(conn)?);
    info!("database migrations complete");

    let gateway = Arc::new(DiscordGateway::from_config(&config.discord)?);

    let source: Option<Arc<dyn TimeSource>> = if config.time_source.enabled {
        let http = HttpDateTimeSource::new(
            config.time_source.url.clone(),
            config.time_source.timeout(),
        )?;
        Some(Arc::new(http))
    } else {
        warn!("time source disabled; using the local clock uncorrected");
        None
    };
    let clock = ClockCorrector::new(
        source,
        config.scheduler.resync_interval(),
        config.scheduler.resync_near_due(),
    );

    let processor = Arc::new(ReminderProcessor::new(
        store,
        gateway,
        clock,
        Arc::new(SystemClock),
        config.scheduler.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(processor.run(shutdown_rx));
    info!("chime daemon running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    worker.await.context("joining reminder processor")?;
    Ok(())
}

fn open_db(path: &str) -> anyhow::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)
        .with_context(|| format!("opening database at {path}"))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
