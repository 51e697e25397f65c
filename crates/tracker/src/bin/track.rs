use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use storage::{Database, GameType};
use tracker::config::DEFAULT_BASE_URL;
use tokio::sync::watch;
use tracker::{CookieSessionProvider, CookieSource, RunContext, StakeConnector, TrackerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "track")]
#[command(about = "Crash / slide round history tracker", long_about = None)]
#[command(version)]
struct Cli {
    /// Which game(s) to sync and analyse
    #[arg(long, value_enum)]
    mode: Mode,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Use the flat file as the only backend
    #[arg(long)]
    no_database: bool,

    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, env = "STAKE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Session cookies as `name=value; name2=value2`
    #[arg(long, env = "STAKE_COOKIES", hide_env_values = true)]
    cookies: Option<String>,

    #[arg(long, env = "STAKE_COOKIE_FILE", conflicts_with = "cookies")]
    cookie_file: Option<PathBuf>,

    /// Comma separated cutoffs, defaults to the built-in list
    #[arg(long, env = "THRESHOLDS", value_delimiter = ',')]
    thresholds: Vec<f64>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Crash,
    Slide,
    Both,
}

impl Mode {
    fn games(self) -> Vec<GameType> {
        match self {
            Mode::Crash => vec![GameType::Crash],
            Mode::Slide => vec![GameType::Slide],
            Mode::Both => vec![GameType::Crash, GameType::Slide],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "track={level},tracker={level},storage={level},sqlx=warn",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cookies = match (cli.cookies, cli.cookie_file) {
        (Some(text), _) => CookieSource::Inline(text),
        (None, Some(path)) => CookieSource::File(path),
        (None, None) => bail!("Session cookies are required (--cookies or --cookie-file)"),
    };

    let mut config = TrackerConfig::new(cli.data_dir, cookies).with_thresholds(cli.thresholds)?;
    config.base_url = cli.base_url;
    config.use_database = !cli.no_database && cli.database_url.is_some();

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Cannot create {}", config.data_dir.display()))?;

    let pool = match (&cli.database_url, config.use_database) {
        (Some(url), true) => match Database::connect(url).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::error!("Database unavailable, continuing with flat file only: {}", e);
                None
            }
        },
        _ => {
            tracing::info!("Running without database");
            None
        }
    };

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Monitoring stopped by user, saving what was fetched (Ctrl-C again to quit)");
        stop.send_replace(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt, exiting");
            std::process::exit(130);
        }
    });

    let sessions = CookieSessionProvider::new(config.cookies.clone(), config.base_url.clone());
    let connector = StakeConnector::new(config.base_url.clone());
    let context = RunContext {
        config: &config,
        pool: pool.as_ref(),
        sessions: &sessions,
        connector: &connector,
        shutdown,
    };

    let summaries = context.run(&cli.mode.games()).await;
    for summary in &summaries {
        tracing::info!(
            "{}: {} new rounds, {} rounds in history, {} reports{}",
            summary.game,
            summary.sync.as_ref().map_or(0, |s| s.written()),
            summary.history_len,
            summary.reports_written,
            if summary.interrupted { " (interrupted)" } else { "" }
        );
    }

    if let Some(pool) = pool {
        pool.close().await;
    }

    Ok(())
}
