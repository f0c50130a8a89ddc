use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listen_tracker::background_jobs::{jobs::ListenIngestionJob, JobContext, JobScheduler};
use listen_tracker::config::{AppConfig, CliConfig, FileConfig, DEFAULT_REDIRECT_URI};
use listen_tracker::ingestion::{CredentialProvider, IngestionRunner, MAX_PAGE_SIZE};
use listen_tracker::listen_store::{ListenStore, SqliteListenStore};
use listen_tracker::spotify::{PlaybackHistorySource, SpotifyClient, TokenEndpoint};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser)]
struct CliArgs {
    /// Directory holding the listen database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML configuration file. Its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Minutes between two ingestion runs.
    #[clap(long, default_value_t = 10)]
    pub ingest_interval_minutes: u64,

    /// Number of recently played items requested per run.
    #[clap(long, default_value_t = MAX_PAGE_SIZE)]
    pub page_size: u32,

    #[clap(long, env = "SPOTIFY_CLIENT_ID")]
    pub spotify_client_id: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,

    /// Redirect URI registered for the Spotify application.
    #[clap(long, default_value = DEFAULT_REDIRECT_URI)]
    pub redirect_uri: String,

    /// Timeout in seconds for Spotify requests.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_sec: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            ingest_interval_minutes: self.ingest_interval_minutes,
            page_size: self.page_size,
            spotify_client_id: self.spotify_client_id.clone(),
            spotify_client_secret: self.spotify_client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            request_timeout_sec: self.request_timeout_sec,
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!(
        "listen-tracker {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening listen database at {:?}...", config.listen_db_path());
    let store = Arc::new(SqliteListenStore::new(config.listen_db_path())?);
    let stats = store.database_stats()?;
    info!(
        "Listen database has {} listens of {} tracks",
        stats.listens, stats.tracks
    );

    // The blocking client owns its own runtime, so it is built and dropped
    // outside of the async one.
    let spotify = Arc::new(SpotifyClient::new(config.spotify_client_config()?)?);
    let credentials = Arc::new(
        CredentialProvider::new(
            store.clone(),
            spotify.clone() as Arc<dyn TokenEndpoint>,
        )
        .with_refresh_margin(chrono::Duration::seconds(
            config.ingestion.refresh_margin_secs,
        )),
    );
    let runner = Arc::new(IngestionRunner::new(
        store.clone(),
        credentials,
        spotify.clone() as Arc<dyn PlaybackHistorySource>,
        config.ingestion.page_size,
    ));
    let job = ListenIngestionJob::new(
        runner,
        config.ingestion.interval,
        config.ingestion.run_on_startup,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        let shutdown_token = CancellationToken::new();
        let job_context = JobContext::new(shutdown_token.child_token(), store.clone());
        let mut scheduler = JobScheduler::new(shutdown_token.clone(), job_context);
        scheduler.register_job(Arc::new(job));

        info!(
            "Ingesting every {:?} (page size {})",
            config.ingestion.interval, config.ingestion.page_size
        );
        let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Shutdown requested");
        shutdown_token.cancel();
        scheduler_handle.await.context("Scheduler task failed")?;
        Ok::<(), anyhow::Error>(())
    })?;

    drop(runtime);
    drop(spotify);
    info!("Bye");
    Ok(())
}
