use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod cli_style;

use cli_style::{
    get_styles, print_empty_list, print_error, print_key_value, print_section_footer,
    print_section_header, print_success, print_warning, TableBuilder,
};
use listen_tracker::config::{AppConfig, CliConfig, FileConfig, DEFAULT_REDIRECT_URI};
use listen_tracker::ingestion::{CredentialProvider, CredentialStatus, MAX_PAGE_SIZE};
use listen_tracker::listen_store::{ListenStore, SqliteListenStore};
use listen_tracker::spotify::SpotifyClient;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// Manage the stored Spotify credential and inspect the listen database.
#[derive(Parser)]
#[command(styles = get_styles())]
struct CliArgs {
    /// Directory holding the listen database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML configuration file. Its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    #[clap(long, env = "SPOTIFY_CLIENT_ID")]
    pub spotify_client_id: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,

    /// Redirect URI registered for the Spotify application.
    #[clap(long, default_value = DEFAULT_REDIRECT_URI)]
    pub redirect_uri: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the URL to open in a browser to grant access.
    Url,

    /// Exchanges the code from the authorization redirect and stores the credential.
    Authorize {
        #[clap(long)]
        code: String,
    },

    /// Stores a refresh token obtained elsewhere.
    Set {
        #[clap(long)]
        refresh_token: String,
    },

    /// Shows whether a credential is stored and when it expires.
    Status,

    /// Deletes the stored credential.
    Logout,

    /// Lists the most recent ingestion runs.
    Runs {
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },

    /// Shows row counts of the listen database.
    Stats,
}

struct Session {
    config: AppConfig,
    store: Arc<SqliteListenStore>,
}

impl Session {
    fn credential_provider(&self) -> Result<CredentialProvider> {
        let client = SpotifyClient::new(self.config.spotify_client_config()?)?;
        Ok(CredentialProvider::new(self.store.clone(), Arc::new(client)))
    }
}

fn open(cli_args: &CliArgs) -> Result<Session> {
    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        ingest_interval_minutes: 10,
        page_size: MAX_PAGE_SIZE,
        spotify_client_id: cli_args.spotify_client_id.clone(),
        spotify_client_secret: cli_args.spotify_client_secret.clone(),
        redirect_uri: cli_args.redirect_uri.clone(),
        request_timeout_sec: 30,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    let store = Arc::new(
        SqliteListenStore::new(config.listen_db_path())
            .with_context(|| format!("Failed to open {:?}", config.listen_db_path()))?,
    );
    Ok(Session { config, store })
}

fn execute(command: Command, session: &Session) -> Result<()> {
    match command {
        Command::Url => {
            let provider = session.credential_provider()?;
            println!("{}", provider.authorize_url());
        }
        Command::Authorize { code } => {
            let credential = session.credential_provider()?.authorize_with_code(&code)?;
            print_success(&format!(
                "Credential stored, access token valid until {}",
                credential.expires_at
            ));
        }
        Command::Set { refresh_token } => {
            let provider = session.credential_provider()?;
            provider.set_refresh_token(&refresh_token)?;
            match provider.get_valid_token() {
                Ok(_) => print_success("Refresh token stored and verified"),
                Err(e) => print_warning(&format!(
                    "Refresh token stored but could not be used yet: {}",
                    e
                )),
            }
        }
        Command::Status => {
            print_section_header("Credential");
            match session.credential_provider()?.status()? {
                CredentialStatus::Missing => print_empty_list("No credential stored"),
                CredentialStatus::Present {
                    token_type,
                    expires_at,
                    expired,
                } => {
                    print_key_value("Token type", &token_type);
                    print_key_value("Expires at", &expires_at.to_rfc3339());
                    print_key_value("Expired", if expired { "yes" } else { "no" });
                }
            }
            print_section_footer();
        }
        Command::Logout => {
            if session.credential_provider()?.logout()? {
                print_success("Credential removed");
            } else {
                print_warning("No credential was stored");
            }
        }
        Command::Runs { limit } => {
            let runs = session.store.get_recent_runs(limit)?;
            if runs.is_empty() {
                print_empty_list("No ingestion runs recorded");
                return Ok(());
            }
            let mut table = TableBuilder::new(vec![
                "ID", "Started", "Status", "Trigger", "Fetched", "New", "Dup", "Failed", "Error",
            ]);
            for run in runs {
                table.add_row(vec![
                    run.id.to_string(),
                    run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    run.status.as_str().to_string(),
                    run.triggered_by,
                    run.counts.fetched.to_string(),
                    run.counts.inserted.to_string(),
                    run.counts.duplicates.to_string(),
                    run.counts.failed.to_string(),
                    run.error.unwrap_or_default(),
                ]);
            }
            table.print();
        }
        Command::Stats => {
            let stats = session.store.database_stats()?;
            print_section_header("Listen database");
            print_key_value("Path", &session.config.listen_db_path().display().to_string());
            print_key_value("Artists", &stats.artists.to_string());
            print_key_value("Albums", &stats.albums.to_string());
            print_key_value("Tracks", &stats.tracks.to_string());
            print_key_value("Listens", &stats.listens.to_string());
            print_section_footer();
        }
    }
    Ok(())
}

fn main() {
    let cli_args = CliArgs::parse();

    let result = open(&cli_args).and_then(|session| execute(cli_args.command, &session));
    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
