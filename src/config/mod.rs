mod file_config;

pub use file_config::{FileConfig, IngestionConfig, SpotifyConfig};

use crate::ingestion::{DEFAULT_REFRESH_MARGIN_SECS, MAX_PAGE_SIZE};
use crate::spotify::{SpotifyClientConfig, DEFAULT_ACCOUNTS_BASE_URL, DEFAULT_API_BASE_URL};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const LISTEN_DB_FILE_NAME: &str = "listens.db";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5173/callback";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub ingest_interval_minutes: u64,
    pub page_size: u32,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub redirect_uri: String,
    pub request_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub ingestion: IngestionSettings,
    pub spotify: SpotifySettings,
}

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub interval: Duration,
    pub page_size: u32,
    pub refresh_margin_secs: i64,
    pub run_on_startup: bool,
}

#[derive(Clone)]
pub struct SpotifySettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub accounts_base_url: String,
    pub request_timeout: Duration,
}

/// Debug placeholder for an optional secret, keeping whether it is set.
pub(crate) fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("db_dir", &self.db_dir)
            .field("ingest_interval_minutes", &self.ingest_interval_minutes)
            .field("page_size", &self.page_size)
            .field("spotify_client_id", &self.spotify_client_id)
            .field("spotify_client_secret", &redact(&self.spotify_client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("request_timeout_sec", &self.request_timeout_sec)
            .finish()
    }
}

impl std::fmt::Debug for SpotifySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifySettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("api_base_url", &self.api_base_url)
            .field("accounts_base_url", &self.accounts_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let ingestion_file = file.ingestion.unwrap_or_default();
        let interval_minutes = ingestion_file
            .interval_minutes
            .unwrap_or(cli.ingest_interval_minutes);
        if interval_minutes == 0 {
            bail!("Ingestion interval must be at least one minute");
        }
        let ingestion = IngestionSettings {
            interval: Duration::from_secs(interval_minutes * 60),
            page_size: ingestion_file
                .page_size
                .unwrap_or(cli.page_size)
                .clamp(1, MAX_PAGE_SIZE),
            refresh_margin_secs: ingestion_file
                .refresh_margin_secs
                .unwrap_or(DEFAULT_REFRESH_MARGIN_SECS),
            run_on_startup: ingestion_file.run_on_startup.unwrap_or(true),
        };

        let spotify_file = file.spotify.unwrap_or_default();
        let spotify = SpotifySettings {
            client_id: spotify_file
                .client_id
                .or_else(|| cli.spotify_client_id.clone()),
            client_secret: spotify_file
                .client_secret
                .or_else(|| cli.spotify_client_secret.clone()),
            redirect_uri: spotify_file
                .redirect_uri
                .unwrap_or_else(|| cli.redirect_uri.clone()),
            api_base_url: spotify_file
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            accounts_base_url: spotify_file
                .accounts_base_url
                .unwrap_or_else(|| DEFAULT_ACCOUNTS_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(
                spotify_file
                    .request_timeout_sec
                    .unwrap_or(cli.request_timeout_sec),
            ),
        };

        Ok(AppConfig {
            db_dir,
            ingestion,
            spotify,
        })
    }

    pub fn listen_db_path(&self) -> PathBuf {
        self.db_dir.join(LISTEN_DB_FILE_NAME)
    }

    /// Fails when the client credentials weren't configured anywhere.
    pub fn spotify_client_config(&self) -> Result<SpotifyClientConfig> {
        let (Some(client_id), Some(client_secret)) =
            (&self.spotify.client_id, &self.spotify.client_secret)
        else {
            bail!(
                "Spotify client id and secret are required (--spotify-client-id/--spotify-client-secret, \
                 SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET or the [spotify] config section)"
            );
        };
        Ok(SpotifyClientConfig {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_uri: self.spotify.redirect_uri.clone(),
            api_base_url: self.spotify.api_base_url.clone(),
            accounts_base_url: self.spotify.accounts_base_url.clone(),
            timeout: self.spotify.request_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(db_dir: Option<PathBuf>) -> CliConfig {
        CliConfig {
            db_dir,
            ingest_interval_minutes: 10,
            page_size: 50,
            spotify_client_id: Some("cli-id".to_string()),
            spotify_client_secret: Some("cli-secret".to_string()),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            request_timeout_sec: 30,
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli(Some(temp_dir.path().to_path_buf())), None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.listen_db_path(), temp_dir.path().join("listens.db"));
        assert_eq!(config.ingestion.interval, Duration::from_secs(600));
        assert_eq!(config.ingestion.page_size, 50);
        assert_eq!(config.ingestion.refresh_margin_secs, 60);
        assert!(config.ingestion.run_on_startup);

        let spotify = config.spotify_client_config().unwrap();
        assert_eq!(spotify.client_id, "cli-id");
        assert_eq!(spotify.api_base_url, "https://api.spotify.com/v1");
        assert_eq!(spotify.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_file_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let toml_str = format!(
            r#"
            db_dir = "{}"

            [ingestion]
            interval_minutes = 3
            page_size = 200
            run_on_startup = false

            [spotify]
            client_id = "file-id"
            redirect_uri = "https://example.com/callback"
            request_timeout_sec = 5
            "#,
            temp_dir.path().display()
        );
        let file: FileConfig = toml::from_str(&toml_str).unwrap();

        let config = AppConfig::resolve(&cli(None), Some(file)).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.ingestion.interval, Duration::from_secs(180));
        assert_eq!(config.ingestion.page_size, 50);
        assert!(!config.ingestion.run_on_startup);
        let spotify = config.spotify_client_config().unwrap();
        assert_eq!(spotify.client_id, "file-id");
        assert_eq!(spotify.client_secret, "cli-secret");
        assert_eq!(spotify.redirect_uri, "https://example.com/callback");
        assert_eq!(spotify.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_db_dir_fails() {
        assert!(AppConfig::resolve(&cli(None), None).is_err());
        assert!(AppConfig::resolve(&cli(Some(PathBuf::from("/nonexistent/dir"))), None).is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut cli = cli(Some(temp_dir.path().to_path_buf()));
        cli.ingest_interval_minutes = 0;
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_missing_client_credentials() {
        let temp_dir = TempDir::new().unwrap();
        let mut cli = cli(Some(temp_dir.path().to_path_buf()));
        cli.spotify_client_secret = None;
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(config.spotify_client_config().is_err());
    }

    #[test]
    fn test_debug_output_hides_client_secret() {
        let temp_dir = TempDir::new().unwrap();
        let cli = cli(Some(temp_dir.path().to_path_buf()));
        let config = AppConfig::resolve(&cli, None).unwrap();

        for rendered in [
            format!("{:?}", cli),
            format!("{:?}", config),
            format!("{:?}", config.spotify_client_config().unwrap()),
        ] {
            assert!(rendered.contains("cli-id"));
            assert!(rendered.contains("<redacted>"));
            assert!(!rendered.contains("cli-secret"));
        }

        let file: FileConfig =
            toml::from_str("[spotify]\nclient_secret = \"file-secret\"\n").unwrap();
        let rendered = format!("{:?}", file);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("file-secret"));

        let mut cli = cli;
        cli.spotify_client_secret = None;
        assert!(format!("{:?}", cli).contains("spotify_client_secret: None"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[ingestion]\ninterval_minutes = 15\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.ingestion.unwrap().interval_minutes, Some(15));
        assert!(FileConfig::load(&temp_dir.path().join("missing.toml")).is_err());
    }
}
