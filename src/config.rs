use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::docstore::{DEFAULT_BATCH_LIMIT, MAX_BATCH_WRITES};

/// Upper bound for session and story lifetimes: one year.
pub const MAX_LIFETIME_HOURS: u64 = 24 * 365;

#[derive(Parser, Debug)]
#[command(
    name = "wedding-gallery",
    about = "A multi-user wedding photo and story gallery server"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Report documents still sitting in the shared legacy collections
    Analyze,
    /// Run the full isolation migration: analysis, backup, move, validate
    Migrate,
    /// Check that no legacy collection still holds data
    Validate,
    /// Put a backup snapshot back into the legacy collections
    Restore {
        /// Snapshot file written by a previous migration run
        file: PathBuf,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub migration: MigrationConfig,
    pub stories: StoriesConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    pub max_upload_mb: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub bcrypt_cost: u32,
    /// Created (or promoted) at startup when both are set.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MigrationConfig {
    pub batch_limit: usize,
    pub backup_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StoriesConfig {
    pub ttl_hours: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_upload_mb: 100,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "wedding_session".to_string(),
            session_hours: 24,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_username: None,
            admin_password: None,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            backup_dir: None,
        }
    }
}

impl Default for StoriesConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            sweep_interval_secs: 300,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("gallery.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }
        if config.migration.backup_dir.is_none() {
            config.migration.backup_dir = Some(data_dir.join("backups"));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.migration.batch_limit == 0 || self.migration.batch_limit > MAX_BATCH_WRITES {
            anyhow::bail!(
                "migration.batch_limit must be between 1 and {}",
                MAX_BATCH_WRITES
            );
        }
        if self.storage.max_upload_mb == 0 {
            anyhow::bail!("storage.max_upload_mb must be at least 1");
        }
        if !(1..=MAX_LIFETIME_HOURS).contains(&self.stories.ttl_hours) {
            anyhow::bail!("stories.ttl_hours must be between 1 and {}", MAX_LIFETIME_HOURS);
        }
        if self.stories.sweep_interval_secs == 0 {
            anyhow::bail!("stories.sweep_interval_secs must be at least 1");
        }
        if !(1..=MAX_LIFETIME_HOURS).contains(&self.auth.session_hours) {
            anyhow::bail!("auth.session_hours must be between 1 and {}", MAX_LIFETIME_HOURS);
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            anyhow::bail!("auth.bcrypt_cost must be between 4 and 31");
        }
        Ok(())
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".wedding-gallery")
        })
    }

    pub fn db_path(&self) -> &Path {
        self.database
            .path
            .as_deref()
            .unwrap_or(Path::new("gallery.db"))
    }

    pub fn uploads_path(&self) -> &Path {
        self.storage.path.as_deref().unwrap_or(Path::new("uploads"))
    }

    pub fn backup_dir(&self) -> &Path {
        self.migration
            .backup_dir
            .as_deref()
            .unwrap_or(Path::new("backups"))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.storage.max_upload_mb * 1024 * 1024
    }

    pub fn story_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stories.ttl_hours as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(data_dir: Option<PathBuf>) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir,
            command: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.backend, StoreBackend::Sqlite);
        assert_eq!(config.auth.cookie_name, "wedding_session");
        assert_eq!(config.auth.session_hours, 24);
        assert_eq!(config.migration.batch_limit, 450);
        assert_eq!(config.stories.ttl_hours, 24);
        assert!(config.auth.admin_username.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli(Some(PathBuf::from("/tmp/test-gallery")));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-gallery"));
    }

    #[test]
    fn data_dir_defaults_to_dot_directory() {
        let dir = Config::data_dir(&cli(None));
        assert!(dir.ends_with(".wedding-gallery"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli(Some(tmp.path().to_path_buf()))).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.db_path(), tmp.path().join("gallery.db"));
        assert_eq!(config.uploads_path(), tmp.path().join("uploads"));
        assert_eq!(config.backup_dir(), tmp.path().join("backups"));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
backend = "memory"

[auth]
cookie_name = "gallery"
session_hours = 12
admin_username = "admin"
admin_password = "correct horse"

[migration]
batch_limit = 100

[stories]
ttl_hours = 48
"#,
        )
        .unwrap();

        let mut cli = cli(Some(tmp.path().to_path_buf()));
        cli.config = Some(config_path);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert_eq!(config.auth.cookie_name, "gallery");
        assert_eq!(config.auth.admin_username.as_deref(), Some("admin"));
        assert_eq!(config.migration.batch_limit, 100);
        assert_eq!(config.story_ttl(), chrono::Duration::hours(48));
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[server]\nhost = \"192.168.1.1\"\nport = 9000\n").unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
            command: None,
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
    }

    fn load_toml(contents: &str) -> anyhow::Result<Config> {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, contents).unwrap();

        let mut cli = cli(Some(tmp.path().to_path_buf()));
        cli.config = Some(config_path);
        Config::load(&cli)
    }

    #[test]
    fn oversized_batch_limit_is_rejected() {
        assert!(load_toml("[migration]\nbatch_limit = 501\n").is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let err = load_toml("[stories]\nsweep_interval_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));
    }

    #[test]
    fn lifetimes_are_bounded() {
        assert!(load_toml("[stories]\nttl_hours = 8761\n").is_err());
        assert!(load_toml("[auth]\nsession_hours = 0\n").is_err());
        assert!(load_toml("[auth]\nsession_hours = 100000\n").is_err());

        let config = load_toml("[stories]\nttl_hours = 8760\n[auth]\nsession_hours = 8760\n").unwrap();
        assert_eq!(config.story_ttl(), chrono::Duration::hours(8760));
    }

    #[test]
    fn restore_subcommand_parses() {
        let cli = Cli::parse_from(["wedding-gallery", "restore", "backup.json"]);
        assert_eq!(
            cli.command,
            Some(Command::Restore {
                file: PathBuf::from("backup.json")
            })
        );
    }
}
