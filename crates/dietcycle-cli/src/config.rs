//! Configuration file management for dietcycle.
//!
//! Provides a TOML-based config file at `~/.config/dietcycle/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use dietcycle_core::link::LinkSigner;
use dietcycle_core::projection::CYCLE_LENGTH_DAYS;
use dietcycle_core::reminder::ReminderConfig;
use dietcycle_core::service::EngineConfig;
use dietcycle_db::config::DbConfig;

pub const LINK_SECRET_ENV: &str = "DIETCYCLE_LINK_SECRET";
pub const RECOMMENDER_URL_ENV: &str = "DIETCYCLE_RECOMMENDER_URL";
pub const MAIL_RELAY_URL_ENV: &str = "DIETCYCLE_MAIL_RELAY_URL";
pub const FRONTEND_URL_ENV: &str = "DIETCYCLE_FRONTEND_URL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub links: LinksSection,
    #[serde(default)]
    pub recommender: RecommenderSection,
    #[serde(default)]
    pub mail: MailSection,
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub cycle: CycleSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
    /// Pool size; defaults to `DbConfig::DEFAULT_MAX_CONNECTIONS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinksSection {
    /// Hex-encoded feedback-link secret (64 hex chars = 32 bytes).
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderSection {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for RecommenderSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000".to_owned(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSection {
    /// Unset: emails are only logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

impl Default for MailSection {
    fn default() -> Self {
        Self {
            relay_url: None,
            from: "no-reply@dietcycle.local".to_owned(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub frontend_url: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSection {
    pub length_days: i64,
}

impl Default for CycleSection {
    fn default() -> Self {
        Self {
            length_days: CYCLE_LENGTH_DAYS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub interval_secs: u64,
    pub reminder_age_secs: i64,
    pub debounce_secs: i64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval_secs: 86_400,
            reminder_age_secs: CYCLE_LENGTH_DAYS * 86_400,
            debounce_secs: 86_400,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the dietcycle config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/dietcycle` or
/// `~/.config/dietcycle`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dietcycle");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("dietcycle")
}

/// Return the path to the dietcycle config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Generate a random link secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_link_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct DietCycleConfig {
    pub db_config: DbConfig,
    pub link_signer: LinkSigner,
    pub recommender_url: String,
    pub recommender_timeout: Duration,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    pub engine: EngineConfig,
    pub scheduler_interval: Duration,
}

impl DietCycleConfig {
    /// Resolve configuration from the environment and the config file on
    /// disk, if any.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        Self::from_sources(cli_db_url, load_config().ok())
    }

    /// - DB URL: `cli_db_url` > `DIETCYCLE_DATABASE_URL` > `database.url` > default
    /// - Link secret: `DIETCYCLE_LINK_SECRET` > `links.secret` (hex) > error
    /// - Recommender, mail relay, frontend URLs: env var > file > default
    pub fn from_sources(cli_db_url: Option<&str>, file: Option<ConfigFile>) -> Result<Self> {
        let db_url = if let Some(url) = cli_db_url {
            url.to_owned()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Some(ref cfg) = file {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_owned()
        };

        let link_signer = if let Ok(secret_hex) = std::env::var(LINK_SECRET_ENV) {
            let bytes = hex::decode(&secret_hex)
                .with_context(|| format!("{LINK_SECRET_ENV} env var is not valid hex"))?;
            LinkSigner::new(bytes)
        } else if let Some(ref cfg) = file {
            let bytes =
                hex::decode(&cfg.links.secret).context("invalid hex in config file links.secret")?;
            LinkSigner::new(bytes)
        } else {
            bail!(
                "link secret not found; set {LINK_SECRET_ENV} or run `dietcycle init` to create a config file"
            );
        };

        let mut db_config = DbConfig::new(db_url);
        if let Some(max) = file.as_ref().and_then(|cfg| cfg.database.max_connections) {
            db_config = db_config.with_max_connections(max);
        }

        let (recommender, mail, app, cycle, scheduler) = match file {
            Some(cfg) => (cfg.recommender, cfg.mail, cfg.app, cfg.cycle, cfg.scheduler),
            None => Default::default(),
        };

        if cycle.length_days < 1 {
            bail!("cycle.length_days must be at least 1");
        }
        if scheduler.interval_secs == 0 {
            bail!("scheduler.interval_secs must be at least 1");
        }
        if scheduler.reminder_age_secs < 0 || scheduler.debounce_secs < 0 {
            bail!("scheduler ages must not be negative");
        }

        let recommender_url = std::env::var(RECOMMENDER_URL_ENV).unwrap_or(recommender.url);
        let mail_relay_url = std::env::var(MAIL_RELAY_URL_ENV).ok().or(mail.relay_url);
        let frontend_url = std::env::var(FRONTEND_URL_ENV).unwrap_or(app.frontend_url);
        let mail_timeout = Duration::from_secs(mail.timeout_secs);

        Ok(Self {
            db_config,
            link_signer,
            recommender_url,
            recommender_timeout: Duration::from_secs(recommender.timeout_secs),
            mail_relay_url,
            mail_from: mail.from,
            engine: EngineConfig {
                cycle_length_days: cycle.length_days,
                frontend_url,
                mail_timeout,
                reminder: ReminderConfig {
                    reminder_age: chrono::Duration::seconds(scheduler.reminder_age_secs),
                    debounce_window: chrono::Duration::seconds(scheduler.debounce_secs),
                },
            },
            scheduler_interval: Duration::from_secs(scheduler.interval_secs),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
