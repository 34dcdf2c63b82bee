//! Environment-provided bot configuration.
//!
//! Credentials and the feed roster come from `KIBITZ_*` environment
//! variables; everything else has defaults matching the production
//! deployment. The ledger file defaults to the XDG data directory.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Default trigger keywords (matched as substrings of normalized text).
pub const DEFAULT_KEYWORDS: &[&str] = &["pipi", "pampers", "tigran", "petrosian"];

/// Default feeds to watch.
pub const DEFAULT_FEEDS: &[&str] = &["chess", "anarchychess"];

/// Default "loose" feeds, where the random easter-egg reply is allowed.
pub const DEFAULT_LOOSE_FEEDS: &[&str] = &["anarchychess"];

/// How often the cleanup sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How many of the bot's own recent comments the sweeper examines per pass.
pub const SWEEP_WINDOW: usize = 100;

/// Full bot configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// OAuth client id of the script app.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Account the bot posts as.
    pub username: String,
    /// Account password (script-app password grant).
    pub password: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Feeds to watch (each gets a comment watcher and a submission watcher).
    pub feeds: Vec<String>,
    /// Subset of feeds with looser moderation tolerance.
    pub loose_feeds: Vec<String>,
    /// Trigger keywords, already lowercased.
    pub keywords: Vec<String>,
    /// Path of the redb ledger file.
    pub ledger_path: PathBuf,
}

impl BotConfig {
    /// Resolve configuration from the environment.
    ///
    /// Required: `KIBITZ_CLIENT_ID`, `KIBITZ_CLIENT_SECRET`,
    /// `KIBITZ_USERNAME`, `KIBITZ_PASSWORD`.
    /// Optional: `KIBITZ_FEEDS`, `KIBITZ_LOOSE_FEEDS`, `KIBITZ_KEYWORDS`
    /// (comma-separated), `KIBITZ_LEDGER_PATH`.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            client_id: require_env("KIBITZ_CLIENT_ID")?,
            client_secret: require_env("KIBITZ_CLIENT_SECRET")?,
            username: require_env("KIBITZ_USERNAME")?,
            password: require_env("KIBITZ_PASSWORD")?,
            user_agent: format!("kibitz/{}", env!("CARGO_PKG_VERSION")),
            feeds: list_env("KIBITZ_FEEDS", DEFAULT_FEEDS),
            loose_feeds: list_env("KIBITZ_LOOSE_FEEDS", DEFAULT_LOOSE_FEEDS),
            keywords: list_env("KIBITZ_KEYWORDS", DEFAULT_KEYWORDS),
            ledger_path: match std::env::var("KIBITZ_LEDGER_PATH") {
                Ok(path) => PathBuf::from(path),
                Err(_) => default_ledger_path()?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate this configuration, returning an error if invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid {
                message: "at least one feed must be configured".to_string(),
            });
        }
        if self.keywords.is_empty() {
            return Err(ConfigError::Invalid {
                message: "at least one trigger keyword must be configured".to_string(),
            });
        }
        for feed in &self.loose_feeds {
            if !self.feeds.contains(feed) {
                return Err(ConfigError::Invalid {
                    message: format!("loose feed \"{feed}\" is not in the watched feed list"),
                });
            }
        }
        Ok(())
    }

    /// A config with test credentials and defaults, for unit tests.
    #[doc(hidden)]
    pub fn for_tests(username: &str, ledger_path: PathBuf) -> Self {
        Self {
            client_id: "test-client".into(),
            client_secret: "test-secret".into(),
            username: username.to_string(),
            password: "test-password".into(),
            user_agent: "kibitz/test".into(),
            feeds: DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
            loose_feeds: DEFAULT_LOOSE_FEEDS.iter().map(|s| s.to_string()).collect(),
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            ledger_path,
        }
    }
}

/// Read a required environment variable.
fn require_env(name: &str) -> ConfigResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv {
            name: name.to_string(),
        })
}

/// Read a comma-separated list, lowercased, falling back to `default`.
fn list_env(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// `$XDG_DATA_HOME/kibitz/ledger.redb`, falling back to `~/.local/share`.
fn default_ledger_path() -> ConfigResult<PathBuf> {
    let data_dir = match std::env::var("XDG_DATA_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = std::env::var("HOME")
                .map(PathBuf::from)
                .map_err(|_| ConfigError::NoHome)?;
            home.join(".local/share")
        }
    };
    Ok(data_dir.join("kibitz").join("ledger.redb"))
}
