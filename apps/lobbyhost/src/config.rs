//! Host configuration.
//!
//! Configuration is stored as JSON in `lobbyhost.json` next to the working
//! directory, unless another path is given as the first argument or in
//! `LOBBYHOST_CONFIG`. Every field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lobbyhost_server::ServerConfig;
use lobbyhost_session::{Presentation, SessionConfig};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "lobbyhost.json";

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "LOBBYHOST_CONFIG";

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// First viewer port to try.
    pub listen_port: u16,
    /// Successive ports tried when the listen port is taken.
    pub port_attempts: u16,
    /// SQLite catalog file.
    pub database_file: PathBuf,
    /// Stored device credentials.
    pub credentials_file: PathBuf,
    pub catalog: CatalogConfig,
    /// Presentation applied after every login.
    pub defaults: Presentation,
    pub status_messages: Vec<String>,
    pub status_interval_secs: u64,
    pub auto_accept_friend_requests: bool,
    pub auto_accept_party_invites: bool,
    /// Frames that may wait for one viewer before it is dropped.
    pub max_outbound_queue: usize,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

/// Remote catalog settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Overrides the public catalog endpoint.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Pull the full listing once at startup.
    pub refresh_on_start: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            refresh_on_start: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            listen_port: 3000,
            port_attempts: 10,
            database_file: "cosmetics.db".into(),
            credentials_file: "deviceauth.json".into(),
            catalog: CatalogConfig::default(),
            defaults: session.defaults,
            status_messages: session.status_messages,
            status_interval_secs: session.status_interval.as_secs(),
            auto_accept_friend_requests: session.auto_accept_friend_requests,
            auto_accept_party_invites: session.auto_accept_party_invites,
            max_outbound_queue: lobbyhost_server::DEFAULT_OUTBOUND_QUEUE,
            log_level: "info".into(),
        }
    }
}

/// Result of reading the configuration file.
pub struct Loaded {
    pub config: Config,
    pub path: PathBuf,
    /// Set when the file existed but could not be used.
    pub warning: Option<String>,
}

impl Config {
    /// Resolves the configuration path from the first CLI argument, then
    /// `LOBBYHOST_CONFIG`, then the default file name.
    pub fn path_from(arg: Option<String>, env: Option<String>) -> PathBuf {
        arg.or(env)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Loads the configuration at `path`.
    ///
    /// A missing file yields the defaults. A file that cannot be read or
    /// parsed also yields the defaults, with the reason in `warning` so it
    /// can be logged once logging is up.
    pub fn load(path: &Path) -> Loaded {
        let (config, warning) = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => (config, None),
                Err(e) => (Config::default(), Some(format!("invalid config: {e}"))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Config::default(), None),
            Err(e) => (Config::default(), Some(format!("unreadable config: {e}"))),
        };

        Loaded {
            config,
            path: path.to_path_buf(),
            warning,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.listen_port,
            port_attempts: self.port_attempts,
            max_outbound_queue: self.max_outbound_queue.max(1),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            defaults: self.defaults.clone(),
            status_messages: self.status_messages.clone(),
            status_interval: Duration::from_secs(self.status_interval_secs.max(1)),
            auto_accept_friend_requests: self.auto_accept_friend_requests,
            auto_accept_party_invites: self.auto_accept_party_invites,
        }
    }
}
