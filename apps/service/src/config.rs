use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::{DEFAULT_BODY_LIMIT, DEFAULT_USER_AGENT};
use crate::queue::{ACK_MARGIN, DEFAULT_PENDING_TIMEOUT, covers_longest_probe};
use crate::validation::MAX_TIMEOUT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {}", .0.display(), .1)]
    Read(path::PathBuf, std::io::Error),

    #[error("failed to write config {}: {}", .0.display(), .1)]
    Write(path::PathBuf, std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    PathUnavailable,

    #[error(
        "queue.pending_timeout_secs = {0} would redeliver tasks still being probed (needs at least {1})"
    )]
    PendingWindowTooShort(u64, u64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub workers: WorkersConfig,
    pub probe: ProbeConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Tasks live in the service database and survive restarts
    Libsql,
    /// Tasks live in process memory
    Memory,
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueBackend::Libsql => write!(f, "libsql"),
            QueueBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub name: String,
    /// How long a claimed task may stay unacknowledged before redelivery
    pub pending_timeout_secs: u64,
    /// How often a blocked consumer looks for work
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub concurrency: usize,
    pub consumer_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub body_limit_bytes: usize,
    pub user_agent: String,
    /// Used for monitors submitted with a zero timeout
    pub default_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the schedule is re-synced with the monitor table
    pub reload_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: path::PathBuf::from("uppe_synthetics.db"), max_connections: 16 }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Libsql,
            name: "checks".into(),
            pending_timeout_secs: DEFAULT_PENDING_TIMEOUT.as_secs(),
            poll_interval_ms: 500,
        }
    }
}

impl QueueConfig {
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { concurrency: 10, consumer_prefix: "worker".into() }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            user_agent: DEFAULT_USER_AGENT.into(),
            default_timeout_ms: 10_000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { reload_interval_secs: 30 }
    }
}

impl SchedulerConfig {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/synthetics.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(path.join("uppe/synthetics.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;

        write_title_1(f, "Queue")?;
        write_1(f, "Backend", &self.queue.backend)?;
        write_1(f, "Name", &self.queue.name)?;
        write_1(f, "Pending Timeout (s)", &self.queue.pending_timeout_secs)?;
        write_1(f, "Poll Interval (ms)", &self.queue.poll_interval_ms)?;

        write_title_1(f, "Workers")?;
        write_1(f, "Concurrency", &self.workers.concurrency)?;
        write_1(f, "Consumer Prefix", &self.workers.consumer_prefix)?;

        write_title_1(f, "Probe")?;
        write_1(f, "Body Limit (bytes)", &self.probe.body_limit_bytes)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_1(f, "Default Timeout (ms)", &self.probe.default_timeout_ms)?;

        write_title_1(f, "Scheduler")?;
        write_1(f, "Reload Interval (s)", &self.scheduler.reload_interval_secs)?;

        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/synthetics.toml
    ///  or the specified path if one does not exist
    ///
    /// ```rust,no_run
    /// use uppe_synthetics::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), uppe_synthetics::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|err| ConfigError::Read(config_path.clone(), err))?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Reject settings that break delivery guarantees
    ///
    /// A claimed task must stay with its consumer for as long as the
    /// slowest valid probe can run, or a second worker picks it up midway.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !covers_longest_probe(self.queue.pending_timeout()) {
            return Err(ConfigError::PendingWindowTooShort(
                self.queue.pending_timeout_secs,
                (MAX_TIMEOUT + ACK_MARGIN).as_secs(),
            ));
        }
        Ok(())
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| ConfigError::Write(path.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| ConfigError::Write(path.to_path_buf(), err))
    }
}
