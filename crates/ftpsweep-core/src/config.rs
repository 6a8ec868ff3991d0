//! Configuration sources and the per-cycle resolver
//!
//! Nothing here is cached: every accessor on [`SweepConfig`] asks its source
//! again, so edits to the environment or the config file apply on the next
//! cycle without restarting the daemon.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::{error, warn};

use crate::{Error, Result};

/// Recognized configuration keys
pub mod keys {
    pub const FTP_HOST: &str = "FTP_HOST";
    pub const FTP_PORT: &str = "FTP_PORT";
    pub const FTP_USER: &str = "FTP_USER";
    pub const FTP_PASSWORD: &str = "FTP_PASSWORD";
    pub const FTP_DIRECTORY: &str = "FTP_DIRECTORY";
    pub const FTP_TIMEOUT_SECONDS: &str = "FTP_TIMEOUT_SECONDS";
    pub const DELETE_OLDER_THAN_DAYS: &str = "DeleteOlderThanXDays";
    pub const CYCLE_TIME_HOURS: &str = "CycleTimeInHours";
    pub const DRY_RUN: &str = "DRY_RUN";
    pub const FAILURE_POLICY: &str = "FAILURE_POLICY";
}

const DEFAULT_PORT: u16 = 21;
const DEFAULT_CYCLE_HOURS: u64 = 24;

/// A key/value lookup consulted fresh on every read
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key/value pairs (command-line overrides, tests)
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Parse a `KEY=VALUE` command-line override
///
/// Accepts `--KEY=VALUE` and `/KEY=VALUE` as well, the way generic host
/// command-line binding does.
pub fn parse_override(arg: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg))?;

    let key = key
        .strip_prefix("--")
        .or_else(|| key.strip_prefix('/'))
        .unwrap_or(key)
        .trim();

    if key.is_empty() {
        return Err(format!("missing key in '{}'", arg));
    }

    Ok((key.to_string(), value.to_string()))
}

/// One top-level value of the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Setting {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
    Unsupported(toml::Value),
}

impl Setting {
    fn render(&self, key: &str) -> Option<String> {
        match self {
            Setting::Text(s) => Some(s.clone()),
            Setting::Integer(i) => Some(i.to_string()),
            Setting::Float(f) => Some(f.to_string()),
            Setting::Flag(b) => Some(b.to_string()),
            Setting::Unsupported(other) => {
                warn!("Config key {} has unsupported type {}", key, other.type_str());
                None
            }
        }
    }
}

/// Contents of the config file: flat `KEY = value` pairs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
struct ConfigFile {
    settings: BTreeMap<String, Setting>,
}

/// Flat TOML file of `KEY = value` pairs
///
/// The file is re-parsed whenever its modification time changes. A missing
/// file behaves like an empty one.
pub struct FileSource {
    path: PathBuf,
    cache: Mutex<Option<(SystemTime, Option<ConfigFile>)>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Default config file location: ~/.config/ftpsweep/config.toml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("ftpsweep")
            .join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Option<ConfigFile> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read config file {}: {}", self.path.display(), e);
                return None;
            }
        };

        let mut cache = self.cache.lock().ok()?;
        if let Some((stamp, file)) = cache.as_ref() {
            if *stamp == modified {
                return file.clone();
            }
        }

        let parsed = std::fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                toml::from_str::<ConfigFile>(&content).map_err(|e| e.to_string())
            });

        let file = match parsed {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Ignoring config file {}: {}", self.path.display(), e);
                None
            }
        };

        *cache = Some((modified, file.clone()));
        file
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource").field("path", &self.path).finish()
    }
}

impl ConfigSource for FileSource {
    fn get(&self, key: &str) -> Option<String> {
        self.load()?.settings.get(key)?.render(key)
    }
}

/// Stack of sources; later layers override earlier ones
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().rev().find_map(|layer| layer.get(key))
    }
}

/// What a fail-fast condition does to the running service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the service
    #[default]
    Terminate,
    /// Log and try again next cycle
    Retry,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate => f.write_str("terminate"),
            Self::Retry => f.write_str("retry"),
        }
    }
}

/// Everything needed to open a session with the server
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Option<Duration>,
}

impl ConnectionParams {
    /// `host:port`, keeping an explicit port or bracketed IPv6 host as given
    pub fn address(&self) -> String {
        let has_port = match self.host.rsplit_once(':') {
            Some((head, port)) => {
                port.parse::<u16>().is_ok() && (!head.contains(':') || head.ends_with(']'))
            }
            None => false,
        };

        if has_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"********")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Typed accessors over a [`ConfigSource`]
#[derive(Clone)]
pub struct SweepConfig {
    source: Arc<dyn ConfigSource>,
}

impl SweepConfig {
    pub fn new(source: impl ConfigSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    pub fn from_shared(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }

    /// Raw lookup; empty values count as unset
    fn value(&self, key: &str) -> Option<String> {
        self.source.get(key).filter(|v| !v.is_empty())
    }

    pub fn host(&self) -> Option<String> {
        self.value(keys::FTP_HOST)
    }

    pub fn user(&self) -> Option<String> {
        self.value(keys::FTP_USER)
    }

    pub fn password(&self) -> Option<String> {
        self.value(keys::FTP_PASSWORD)
    }

    pub fn directory(&self) -> Option<String> {
        self.value(keys::FTP_DIRECTORY)
    }

    pub fn port(&self) -> u16 {
        let Some(raw) = self.value(keys::FTP_PORT) else {
            return DEFAULT_PORT;
        };

        match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => {
                warn!(
                    "Could not parse {}: '{}', defaulting to {}.",
                    keys::FTP_PORT,
                    raw,
                    DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        }
    }

    /// Retention window in days
    ///
    /// Unset, non-numeric and negative values are all errors; the variant
    /// says which.
    pub fn max_age_days(&self) -> Result<u32> {
        let raw = self
            .value(keys::DELETE_OLDER_THAN_DAYS)
            .ok_or(Error::ConfigMissing(keys::DELETE_OLDER_THAN_DAYS))?;

        let malformed = |reason| Error::ConfigMalformed {
            key: keys::DELETE_OLDER_THAN_DAYS,
            value: raw.clone(),
            reason,
        };

        let days: i64 = raw.trim().parse().map_err(|_| malformed("not a number"))?;
        if days < 0 {
            return Err(malformed("must not be negative"));
        }
        u32::try_from(days).map_err(|_| malformed("too large"))
    }

    /// Pause between cycles; falls back to 24 hours rather than failing
    pub fn cycle_interval(&self) -> Duration {
        let fallback = Duration::from_secs(DEFAULT_CYCLE_HOURS * 3600);

        let Some(raw) = self.value(keys::CYCLE_TIME_HOURS) else {
            error!(
                "{} not set, defaulting to {} hours.",
                keys::CYCLE_TIME_HOURS,
                DEFAULT_CYCLE_HOURS
            );
            return fallback;
        };

        match raw.trim().parse::<i64>() {
            Ok(hours) if hours >= 0 => match (hours as u64).checked_mul(3600) {
                Some(secs) => Duration::from_secs(secs),
                None => {
                    error!(
                        "{} is too large: '{}', defaulting to {} hours.",
                        keys::CYCLE_TIME_HOURS,
                        raw,
                        DEFAULT_CYCLE_HOURS
                    );
                    fallback
                }
            },
            Ok(_) => {
                error!(
                    "{} must not be negative: '{}', defaulting to {} hours.",
                    keys::CYCLE_TIME_HOURS,
                    raw,
                    DEFAULT_CYCLE_HOURS
                );
                fallback
            }
            Err(_) => {
                error!(
                    "Could not parse {}: '{}', defaulting to {} hours.",
                    keys::CYCLE_TIME_HOURS,
                    raw,
                    DEFAULT_CYCLE_HOURS
                );
                fallback
            }
        }
    }

    /// Only the literal "N" turns dry run off
    pub fn dry_run(&self) -> bool {
        self.value(keys::DRY_RUN).as_deref() != Some("N")
    }

    pub fn timeout(&self) -> Option<Duration> {
        let raw = self.value(keys::FTP_TIMEOUT_SECONDS)?;
        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => {
                warn!(
                    "Could not parse {}: '{}', using transport default.",
                    keys::FTP_TIMEOUT_SECONDS,
                    raw
                );
                None
            }
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        let Some(raw) = self.value(keys::FAILURE_POLICY) else {
            return FailurePolicy::default();
        };

        match raw.trim().to_ascii_lowercase().as_str() {
            "terminate" => FailurePolicy::Terminate,
            "retry" => FailurePolicy::Retry,
            _ => {
                warn!(
                    "Unknown {}: '{}', defaulting to terminate.",
                    keys::FAILURE_POLICY,
                    raw
                );
                FailurePolicy::Terminate
            }
        }
    }

    /// Host, user and password, checked in that order
    pub fn connection_params(&self) -> Result<ConnectionParams> {
        let host = self.host().ok_or(Error::ConfigMissing(keys::FTP_HOST))?;
        let username = self.user().ok_or(Error::ConfigMissing(keys::FTP_USER))?;
        let password = self
            .password()
            .ok_or(Error::ConfigMissing(keys::FTP_PASSWORD))?;

        Ok(ConnectionParams {
            host,
            port: self.port(),
            username,
            password,
            timeout: self.timeout(),
        })
    }
}

impl fmt::Debug for SweepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepConfig").finish_non_exhaustive()
    }
}
