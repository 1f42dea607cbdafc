use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_UPLOAD_URL: &str = "http://localhost:8000/upload";
const DEFAULT_STREAM_URL: &str = "ws://localhost:8000/ws/process";
const DEFAULT_POLL_MS: u64 = 50;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REFRESH_MS: u64 = 500;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    service: Option<ServiceConfigFile>,
    channel: Option<ChannelConfigFile>,
    dashboard: Option<DashboardConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    upload_url: Option<String>,
    stream_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChannelConfigFile {
    poll_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DashboardConfigFile {
    refresh_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub upload_url: String,
    pub stream_url: String,
    pub channel: ChannelSettings,
    pub refresh: Duration,
}

/// Timing knobs for channel workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Socket read timeout; bounds how long `close` waits on an idle channel.
    pub poll_interval: Duration,
    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            channel: ChannelSettings::default(),
            refresh: Duration::from_millis(DEFAULT_REFRESH_MS),
        }
    }
}

impl MonitorConfig {
    /// Loads defaults, then the JSON file named by `CROSSROAD_CONFIG`, then
    /// `CROSSROAD_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROSSROAD_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as `load`, but with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let defaults = Self::default();
        let upload_url = file
            .service
            .as_ref()
            .and_then(|service| service.upload_url.clone())
            .unwrap_or(defaults.upload_url);
        let stream_url = file
            .service
            .and_then(|service| service.stream_url)
            .unwrap_or(defaults.stream_url);
        let channel = ChannelSettings {
            poll_interval: file
                .channel
                .as_ref()
                .and_then(|channel| channel.poll_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.channel.poll_interval),
            connect_timeout: file
                .channel
                .and_then(|channel| channel.connect_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.channel.connect_timeout),
        };
        let refresh = file
            .dashboard
            .and_then(|dashboard| dashboard.refresh_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.refresh);
        Self {
            upload_url,
            stream_url,
            channel,
            refresh,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CROSSROAD_UPLOAD_URL") {
            if !url.trim().is_empty() {
                self.upload_url = url.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("CROSSROAD_STREAM_URL") {
            if !url.trim().is_empty() {
                self.stream_url = url.trim().to_string();
            }
        }
        if let Some(ms) = env_millis("CROSSROAD_POLL_MS")? {
            self.channel.poll_interval = ms;
        }
        if let Some(ms) = env_millis("CROSSROAD_CONNECT_TIMEOUT_MS")? {
            self.channel.connect_timeout = ms;
        }
        if let Some(ms) = env_millis("CROSSROAD_REFRESH_MS")? {
            self.refresh = ms;
        }
        Ok(())
    }

    /// Checks endpoint schemes and that every interval is non-zero.
    pub fn validate(&self) -> Result<()> {
        let upload = Url::parse(&self.upload_url)
            .map_err(|e| anyhow!("invalid upload url '{}': {}", self.upload_url, e))?;
        if !matches!(upload.scheme(), "http" | "https") {
            return Err(anyhow!("upload url must use http or https"));
        }
        let stream = Url::parse(&self.stream_url)
            .map_err(|e| anyhow!("invalid stream url '{}': {}", self.stream_url, e))?;
        if stream.scheme() != "ws" {
            return Err(anyhow!("stream url must use ws"));
        }
        if self.channel.poll_interval.is_zero() {
            return Err(anyhow!("channel poll interval must be greater than zero"));
        }
        if self.channel.connect_timeout.is_zero() {
            return Err(anyhow!("channel connect timeout must be greater than zero"));
        }
        if self.refresh.is_zero() {
            return Err(anyhow!("dashboard refresh must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be an integer number of milliseconds", key))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        _ => Ok(None),
    }
}
