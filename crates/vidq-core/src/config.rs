use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::downloader::FetchSettings;
use crate::http::HttpSettings;
use crate::resolver::ExtractorSettings;
use crate::storage::{HttpObjectStore, LocalObjectStore, ObjectStore};

/// User agent sent when the config does not name one.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Where uploaded objects go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Bucket directory on the local filesystem.
    #[default]
    Local,
    /// Bearer-authenticated HTTP object API.
    Http,
}

/// `[storage]` section of config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub bucket: String,
    /// Local provider: directory holding the buckets (default: XDG data dir).
    pub root: Option<PathBuf>,
    /// Http provider: base URL of the object API.
    pub endpoint: Option<String>,
    /// Http provider: name of the environment variable holding the bearer token.
    pub token_env: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: "videos".to_string(),
            root: None,
            endpoint: None,
            token_env: None,
        }
    }
}

/// Global configuration loaded from `~/.config/vidq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VidqConfig {
    /// Worker identity recorded on claimed jobs; default `worker-<hostname>`.
    /// Keep it stable across restarts so recovery finds the previous run's jobs.
    pub worker_id: Option<String>,
    /// Sleep between claim attempts when there is nothing to do.
    pub poll_interval_ms: u64,
    /// Maximum jobs executing at once in this worker.
    pub max_concurrent: usize,
    /// How long in-flight jobs get to observe a stop before they are aborted.
    pub stop_grace_ms: u64,
    /// Total time budget for resolving one media URL.
    pub extraction_timeout_secs: u64,
    /// Whole-transfer timeout for one media download.
    pub transfer_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Downloads smaller than this many bytes are rejected.
    pub min_file_size: u64,
    /// Directory for in-progress downloads (default `<tmp>/vidq-downloads`).
    pub temp_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    /// Directory of `<external_id>.har` captures used by the extractor.
    pub har_capture_dir: Option<PathBuf>,
    /// Replay captured `Cookie` headers from HAR files.
    pub har_include_cookies: bool,
    /// Queue database (default `~/.local/state/vidq/queue.db`).
    pub database_path: Option<PathBuf>,
    pub storage: StorageConfig,
}

impl Default for VidqConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            poll_interval_ms: 10_000,
            max_concurrent: 2,
            stop_grace_ms: 2_000,
            extraction_timeout_secs: 45,
            transfer_timeout_secs: 120,
            connect_timeout_secs: 30,
            min_file_size: 1000,
            temp_dir: None,
            user_agent: None,
            referer: None,
            har_capture_dir: None,
            har_include_cookies: false,
            database_path: None,
            storage: StorageConfig::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vidq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists,
/// then apply `VIDQ_*` environment overrides and validate.
pub fn load_or_init() -> Result<VidqConfig> {
    let path = config_path()?;
    let mut cfg = if !path.exists() {
        let default_cfg = VidqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        default_cfg
    } else {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?
    };

    cfg.apply_env_from(|name| std::env::var(name).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {name}={value:?}: {e}"))
}

impl VidqConfig {
    /// Apply environment overrides. `lookup` returns the variable's value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIDQ_WORKER_ID") {
            self.worker_id = Some(v.trim().to_string());
        }
        if let Some(v) = lookup("VIDQ_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_env("VIDQ_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("VIDQ_MAX_CONCURRENT") {
            self.max_concurrent = parse_env("VIDQ_MAX_CONCURRENT", &v)?;
        }
        if let Some(v) = lookup("VIDQ_EXTRACTION_TIMEOUT_SECS") {
            self.extraction_timeout_secs = parse_env("VIDQ_EXTRACTION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("VIDQ_TRANSFER_TIMEOUT_SECS") {
            self.transfer_timeout_secs = parse_env("VIDQ_TRANSFER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("VIDQ_MIN_FILE_SIZE") {
            self.min_file_size = parse_env("VIDQ_MIN_FILE_SIZE", &v)?;
        }
        if let Some(v) = lookup("VIDQ_BUCKET") {
            self.storage.bucket = v.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be at least 1");
        }
        if matches!(self.worker_id.as_deref(), Some(id) if id.trim().is_empty()) {
            bail!("worker_id must not be empty");
        }
        if self.storage.bucket.trim().is_empty() {
            bail!("storage.bucket must not be empty");
        }
        if self.storage.provider == StorageProvider::Http && self.storage.endpoint.is_none() {
            bail!("storage.endpoint is required for the http provider");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Configured worker id, or `worker-<hostname>`.
    pub fn effective_worker_id(&self) -> String {
        match self.worker_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("worker-{}", hostname().unwrap_or_else(|| "local".to_string())),
        }
    }

    pub fn effective_temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("vidq-downloads"))
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            referer: self.referer.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            http: self.http_settings(),
            budget: self.extraction_timeout(),
            har_capture_dir: self.har_capture_dir.clone(),
            har_include_cookies: self.har_include_cookies,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            http: self.http_settings(),
            transfer_timeout: self.transfer_timeout(),
            min_file_size: self.min_file_size,
        }
    }

    /// Construct the configured object store.
    pub fn build_store(&self) -> Result<Arc<dyn ObjectStore>> {
        let s = &self.storage;
        match s.provider {
            StorageProvider::Local => {
                let root = match &s.root {
                    Some(root) => root.clone(),
                    None => {
                        let xdg_dirs = xdg::BaseDirectories::with_prefix("vidq")?;
                        xdg_dirs.get_data_home().join("vidq").join("objects")
                    }
                };
                Ok(Arc::new(LocalObjectStore::new(root, s.bucket.clone())))
            }
            StorageProvider::Http => {
                let endpoint = s
                    .endpoint
                    .as_deref()
                    .context("storage.endpoint is required for the http provider")?;
                url::Url::parse(endpoint)
                    .with_context(|| format!("invalid storage.endpoint {endpoint:?}"))?;
                let token = match s.token_env.as_deref() {
                    Some(var) => Some(
                        std::env::var(var)
                            .with_context(|| format!("storage token variable {var} is not set"))?,
                    ),
                    None => None,
                };
                Ok(Arc::new(HttpObjectStore::new(
                    endpoint,
                    s.bucket.clone(),
                    token,
                    self.http_settings(),
                    self.transfer_timeout(),
                )))
            }
        }
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let r = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if r != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let cfg = VidqConfig::default();
        assert_eq!(cfg.poll_interval_ms, 10_000);
        assert_eq!(cfg.max_concurrent, 2);
        assert_eq!(cfg.extraction_timeout_secs, 45);
        assert_eq!(cfg.transfer_timeout_secs, 120);
        assert_eq!(cfg.min_file_size, 1000);
        assert_eq!(cfg.storage.provider, StorageProvider::Local);
        assert_eq!(cfg.storage.bucket, "videos");
        assert!(!cfg.har_include_cookies);
        cfg.validate().unwrap();
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = VidqConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: VidqConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.poll_interval_ms, cfg.poll_interval_ms);
        assert_eq!(parsed.max_concurrent, cfg.max_concurrent);
        assert_eq!(parsed.storage.bucket, cfg.storage.bucket);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = r#"
            worker_id = "worker-a"
            max_concurrent = 4

            [storage]
            provider = "http"
            endpoint = "https://storage.example.com/v1"
            token_env = "VIDQ_STORAGE_TOKEN"
        "#;
        let cfg: VidqConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.effective_worker_id(), "worker-a");
        assert_eq!(cfg.max_concurrent, 4);
        assert_eq!(cfg.poll_interval_ms, 10_000);
        assert_eq!(cfg.storage.provider, StorageProvider::Http);
        assert_eq!(cfg.storage.bucket, "videos");
        cfg.validate().unwrap();
    }

    #[test]
    fn env_overrides_apply_after_file() {
        let env: HashMap<&str, &str> = [
            ("VIDQ_WORKER_ID", "worker-env"),
            ("VIDQ_MAX_CONCURRENT", "5"),
            ("VIDQ_POLL_INTERVAL_MS", "250"),
            ("VIDQ_BUCKET", "clips"),
            ("VIDQ_MIN_FILE_SIZE", "42"),
        ]
        .into_iter()
        .collect();
        let mut cfg = VidqConfig::default();
        cfg.apply_env_from(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.effective_worker_id(), "worker-env");
        assert_eq!(cfg.max_concurrent, 5);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.storage.bucket, "clips");
        assert_eq!(cfg.fetch_settings().min_file_size, 42);
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut cfg = VidqConfig::default();
        let err = cfg
            .apply_env_from(|k| (k == "VIDQ_MAX_CONCURRENT").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("VIDQ_MAX_CONCURRENT"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = VidqConfig {
            max_concurrent: 0,
            ..VidqConfig::default()
        };
        assert!(cfg.validate().is_err());
        cfg.max_concurrent = 1;
        cfg.worker_id = Some("  ".into());
        assert!(cfg.validate().is_err());
        cfg.worker_id = None;
        cfg.storage.provider = StorageProvider::Http;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_worker_id_uses_hostname() {
        let id = VidqConfig::default().effective_worker_id();
        assert!(id.starts_with("worker-"));
        assert!(id.len() > "worker-".len());
    }

    #[test]
    fn local_store_uses_configured_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = VidqConfig::default();
        cfg.storage.root = Some(dir.path().to_path_buf());
        let store = cfg.build_store().unwrap();
        assert_eq!(store.provider(), "local");
        assert_eq!(store.bucket(), "videos");
    }
}
