//! Layered configuration for sketch.
//!
//! Values are merged from (later layers win):
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional file, format chosen by extension (`.toml`, `.yaml`/`.yml`,
//!    `.json`)
//! 3. Environment variables prefixed with `SKETCH_`, with `__` separating
//!    nested keys: `SKETCH_MEMORY_CACHE__MAX_SIZE=134217728`
//!
//! Disk cache directories default to subdirectories of the platform's cache
//! directory.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SKETCH_";
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub memory_cache: MemoryCacheConfig,
    pub download_cache: DiskCacheConfig,
    pub result_cache: DiskCacheConfig,
    pub dispatch: DispatchConfig,
    pub request: RequestConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Budget in bytes.
    pub max_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    pub enabled: bool,
    /// Defaults to a subdirectory of the platform cache directory.
    pub directory: Option<PathBuf>,
    /// Budget in bytes.
    pub max_size: u64,
    /// Bump to discard everything previously cached in this namespace.
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Concurrent fetches.
    pub network_parallelism: usize,
    /// Concurrent decodes and transformations.
    pub decode_parallelism: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Applied to requests that don't set their own timeout.
    pub timeout_ms: Option<u64>,
    /// Cancel an execution once every caller waiting on it has gone away.
    pub cancel_when_detached: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_cache: MemoryCacheConfig { max_size: 64 * MIB },
            download_cache: DiskCacheConfig { enabled: true, directory: None, max_size: 300 * MIB, version: 1 },
            result_cache: DiskCacheConfig { enabled: true, directory: None, max_size: 200 * MIB, version: 1 },
            dispatch: DispatchConfig { network_parallelism: 10, decode_parallelism: 4 },
            request: RequestConfig { timeout_ms: None, cancel_when_detached: true },
        }
    }
}

impl Config {
    /// Build the layered [`Figment`] without extracting it, for callers that
    /// want to add their own providers on top.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            let extension = file.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate configuration from all layers.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Config = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?file, "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_cache.max_size == 0 {
            exn::bail!(ErrorKind::Invalid("memory_cache.max_size must be greater than zero".to_string()));
        }
        for (name, cache) in [("download_cache", &self.download_cache), ("result_cache", &self.result_cache)] {
            if cache.enabled && cache.max_size == 0 {
                exn::bail!(ErrorKind::Invalid(format!("{name}.max_size must be greater than zero")));
            }
        }
        if self.dispatch.network_parallelism == 0 || self.dispatch.decode_parallelism == 0 {
            exn::bail!(ErrorKind::Invalid("dispatch parallelism must be greater than zero".to_string()));
        }
        if self.request.timeout_ms == Some(0) {
            exn::bail!(ErrorKind::Invalid("request.timeout_ms must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request.timeout_ms.map(Duration::from_millis)
    }

    /// Directory for raw downloaded bytes.
    pub fn download_cache_dir(&self) -> Result<PathBuf> {
        Self::cache_dir(&self.download_cache, "download")
    }

    /// Directory for decoded and transformed results.
    pub fn result_cache_dir(&self) -> Result<PathBuf> {
        Self::cache_dir(&self.result_cache, "result")
    }

    fn cache_dir(cache: &DiskCacheConfig, namespace: &str) -> Result<PathBuf> {
        if let Some(directory) = &cache.directory {
            return Ok(directory.clone());
        }
        let dirs = ProjectDirs::from("", "", "sketch").ok_or_raise(|| ErrorKind::NoCacheDirectory)?;
        Ok(dirs.cache_dir().join(namespace))
    }
}
