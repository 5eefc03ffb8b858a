use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::key::SharedKeyHasher;

#[derive(Debug, Deserialize, Default)]
pub struct Bootstrap {
    #[serde(default)]
    pub logger: Logger,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub paths: Vec<PathConfig>,
}

impl Bootstrap {
    pub fn validate(&self) -> Result<()> {
        for pc in &self.paths {
            pc.validate()?;
        }
        self.backend.validate()
    }
}

// Loads the bootstrap config, returning any unrecognized keys alongside it so
// the caller can warn about typos without failing startup.
pub fn load(path: &Path) -> Result<(Bootstrap, Vec<String>)> {
    let raw = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let mut ignored = Vec::new();
    let de = serde_yaml::Deserializer::from_str(&raw);
    let cfg: Bootstrap = serde_ignored::deserialize(de, |path| {
        ignored.push(path.to_string());
    })
    .with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;

    Ok((cfg, ignored))
}

#[derive(Debug, Deserialize, Default)]
pub struct Logger {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub max_size: u64,
    #[serde(default)]
    pub max_backups: u64,
}

// Per-route view consumed by key derivation: which parts of a request are
// semantically relevant under this path.
#[derive(Clone, Default, Deserialize)]
pub struct PathConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub cache_key_params: Vec<String>,
    #[serde(default)]
    pub cache_key_headers: Vec<String>,
    #[serde(default)]
    pub cache_key_form_fields: Vec<String>,
    #[serde(default)]
    pub cache_key_json_paths: Vec<String>,
    #[serde(skip)]
    pub key_hasher: Vec<SharedKeyHasher>,
}

impl PathConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(anyhow!("path is required"));
        }
        if self.cache_key_params.iter().any(|p| p == "*") && self.cache_key_params.len() > 1 {
            return Err(anyhow!(
                "path {}: wildcard cache_key_params cannot be combined with named params",
                self.path
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PathConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathConfig")
            .field("path", &self.path)
            .field("cache_key_params", &self.cache_key_params)
            .field("cache_key_headers", &self.cache_key_headers)
            .field("cache_key_form_fields", &self.cache_key_form_fields)
            .field("cache_key_json_paths", &self.cache_key_json_paths)
            .field("key_hasher", &self.key_hasher.len())
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_compressible_types")]
    pub compressible_types: Vec<String>,
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub default_ttl: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            compressible_types: default_compressible_types(),
            default_ttl: default_ttl(),
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        for t in &self.compressible_types {
            t.parse::<mime::Mime>()
                .map_err(|_| anyhow!("invalid compressible media type: {t}"))?;
        }
        Ok(())
    }

    // Compression eligibility is keyed on the parsed media type, so the set
    // holds lowercased essences.
    pub fn compressible_set(&self) -> HashSet<String> {
        self.compressible_types.iter().map(|t| t.to_ascii_lowercase()).collect()
    }
}

fn default_compressible_types() -> Vec<String> {
    [
        "text/html",
        "text/javascript",
        "text/css",
        "text/plain",
        "text/xml",
        "text/json",
        "application/json",
        "application/javascript",
        "application/xml",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_ttl() -> Duration {
    Duration::from_secs(4 * 60 * 60)
}
