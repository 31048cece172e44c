use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub brands: BrandsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuildConfig {
    /// Node budget for one hydration shard.
    #[serde(default = "default_max_in_memory_nodes")]
    pub max_in_memory_nodes: usize,
    /// Messages per scratch-store insert during ingest.
    #[serde(default = "default_write_batch")]
    pub write_batch: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_in_memory_nodes: default_max_in_memory_nodes(),
            write_batch: default_write_batch(),
        }
    }
}

fn default_max_in_memory_nodes() -> usize {
    10_000
}
fn default_write_batch() -> usize {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecoveryConfig {
    #[serde(default = "default_max_conversations_in_memory")]
    pub max_conversations_in_memory: usize,
    #[serde(default = "default_ids_per_call")]
    pub ids_per_call: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_conversations_in_memory: default_max_conversations_in_memory(),
            ids_per_call: default_ids_per_call(),
        }
    }
}

fn default_max_conversations_in_memory() -> usize {
    10_000
}
fn default_ids_per_call() -> usize {
    100
}

/// Hard ceiling of the batch lookup endpoint.
pub const MAX_IDS_PER_CALL: usize = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct LookupConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_bearer_token_env")]
    pub bearer_token_env: String,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: usize,
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            bearer_token_env: default_bearer_token_env(),
            window_secs: default_window_secs(),
            max_requests_per_window: default_max_requests_per_window(),
            safety_margin_secs: default_safety_margin_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.twitter.com/1.1/statuses/lookup.json".to_string()
}
fn default_bearer_token_env() -> String {
    "TWITTER_BEARER_TOKEN".to_string()
}
fn default_window_secs() -> u64 {
    900
}
fn default_max_requests_per_window() -> usize {
    180
}
fn default_safety_margin_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BrandsConfig {
    /// Default brand roster when `--brands` is not given.
    pub path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.build.max_in_memory_nodes == 0 {
        anyhow::bail!("build.max_in_memory_nodes must be > 0");
    }
    if config.build.write_batch == 0 {
        anyhow::bail!("build.write_batch must be > 0");
    }

    if config.recovery.max_conversations_in_memory == 0 {
        anyhow::bail!("recovery.max_conversations_in_memory must be > 0");
    }
    if !(1..=MAX_IDS_PER_CALL).contains(&config.recovery.ids_per_call) {
        anyhow::bail!(
            "recovery.ids_per_call must be in [1, {}]",
            MAX_IDS_PER_CALL
        );
    }

    if config.lookup.max_requests_per_window == 0 {
        anyhow::bail!("lookup.max_requests_per_window must be > 0");
    }
    if config.lookup.window_secs == 0 {
        anyhow::bail!("lookup.window_secs must be > 0");
    }
    if config.lookup.endpoint.trim().is_empty() {
        anyhow::bail!("lookup.endpoint must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn only_db_is_required() {
        let config = parse("[db]\npath = \"./data/convtree.sqlite\"\n").unwrap();
        assert_eq!(config.build.max_in_memory_nodes, 10_000);
        assert_eq!(config.build.write_batch, 1_000);
        assert_eq!(config.recovery.ids_per_call, 100);
        assert_eq!(config.lookup.window_secs, 900);
        assert_eq!(config.lookup.max_requests_per_window, 180);
        assert_eq!(config.lookup.bearer_token_env, "TWITTER_BEARER_TOKEN");
        assert!(config.brands.path.is_none());

        assert!(parse("[build]\nwrite_batch = 5\n").is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        assert!(parse(&format!("{}[build]\nmax_in_memory_nodes = 0\n", base)).is_err());
        assert!(parse(&format!("{}[recovery]\nids_per_call = 101\n", base)).is_err());
        assert!(parse(&format!("{}[recovery]\nids_per_call = 0\n", base)).is_err());
        assert!(parse(&format!("{}[lookup]\nmax_requests_per_window = 0\n", base)).is_err());
        assert!(parse(&format!("{}[recovery]\nids_per_call = 100\n", base)).is_ok());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/convtree.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
