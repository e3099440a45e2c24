use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::processor::CleaningSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub cleaning: CleaningSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub basket: BasketConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub transactions: SourceSpec,
    pub item_reference: SourceSpec,
    pub combo_reference: SourceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Csv,
    Json,
    HttpCsv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub kind: SourceKind,
    /// File path, or URL for `http_csv`.
    pub location: String,
}

impl SourceSpec {
    pub fn identity(&self) -> String {
        let kind = match self.kind {
            SourceKind::Csv => "csv",
            SourceKind::Json => "json",
            SourceKind::HttpCsv => "http_csv",
        };
        format!("{}:{}", kind, self.location)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon_days: usize,
    pub trailing_weeks: usize,
    /// Percent applied to day-of-week unit averages, e.g. 20 or -15.
    pub growth_pct: i32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            horizon_days: 30,
            trailing_weeks: 8,
            growth_pct: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasketConfig {
    pub min_support: f64,
    pub min_lift: f64,
}

impl Default for BasketConfig {
    fn default() -> Self {
        BasketConfig {
            min_support: 0.01,
            min_lift: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig { top_n: 10 }
    }
}

pub const CONFIG_ENV: &str = "SALES_PIPELINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "configs/pipeline.toml";

fn default_timeout_secs() -> u64 {
    30
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))
    }

    /// Explicit path first, then `SALES_PIPELINE_CONFIG`, then the default.
    pub fn resolve_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Cache key covering all three tables.
    pub fn source_identity(&self) -> String {
        format!(
            "{}|{}|{}",
            self.sources.transactions.identity(),
            self.sources.item_reference.identity(),
            self.sources.combo_reference.identity()
        )
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.sources.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}
