//! Runtime settings.
//!
//! Tuning lives in `config.toml`; every key is optional and a missing file
//! means defaults everywhere:
//!
//! ```toml
//! [lookingglass]
//! timeout_secs = 600
//! routes_timeout_secs = 60
//! neighbour_pacing_ms = 1000
//! branch_cooldown_secs = 60
//!
//! [enrichment]
//! pacing_ms = 500
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 1000
//!
//! [report]
//! directory = "reports"
//! share = true
//!
//! [metrics]
//! enabled = true
//! bind = "0.0.0.0:9184"
//! ```
//!
//! The IXPs for `--all` come from a separate YAML list:
//!
//! ```yaml
//! ixps:
//!   - https://lg.ams-ix.net
//!   - https://lg.de-cix.net
//! ```

use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::{
    enrich::EnrichmentSettings, lookingglass::LookingGlassSettings, net::RetryPolicy,
    pipeline::PipelineSettings,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lookingglass: LookingGlassConfig,
    pub enrichment: EnrichmentConfig,
    pub retry: RetryConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookingGlassConfig {
    pub timeout_secs: u64,
    pub routes_timeout_secs: u64,
    pub neighbour_pacing_ms: u64,
    /// How long a route server branch idles after finishing.
    pub branch_cooldown_secs: u64,
}

impl Default for LookingGlassConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            routes_timeout_secs: 60,
            neighbour_pacing_ms: 1000,
            branch_cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub asrank_url: String,
    pub ripe_url: String,
    pub timeout_secs: u64,
    /// Gap between dispatching two lookups.
    pub pacing_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        let defaults = EnrichmentSettings::default();
        Self {
            asrank_url: defaults.asrank_url,
            ripe_url: defaults.ripe_url,
            timeout_secs: defaults.timeout.as_secs(),
            pacing_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_secs: 60,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub directory: String,
    /// Publish each report on glot.io and print the link.
    pub share: bool,
    pub share_url: String,
    pub timeout_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            directory: "reports".to_string(),
            share: true,
            share_url: "https://glot.io/api/snippets".to_string(),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "0.0.0.0:9184".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn lookingglass_settings(&self) -> LookingGlassSettings {
        let lg = &self.lookingglass;
        LookingGlassSettings {
            timeout: Duration::from_secs(lg.timeout_secs),
            routes_timeout: Duration::from_secs(lg.routes_timeout_secs),
            neighbour_pacing: Duration::from_millis(lg.neighbour_pacing_ms),
        }
    }

    pub fn enrichment_settings(&self) -> EnrichmentSettings {
        EnrichmentSettings {
            asrank_url: self.enrichment.asrank_url.clone(),
            ripe_url: self.enrichment.ripe_url.clone(),
            timeout: Duration::from_secs(self.enrichment.timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            jitter: self.retry.jitter,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            branch_cooldown: Duration::from_secs(self.lookingglass.branch_cooldown_secs),
            enrichment_pacing: Duration::from_millis(self.enrichment.pacing_ms),
        }
    }
}

/// The IXP base URLs to walk in `--all` mode.
#[derive(Debug, Clone, Deserialize)]
pub struct IxpList {
    pub ixps: Vec<String>,
}

impl IxpList {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }
}
