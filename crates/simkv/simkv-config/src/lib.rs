//! Simulation configuration: the full set of knobs that specify one
//! `run_point` invocation, loaded from TOML or built up programmatically.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchPolicyKind {
    Erew,
    Crew,
    Crcw,
    DCrew,
    Ideal,
}

mod defaults {
    pub fn cores() -> usize {
        4
    }
    pub fn arrival_rate() -> f64 {
        1000.0
    }
    pub fn reqs_to_sim() -> u64 {
        100_000
    }
    pub fn hash_buckets() -> usize {
        1024
    }
    pub fn jbsq_depth() -> usize {
        2
    }
    pub fn serv_time() -> u64 {
        600
    }
    pub fn fixed_overhead() -> u64 {
        100
    }
    pub fn compaction_time() -> u64 {
        50
    }
    pub fn channel_lat() -> u64 {
        30
    }
    pub fn write_frac() -> u8 {
        10
    }
    pub fn zipf_coeff() -> f64 {
        0.99
    }
    pub fn num_items() -> u64 {
        1_000_000
    }
    pub fn turbo_boost() -> f64 {
        1.0
    }
    pub fn index_update_delay() -> u64 {
        50
    }
    pub fn batch_window_factor() -> u64 {
        10
    }
    pub fn instability_threshold() -> u64 {
        1_000_000
    }
    pub fn seed_load() -> u64 {
        0x5eed_1001
    }
    pub fn seed_service() -> u64 {
        0xcafe_babe
    }
    pub fn seed_zipf() -> u64 {
        0x1234_cafe
    }
}

/// Fully specifies one simulation point. Mirrors the option table an
/// engine entry point accepts: dispatch policy, core count, timing
/// parameters, key distribution, and feature toggles.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub dispatch_policy: DispatchPolicyKind,

    #[serde(default = "defaults::cores")]
    pub cores: usize,

    #[serde(default = "defaults::arrival_rate")]
    pub arrival_rate: f64,

    #[serde(default = "defaults::reqs_to_sim")]
    pub reqs_to_sim: u64,

    #[serde(default = "defaults::hash_buckets")]
    pub hash_buckets: usize,

    #[serde(default = "defaults::jbsq_depth")]
    pub jbsq_depth: usize,

    #[serde(default = "defaults::serv_time")]
    pub serv_time: u64,

    #[serde(default = "defaults::fixed_overhead")]
    pub fixed_overhead: u64,

    #[serde(default = "defaults::compaction_time")]
    pub compaction_time: u64,

    #[serde(default = "defaults::channel_lat")]
    pub channel_lat: u64,

    #[serde(default = "defaults::write_frac")]
    pub write_frac: u8,

    #[serde(default = "defaults::zipf_coeff")]
    pub zipf_coeff: f64,

    #[serde(default = "defaults::num_items")]
    pub num_items: u64,

    #[serde(default)]
    pub use_exp: bool,

    #[serde(default)]
    pub use_bimod: bool,

    #[serde(default)]
    pub use_compaction: bool,

    #[serde(default)]
    pub multiversion: bool,

    #[serde(default)]
    pub write_defer: bool,

    #[serde(default = "defaults::turbo_boost")]
    pub turbo_boost: f64,

    #[serde(default = "defaults::index_update_delay")]
    pub index_update_delay: u64,

    #[serde(default = "defaults::batch_window_factor")]
    pub batch_window_factor: u64,

    #[serde(default = "defaults::instability_threshold")]
    pub instability_threshold: u64,

    #[serde(default = "defaults::seed_load")]
    pub seed_load: u64,

    #[serde(default = "defaults::seed_service")]
    pub seed_service: u64,

    #[serde(default = "defaults::seed_zipf")]
    pub seed_zipf: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the engine assumes hold before a run starts.
    /// Violations here are `ConfigError`, not `InvariantFailure` — they are
    /// caught before the event loop exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cores == 0 {
            return Err(ConfigError::Invalid("cores must be >= 1".into()));
        }
        if self.jbsq_depth == 0 {
            return Err(ConfigError::Invalid("jbsq_depth must be >= 1".into()));
        }
        if self.write_frac > 100 {
            return Err(ConfigError::Invalid("write_frac must be 0..=100".into()));
        }
        if self.hash_buckets == 0 {
            return Err(ConfigError::Invalid("hash_buckets must be >= 1".into()));
        }
        if !self.hash_buckets.is_power_of_two() {
            tracing::warn!(
                hash_buckets = self.hash_buckets,
                "hash_buckets is not a power of two; bucket selection still works via modulo but loses the cheap mask path"
            );
        }
        if self.turbo_boost < 1.0 {
            return Err(ConfigError::Invalid("turbo_boost must be >= 1.0".into()));
        }
        if self.reqs_to_sim == 0 {
            return Err(ConfigError::Invalid("reqs_to_sim must be >= 1".into()));
        }
        if self.num_items == 0 {
            return Err(ConfigError::Invalid("num_items must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let cfg = Config::from_str("dispatch-policy = \"crew\"").unwrap();
        assert_eq!(cfg.cores, defaults::cores());
        assert_eq!(cfg.dispatch_policy, DispatchPolicyKind::Crew);
    }

    #[test]
    fn rejects_zero_jbsq_depth() {
        let err = Config::from_str("dispatch-policy = \"crew\"\njbsq-depth = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
