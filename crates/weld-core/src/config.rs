//! Per-concern configuration structs aggregated into [`WeldConfig`].
//!
//! Every struct has serde derives and a `Default` carrying the engine's
//! shipped defaults, so an embedding tool can deserialize a partial TOML
//! table and fall back field-by-field.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Sliding-window region extraction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Smallest window (in statements) worth comparing.
    pub min_statements: usize,
    /// Largest window; longer declaration bodies are still covered by
    /// their sub-windows.
    pub max_statements: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            min_statements: 3,
            max_statements: 40,
        }
    }
}

/// Pre-filter chain parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Reject a pair when the larger statement count exceeds the smaller
    /// by more than this ratio.
    pub max_size_ratio: f64,
    /// Floor on the Jaccard overlap of statement-kind multisets.
    pub min_structural_overlap: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_size_ratio: 1.5,
            min_structural_overlap: 0.5,
        }
    }
}

/// MinHash/LSH candidate index parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LshConfig {
    /// Force the index on/off regardless of corpus size.
    pub enabled: Option<bool>,
    /// Corpus size (region count) above which the index switches on.
    pub auto_threshold: usize,
    /// Number of independent hash functions (signature length).
    pub num_hashes: usize,
    /// Number of bands the signature is partitioned into. Must divide
    /// `num_hashes`; rows per band is `num_hashes / num_bands`.
    pub num_bands: usize,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            auto_threshold: 200,
            num_hashes: 128,
            num_bands: 32,
        }
    }
}

impl LshConfig {
    /// Rows per band.
    pub fn rows_per_band(&self) -> usize {
        if self.num_bands == 0 {
            0
        } else {
            self.num_hashes / self.num_bands
        }
    }

    /// Whether the index should be used for a corpus of `region_count` regions.
    pub fn effective_enabled(&self, region_count: usize) -> bool {
        self.enabled.unwrap_or(region_count > self.auto_threshold)
    }
}

/// Similarity calculator weights and thresholds.
///
/// Weights are caller-supplied and are not required to re-sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Weight of the longest-common-subsequence ratio.
    pub weight_subsequence: f64,
    /// Weight of (1 - normalized edit distance).
    pub weight_edit: f64,
    /// Weight of the structural Jaccard overlap.
    pub weight_structural: f64,
    /// Combined-score floor for a pair to qualify as a duplicate.
    pub duplicate_threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            weight_subsequence: 0.4,
            weight_edit: 0.3,
            weight_structural: 0.3,
            duplicate_threshold: 0.75,
        }
    }
}

/// Orchestrator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorConfig {
    /// Soft cap on extracted-helper parameter count. Exceeding it records a
    /// warning on the session; it does not reject the cluster.
    pub parameter_soft_cap: usize,
    /// Confidence floor for automatic application in batch mode.
    pub batch_confidence_floor: f64,
    /// Default verification depth after each apply.
    pub verify_level: VerifyLevel,
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            parameter_soft_cap: 4,
            batch_confidence_floor: 0.90,
            verify_level: VerifyLevel::None,
        }
    }
}

/// Depth of post-apply checking before a cluster is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyLevel {
    /// Trust the apply; commit immediately.
    None,
    /// Recompile only the touched files.
    FastCompile,
    /// Full build-tool compile.
    FullCompile,
    /// Full test run.
    FullTest,
}

impl VerifyLevel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FastCompile => "fast-compile",
            Self::FullCompile => "full-compile",
            Self::FullTest => "full-test",
        }
    }
}

impl fmt::Display for VerifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregated engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeldConfig {
    pub region: RegionConfig,
    pub filter: FilterConfig,
    pub lsh: LshConfig,
    pub similarity: SimilarityConfig,
    pub refactor: RefactorConfig,
}

impl WeldConfig {
    /// Parse a (possibly partial) TOML document; absent fields keep defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file on disk.
    pub fn from_toml_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.min_statements == 0 {
            return Err(ConfigError::Invalid {
                field: "region.min_statements".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.lsh.num_bands == 0 || self.lsh.num_hashes % self.lsh.num_bands != 0 {
            return Err(ConfigError::Invalid {
                field: "lsh.num_bands".to_string(),
                message: format!(
                    "must be nonzero and divide num_hashes ({})",
                    self.lsh.num_hashes
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity.duplicate_threshold) {
            return Err(ConfigError::Invalid {
                field: "similarity.duplicate_threshold".to_string(),
                message: "must be in [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}
