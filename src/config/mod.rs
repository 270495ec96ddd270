//! Configuration types for the cycler pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for reference capacity selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Nominal cell capacity in mAh, used when no cycle-summary table is available
    #[serde(default)]
    pub nominal_capacity: Option<f64>,

    /// Capacity used when neither a summary table nor a nominal capacity is known
    #[serde(default = "default_fallback_capacity")]
    pub fallback_capacity: f64,
}

fn default_fallback_capacity() -> f64 {
    1000.0
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            nominal_capacity: None,
            fallback_capacity: default_fallback_capacity(),
        }
    }
}

/// Configuration for batch processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Categorize cycles on the rayon thread pool
    #[serde(default)]
    pub parallel: bool,

    /// Attach the computed category to each cycle frame
    #[serde(default = "default_write_labels")]
    pub write_labels: bool,
}

fn default_write_labels() -> bool {
    true
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            write_labels: default_write_labels(),
        }
    }
}

/// Configuration for the categorization report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of cycle indices listed per category before truncating
    #[serde(default = "default_max_listed_indices")]
    pub max_listed_indices: usize,
}

fn default_max_listed_indices() -> usize {
    10
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_listed_indices: default_max_listed_indices(),
        }
    }
}

/// |C-rate| bounds separating the within-cycle phase levels.
///
/// A record at or below `low` is Low, at or below `mid` is Mid, at or below
/// `high` is High, and VHigh above that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    #[serde(default = "default_low_c_rate")]
    pub low: f64,

    #[serde(default = "default_mid_c_rate")]
    pub mid: f64,

    #[serde(default = "default_high_c_rate")]
    pub high: f64,
}

fn default_low_c_rate() -> f64 {
    0.5
}

fn default_mid_c_rate() -> f64 {
    1.0
}

fn default_high_c_rate() -> f64 {
    2.0
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            low: default_low_c_rate(),
            mid: default_mid_c_rate(),
            high: default_high_c_rate(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub capacity: CapacityConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub phases: PhaseConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
