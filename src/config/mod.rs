//! Configuration types for the labeling pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for output locations and export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Subdirectory (under the input directory) for relabeled meshes
    #[serde(default = "default_processed_dir")]
    pub processed_dir: String,

    /// Subdirectory for skipped source files
    #[serde(default = "default_skipped_dir")]
    pub skipped_dir: String,

    /// File name of the label ledger CSV
    #[serde(default = "default_ledger_filename")]
    pub ledger_filename: String,

    /// Extension (without dot) of input and output mesh files
    #[serde(default = "default_mesh_extension")]
    pub mesh_extension: String,

    /// Write binary STL when true, ASCII when false
    #[serde(default = "default_binary_stl")]
    pub binary_stl: bool,
}

fn default_processed_dir() -> String {
    "processed".to_string()
}

fn default_skipped_dir() -> String {
    "skipped".to_string()
}

fn default_ledger_filename() -> String {
    "labels.csv".to_string()
}

fn default_mesh_extension() -> String {
    "stl".to_string()
}

fn default_binary_stl() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            processed_dir: default_processed_dir(),
            skipped_dir: default_skipped_dir(),
            ledger_filename: default_ledger_filename(),
            mesh_extension: default_mesh_extension(),
            binary_stl: default_binary_stl(),
        }
    }
}

/// Configuration for orientation editing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Minimum accepted angle in degrees
    #[serde(default = "default_min_deg")]
    pub min_deg: f64,

    /// Maximum accepted angle in degrees
    #[serde(default = "default_max_deg")]
    pub max_deg: f64,

    /// Increment used by the interactive nudge commands
    #[serde(default = "default_step_deg")]
    pub step_deg: f64,
}

fn default_min_deg() -> f64 {
    -180.0
}

fn default_max_deg() -> f64 {
    180.0
}

fn default_step_deg() -> f64 {
    5.0
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            min_deg: default_min_deg(),
            max_deg: default_max_deg(),
            step_deg: default_step_deg(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelerConfig {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub rotation: RotationConfig,
}

impl LabelerConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: LabelerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
