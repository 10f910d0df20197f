//! Tunable engine constants.
//!
//! The engine never reads a file itself; an embedder calls
//! [`EngineConfig::load_from`] (or just uses [`EngineConfig::default`]) once
//! and threads the result into the pieces that need it (the statistics
//! sampler, the palette optimizer, the auto-control algorithms).

use core_error::{PipelineError, Result};
use serde::Deserialize;
use std::path::Path;

/// Number of buckets in a luma histogram. Fixed by the data model; kept here
/// as a named constant so the rest of the engine never hardcodes `64`.
pub const HISTOGRAM_BUCKETS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default number of samples the statistics sampler draws when a caller
    /// leaves `Statistics::nvals` at zero.
    pub default_sample_count: u32,
    /// Auto-exposure adjustment rate (percent) applied right at the AE
    /// threshold crossing.
    pub ae_min_rate: u32,
    /// Auto-exposure adjustment rate (percent) applied at |error| = 128.
    pub ae_max_rate: u32,
    /// |luma mean - target| beyond which auto-exposure adjusts.
    pub ae_threshold: i32,
    /// Cumulative histogram count auto-black-level requires before it
    /// accepts a bucket as "the black floor".
    pub blc_cumulative_threshold: u32,
    /// Random draws `image_optimize_palette` takes per call when a caller
    /// does not specify `num_samples`. One call is a single K-means
    /// iteration; reaching convergence means calling it repeatedly.
    pub palette_default_num_samples: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_sample_count: 2048,
            ae_min_rate: 2,
            ae_max_rate: 25,
            ae_threshold: 8,
            blc_cumulative_threshold: 16,
            palette_default_num_samples: 256,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML file at `path`. A missing file falls back to defaults;
    /// a present-but-unparseable file is a configuration mistake and is
    /// reported rather than silently masked.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| PipelineError::invalid_argument(format!("{}: {e}", path.display()))),
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.ae_min_rate < cfg.ae_max_rate);
        assert!(cfg.default_sample_count > 0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EngineConfig::load_from("__does_not_exist__.toml").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn parses_partial_overrides() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "ae_max_rate = 40\n").unwrap();
        let cfg = EngineConfig::load_from(tmp.path()).unwrap();
        assert_eq!(cfg.ae_max_rate, 40);
        assert_eq!(cfg.ae_min_rate, EngineConfig::default().ae_min_rate);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not valid toml :::").unwrap();
        assert!(EngineConfig::load_from(tmp.path()).is_err());
    }
}
