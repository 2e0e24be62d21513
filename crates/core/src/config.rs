use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::nlm::patch::BorderPolicy;
use crate::resize::ResizeAlgorithm;

/// What happens to the frames still in the window when the source ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Stop as soon as the source is exhausted; trailing frames are lost.
    #[default]
    Drop,
    /// Refine the trailing frames with a temporal window clamped to the last
    /// ingested frame and emit all of them.
    Drain,
}

/// Immutable settings of a super-resolution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NlmConfig {
    /// Integer upscaling factor.
    pub scale: usize,
    /// Radius of the patch search area, in low-resolution pixels.
    pub search_area_radius: usize,
    /// Number of frames searched on each side of the refined frame.
    pub time_radius: usize,
    /// Side of the compared patches, in high-resolution pixels. Must be odd.
    pub patch_size: usize,
    /// Decay of the patch weight; smaller values are more selective.
    pub sigma: f64,
    pub border: BorderPolicy,
    pub upscale: ResizeAlgorithm,
    pub flush: FlushPolicy,
    /// Rows per parallel tile, `0` picks one from the rayon pool size.
    pub tile_rows: usize,
}

impl Default for NlmConfig {
    fn default() -> Self {
        Self {
            scale: 2,
            search_area_radius: 10,
            time_radius: 2,
            patch_size: 13,
            sigma: 7.5,
            border: BorderPolicy::default(),
            upscale: ResizeAlgorithm::default(),
            flush: FlushPolicy::default(),
            tile_rows: 0,
        }
    }
}

impl NlmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scale == 0 {
            bail!("scale must be positive, got {}", self.scale);
        }
        if self.search_area_radius == 0 {
            bail!(
                "search_area_radius must be positive, got {}",
                self.search_area_radius
            );
        }
        if self.time_radius == 0 {
            bail!("time_radius must be positive, got {}", self.time_radius);
        }
        if self.patch_size == 0 || self.patch_size % 2 == 0 {
            bail!("patch_size must be a positive odd number, got {}", self.patch_size);
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            bail!("sigma must be a positive finite number, got {}", self.sigma);
        }
        Ok(())
    }

    /// Slots per resolution in the frame ring buffer.
    pub fn ring_capacity(&self) -> usize {
        3 * self.time_radius + 2
    }

    /// Frames pulled before the first steady step.
    pub fn priming_len(&self) -> usize {
        3 * self.time_radius + 1
    }

    pub fn low_res_border(&self) -> usize {
        self.search_area_radius + 1
    }

    pub fn high_res_border(&self) -> usize {
        self.scale * (self.search_area_radius + 1) + self.patch_size / 2
    }

    /// `1 / (2 * sigma^2)`, the factor applied to patch distances.
    pub fn patch_diff_weight(&self) -> f64 {
        1.0 / (2.0 * self.sigma * self.sigma)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config TOML: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        let encoded = toml::to_string_pretty(self).context("failed to serialize config TOML")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = NlmConfig::default();

        assert_eq!(cfg.scale, 2);
        assert_eq!(cfg.search_area_radius, 10);
        assert_eq!(cfg.time_radius, 2);
        assert_eq!(cfg.patch_size, 13);
        assert_eq!(cfg.sigma, 7.5);
        assert_eq!(cfg.border, BorderPolicy::Constant);
        assert_eq!(cfg.upscale, ResizeAlgorithm::Bicubic);
        assert_eq!(cfg.flush, FlushPolicy::Drop);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn derived_sizes_follow_radii() {
        let cfg = NlmConfig::default();
        assert_eq!(cfg.ring_capacity(), 8);
        assert_eq!(cfg.priming_len(), 7);
        assert_eq!(cfg.low_res_border(), 11);
        assert_eq!(cfg.high_res_border(), 2 * 11 + 6);
        assert!((cfg.patch_diff_weight() - 1.0 / 112.5).abs() < 1e-15);
    }

    #[test]
    fn high_res_border_covers_every_candidate_patch() {
        for scale in 1..=4 {
            for radius in 1..=6 {
                for patch_size in [1, 3, 5, 13, 21] {
                    let cfg = NlmConfig {
                        scale,
                        search_area_radius: radius,
                        patch_size,
                        ..Default::default()
                    };
                    let needed = scale * radius + patch_size / 2;
                    assert!(cfg.high_res_border() >= needed);
                }
            }
        }
    }

    #[test]
    fn validate_rejects_zero_scale() {
        let cfg = NlmConfig {
            scale: 0,
            ..Default::default()
        };
        let err = cfg.validate().err().expect("should fail");
        assert!(err.to_string().contains("scale must be positive"));
    }

    #[test]
    fn validate_rejects_zero_radii() {
        let search = NlmConfig {
            search_area_radius: 0,
            ..Default::default()
        };
        let time = NlmConfig {
            time_radius: 0,
            ..Default::default()
        };
        assert!(search.validate().is_err());
        assert!(time.validate().is_err());
    }

    #[test]
    fn validate_rejects_even_patch_size() {
        let cfg = NlmConfig {
            patch_size: 12,
            ..Default::default()
        };
        let err = cfg.validate().err().expect("should fail");
        assert!(err.to_string().contains("odd"));
    }

    #[test]
    fn validate_rejects_bad_sigma() {
        for sigma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = NlmConfig {
                sigma,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "sigma {sigma} should be rejected");
        }
    }

    #[test]
    fn toml_roundtrip_preserves_values() {
        let original = NlmConfig {
            scale: 3,
            time_radius: 1,
            border: BorderPolicy::Reflect,
            upscale: ResizeAlgorithm::Bilinear,
            flush: FlushPolicy::Drain,
            tile_rows: 16,
            ..Default::default()
        };
        let encoded = toml::to_string_pretty(&original).expect("serialize config");
        let decoded: NlmConfig = toml::from_str(&encoded).expect("deserialize config");
        assert_eq!(decoded, original);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let decoded: NlmConfig =
            toml::from_str("scale = 4\nflush = \"drain\"\n").expect("deserialize config");
        assert_eq!(decoded.scale, 4);
        assert_eq!(decoded.flush, FlushPolicy::Drain);
        assert_eq!(decoded.patch_size, 13);
    }

    #[test]
    fn load_from_nonexistent_file_returns_defaults() {
        let dir = tempdir().expect("create temp dir");
        let loaded =
            NlmConfig::load_from_path(&dir.path().join("missing.toml")).expect("load config");
        assert_eq!(loaded, NlmConfig::default());
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("nlm.toml");
        fs::write(&path, "patch_size = 4\n").expect("write config");

        let err = NlmConfig::load_from_path(&path).err().expect("should fail");
        assert!(format!("{err:#}").contains("odd"));
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("nlm.toml");
        let cfg = NlmConfig {
            sigma: 10.0,
            ..Default::default()
        };

        cfg.save_to_path(&path).expect("save config");
        let loaded = NlmConfig::load_from_path(&path).expect("load config");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn policies_serialize_as_snake_case() {
        let cfg = NlmConfig {
            flush: FlushPolicy::Drain,
            border: BorderPolicy::Reflect,
            ..Default::default()
        };

        let value = serde_json::to_value(&cfg).expect("serialize config");
        assert_eq!(value["flush"], "drain");
        assert_eq!(value["border"], "reflect");
        assert_eq!(value["upscale"], "bicubic");

        let parsed: NlmConfig =
            serde_json::from_str(r#"{"time_radius": 1, "flush": "drain"}"#).expect("parse");
        assert_eq!(parsed.time_radius, 1);
        assert_eq!(parsed.flush, FlushPolicy::Drain);
        assert_eq!(parsed.scale, 2);
    }
}
