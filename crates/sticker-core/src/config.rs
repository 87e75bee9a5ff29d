use crate::types::Coords;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine-wide settings. Every field has a default, so a partial JSON file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Physical pixels per logical pixel of the host display.
    pub device_pixel_ratio: f32,
    /// Upper bound on the worker pool size.
    pub max_workers: usize,
    /// Eviction period of normal-mode playback. `0` disables periodic eviction.
    pub cache_modulo: usize,
    /// Resolution scale of normal animations.
    pub quality: f32,
    /// Resolution scale of low-priority animations larger than `low_priority_size_threshold`.
    pub low_priority_quality: f32,
    pub low_priority_size_threshold: u32,
    /// Frames a worker renders ahead per `RenderFrames` request.
    pub prefetch_frames: usize,
    pub normal_fps: u32,
    pub low_priority_fps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            max_workers: 4,
            cache_modulo: 4,
            quality: 0.75,
            low_priority_quality: 0.5,
            low_priority_size_threshold: 24,
            prefetch_frames: 4,
            normal_fps: 60,
            low_priority_fps: 30,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid engine config")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// `min(available_parallelism, max_workers)`, at least one.
    pub fn worker_count(&self) -> usize {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(self.max_workers);
        parallelism.min(self.max_workers).max(1)
    }

    /// Scale from logical to physical pixels for one animation.
    pub fn size_factor(&self, params: &AnimationParams) -> f32 {
        let quality = params.quality.unwrap_or_else(|| {
            let small = params
                .size
                .is_some_and(|size| size <= self.low_priority_size_threshold);
            if params.is_low_priority && !small {
                self.low_priority_quality
            } else {
                self.quality
            }
        });
        (self.device_pixel_ratio * quality).max(1.0)
    }

    /// Playback rate the worker reduces documents to.
    pub fn target_fps(&self, is_low_priority: bool) -> u32 {
        if is_low_priority {
            self.low_priority_fps
        } else {
            self.normal_fps
        }
    }

    /// Periodic eviction is disabled for low-priority animations.
    pub fn cache_modulo_for(&self, is_low_priority: bool) -> usize {
        if is_low_priority {
            0
        } else {
            self.cache_modulo
        }
    }
}

/// Per-animation options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationParams {
    /// Logical edge length in pixels.
    pub size: Option<u32>,
    pub is_low_priority: bool,
    /// Overrides the derived resolution scale.
    pub quality: Option<f32>,
    /// Stop at the boundary instead of wrapping.
    pub no_loop: bool,
    /// Placement inside a shared canvas.
    pub coords: Option<Coords>,
}

impl AnimationParams {
    pub fn sized(size: u32) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn low_priority(mut self) -> Self {
        self.is_low_priority = true;
        self
    }

    pub fn no_loop(mut self) -> Self {
        self.no_loop = true;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn at(mut self, coords: Coords) -> Self {
        self.coords = Some(coords);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "device_pixel_ratio": 2.0, "max_workers": 2 }"#).unwrap();
        assert_eq!(config.device_pixel_ratio, 2.0);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.cache_modulo, 4);
        assert_eq!(config.prefetch_frames, 4);
        assert!(EngineConfig::from_json_str("[]").is_err());
    }

    #[test]
    fn config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "quality": 1.0 }"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.quality, 1.0);
        assert!(EngineConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn size_factor_by_priority_and_size() {
        let config = EngineConfig {
            device_pixel_ratio: 3.0,
            ..EngineConfig::default()
        };

        let normal = AnimationParams::sized(64);
        assert_eq!(config.size_factor(&normal), 2.25);

        let low_large = AnimationParams::sized(64).low_priority();
        assert_eq!(config.size_factor(&low_large), 1.5);

        // Small low-priority stickers keep full quality.
        let low_small = AnimationParams::sized(20).low_priority();
        assert_eq!(config.size_factor(&low_small), 2.25);

        let low_unsized = AnimationParams::default().low_priority();
        assert_eq!(config.size_factor(&low_unsized), 1.5);

        let overridden = AnimationParams::sized(64).low_priority().with_quality(1.0);
        assert_eq!(config.size_factor(&overridden), 3.0);
    }

    #[test]
    fn size_factor_never_below_one() {
        let config = EngineConfig::default();
        assert_eq!(config.size_factor(&AnimationParams::sized(64)), 1.0);
    }

    #[test]
    fn params_use_camel_case() {
        let params: AnimationParams = serde_json::from_str(
            r#"{ "size": 72, "isLowPriority": true, "noLoop": true, "coords": { "x": 0.5, "y": 0.25 } }"#,
        )
        .unwrap();
        assert_eq!(params.size, Some(72));
        assert!(params.is_low_priority);
        assert!(params.no_loop);
        assert_eq!(params.coords, Some(Coords::new(0.5, 0.25)));
    }

    #[test]
    fn worker_count_is_bounded() {
        let config = EngineConfig {
            max_workers: 1,
            ..EngineConfig::default()
        };
        assert_eq!(config.worker_count(), 1);
        let zero = EngineConfig {
            max_workers: 0,
            ..EngineConfig::default()
        };
        assert_eq!(zero.worker_count(), 1);
    }
}
