use serde::{Deserialize, Serialize};

/// Frame rate assumed when a document omits `fr` or carries a non-positive one.
pub const DEFAULT_FRAME_RATE: f32 = 60.0;

/// Top-level Lottie document, reduced to what sticker playback needs.
///
/// Shape trees stay as raw JSON inside each [`Layer`]; decoding them is the
/// rasterizer's business.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LottieJson {
    #[serde(default)]
    pub v: Option<String>,
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub ip: f32,
    #[serde(default)]
    pub op: f32,
    #[serde(default = "default_frame_rate")]
    pub fr: f32,
    #[serde(default)]
    pub w: u32,
    #[serde(default)]
    pub h: u32,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

fn default_frame_rate() -> f32 {
    DEFAULT_FRAME_RATE
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Layer {
    #[serde(default)]
    pub ty: u8,
    #[serde(default)]
    pub ind: Option<u32>,
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub ip: f32,
    #[serde(default)]
    pub op: f32,
    #[serde(default)]
    pub st: f32,
    #[serde(default, rename = "refId")]
    pub ref_id: Option<String>,
    /// Everything else (transform, shapes, masks, effects) untouched.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub w: Option<u32>,
    #[serde(default)]
    pub h: Option<u32>,
    #[serde(default)]
    pub u: Option<String>,
    #[serde(default)]
    pub p: Option<String>,
    /// Present for precompositions.
    #[serde(default)]
    pub layers: Option<Vec<Layer>>,
}

/// Named time range authored in the document (`markers` array).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Marker {
    /// Marker name.
    #[serde(default)]
    pub cm: String,
    /// Start frame.
    #[serde(default)]
    pub tm: f32,
    /// Duration in frames.
    #[serde(default)]
    pub dr: f32,
}

impl LottieJson {
    /// Frames per second, falling back to [`DEFAULT_FRAME_RATE`].
    pub fn frame_rate(&self) -> f32 {
        if self.fr.is_finite() && self.fr > 0.0 {
            self.fr
        } else {
            DEFAULT_FRAME_RATE
        }
    }

    /// Number of whole frames between the in-point and the out-point.
    pub fn total_frames(&self) -> u32 {
        let span = self.op - self.ip;
        if span.is_finite() && span > 0.0 {
            span.round() as u32
        } else {
            0
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.total_frames() as f32 / self.frame_rate()
    }

    /// Frame range `[start, end]` of the marker called `name`, relative to the in-point.
    pub fn marker_segment(&self, name: &str) -> Option<(u32, u32)> {
        let marker = self.markers.iter().find(|m| m.cm == name)?;
        let start = (marker.tm - self.ip).max(0.0).round() as u32;
        let end = (marker.tm + marker.dr - self.ip).max(0.0).round() as u32;
        Some((start, end.min(self.total_frames().saturating_sub(1))))
    }
}
