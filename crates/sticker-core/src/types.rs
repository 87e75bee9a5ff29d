use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Registry key shared by every view of the same sticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenderId(String);

impl RenderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RenderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RenderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle of one view bound to an animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub u64);

impl ViewId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Connector-local id of one outgoing request.
pub type MessageId = u64;

/// Connector-local id of one registered callback sink.
pub type CallbackId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }

    /// Direction of travel from `from` to `to`. Equal endpoints count as backward.
    pub fn between(from: u32, to: u32) -> Self {
        if from < to {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}

/// Fractional position of a view inside a shared canvas (0.0..=1.0 on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coords {
    pub x: f32,
    pub y: f32,
}

impl Coords {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Absolute pixel offset of a view's region in a shared canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelOffset {
    pub x: i32,
    pub y: i32,
}

/// Tint colour forwarded to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);
