//! # Sticker Engine
//!
//! Facade over the workspace crates: [`sticker_core`] for playback and
//! [`lottie_data`] for document parsing and `.tgs` payload decoding.
//!
//! Most hosts only need [`Engine`], [`AnimationRequest`] and a view container.

pub use lottie_data;
pub use sticker_core;

pub use sticker_core::{
    Animation, AnimationParams, AnimationRequest, Canvas, Container, Coords, DefaultSourceLoader, Direction, Engine,
    EngineConfig, FrameStats, MemorySourceLoader, Mount, PlaceholderFactory, PlaybackSnapshot, PlayerError,
    RasterizerFactory, RenderId, Rgb, SourceLoader, ViewId,
};

use std::sync::Arc;

/// Engine on the real filesystem with placeholder frames.
pub fn placeholder_engine(config: EngineConfig) -> Result<Engine, PlayerError> {
    Engine::new(config, Arc::new(DefaultSourceLoader), Arc::new(PlaceholderFactory))
}
