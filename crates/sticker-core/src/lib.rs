//! # Sticker Core
//!
//! `sticker-core` plays animated Lottie stickers for a messaging client.
//!
//! Decoding happens on a small pool of background worker threads. The main
//! thread keeps one shared [`Animation`] per render id, fans its frames out to
//! every view showing it, caches decoded frames, and advances playback from a
//! host-driven redraw callback.
//!
//! ## Core Features
//!
//! *   **Shared instances**: two views of the same render id share one decode context and one frame cache.
//! *   **Worker protocol**: request/response/callback multiplexing over a batched message channel.
//! *   **Real-time playback**: the cursor advances by elapsed wall time, not by callback count.
//! *   **Segments, loops, speed**: `play_segment`, no-loop mode, reversible direction.
//! *   **Memory modes**: periodic eviction during playback, cache release on pause.
//!
//! ## Usage
//!
//! The entry point is the [`Engine`], which owns the scheduler, the worker pool
//! and the registry. The host calls [`Engine::run_frame`] once per redraw.
//!
//! ```rust,no_run
//! use sticker_core::{
//!     AnimationParams, AnimationRequest, Container, DefaultSourceLoader, Engine, EngineConfig,
//!     Mount, PlaceholderFactory,
//! };
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! let engine = Engine::new(
//!     EngineConfig::default(),
//!     Arc::new(DefaultSourceLoader),
//!     Arc::new(PlaceholderFactory),
//! )
//! .unwrap();
//!
//! let mount = Mount::attached();
//! let sticker = engine
//!     .init(
//!         AnimationRequest::new("stickers/duck.tgs", Container::Mount(mount), "duck-1")
//!             .with_params(AnimationParams::sized(128).no_loop()),
//!     )
//!     .unwrap();
//! sticker.play(false, None).unwrap();
//!
//! loop {
//!     engine.run_frame(Instant::now()).unwrap();
//!     if sticker.snapshot().is_ended {
//!         break;
//!     }
//! }
//! ```

/// Identifiers and small value types.
pub mod types;

/// Engine and per-animation configuration.
pub mod config;

pub mod errors;

/// Host redraw callback and end-of-turn hooks.
pub mod scheduler;

/// Bidirectional message channel between the main thread and a worker.
pub mod port;

/// Typed messages of the `media` worker channel.
pub mod protocol;

/// Request/response/callback multiplexer over one port.
pub mod connector;

/// Opaque frame decode service run by workers.
pub mod rasterizer;

/// Worker-thread side of the `media` channel.
pub mod worker;

/// Fixed-size worker pool with round-robin assignment.
pub mod pool;

/// Sparse store of decoded frames.
pub mod cache;

/// Drawing surfaces and the views bound to an animation.
pub mod view;

/// Playback state machine of one shared animation.
pub mod instance;

/// Render id to shared animation map.
pub mod registry;

/// Coordinator owning scheduler, pool and registry.
pub mod engine;

pub use config::{AnimationParams, EngineConfig};
pub use engine::{Engine, FrameStats};
pub use errors::PlayerError;
pub use instance::{Animation, PlaybackSnapshot};
pub use rasterizer::{FrameRasterizer, PlaceholderFactory, PlaceholderRasterizer, RasterizerFactory};
pub use registry::{AnimationRegistry, AnimationRequest};
pub use types::{Coords, Direction, RenderId, Rgb, ViewId};
pub use view::{Canvas, Container, Mount};

use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::instrument;

/// A trait for resolving animation source locators to payload bytes.
///
/// Workers call it from their own threads, so implementations must be
/// `Send + Sync`. Hosts that fetch stickers over the network or from an
/// archive plug in here.
pub trait SourceLoader: Send + Sync {
    /// Loads the raw bytes (`.tgs` or `.json`) behind `source_url`.
    fn load_bytes(&self, source_url: &str) -> Result<Vec<u8>>;
}

/// The default implementation of `SourceLoader` reading from the local filesystem.
pub struct DefaultSourceLoader;

impl SourceLoader for DefaultSourceLoader {
    /// Reads `source_url` (optionally prefixed with `file://`), then falls back to `assets/`.
    #[instrument(level = "debug", skip(self))]
    fn load_bytes(&self, source_url: &str) -> Result<Vec<u8>> {
        let path = source_url.strip_prefix("file://").unwrap_or(source_url);
        if let Ok(bytes) = std::fs::read(path) {
            return Ok(bytes);
        }
        let alt = format!("assets/{}", path);
        std::fs::read(&alt).map_err(|e| {
            anyhow::anyhow!(
                "Sticker not found: {} (checked '{}' and '{}'): {}",
                source_url,
                path,
                alt,
                e
            )
        })
    }
}

/// In-memory payloads keyed by source locator (bundled stickers, tests).
#[derive(Default)]
pub struct MemorySourceLoader {
    payloads: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source_url: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut payloads) = self.payloads.write() {
            payloads.insert(source_url.into(), bytes);
        }
    }

    pub fn with(self, source_url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(source_url, bytes);
        self
    }
}

impl SourceLoader for MemorySourceLoader {
    fn load_bytes(&self, source_url: &str) -> Result<Vec<u8>> {
        let payloads = self
            .payloads
            .read()
            .map_err(|_| anyhow::anyhow!("payload table poisoned"))?;
        payloads
            .get(source_url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Sticker not found: {}", source_url))
    }
}
