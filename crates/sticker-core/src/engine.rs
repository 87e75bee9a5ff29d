use crate::config::EngineConfig;
use crate::errors::PlayerError;
use crate::instance::Animation;
use crate::pool::WorkerPool;
use crate::rasterizer::RasterizerFactory;
use crate::registry::{AnimationRegistry, AnimationRequest};
use crate::scheduler::Scheduler;
use crate::types::{RenderId, ViewId};
use crate::SourceLoader;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{instrument, trace};

/// Work done by one [`Engine::run_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Envelopes received from workers.
    pub envelopes: usize,
    /// Redraw tasks still scheduled after this frame.
    pub animating: usize,
    /// Tick-end hooks run (flushes included).
    pub tick_end_hooks: usize,
}

/// The main coordinator of sticker playback.
///
/// The `Engine` owns the scheduler, the worker pool and the animation
/// registry. It is single-threaded; only the workers it spawns run elsewhere.
pub struct Engine {
    pub config: Rc<EngineConfig>,
    pub scheduler: Scheduler,
    pub pool: Rc<WorkerPool>,
    pub registry: AnimationRegistry,
}

impl Engine {
    /// Spawns the worker pool and builds an empty registry.
    pub fn new(
        config: EngineConfig,
        loader: Arc<dyn SourceLoader>,
        rasterizers: Arc<dyn RasterizerFactory>,
    ) -> Result<Self, PlayerError> {
        let scheduler = Scheduler::new();
        let pool = WorkerPool::spawn(&config, loader, rasterizers, scheduler.clone())?;
        Ok(Self::with_pool(config, pool, scheduler))
    }

    /// Uses a pool built on `scheduler`, typically from host-provided ports.
    pub fn with_pool(config: EngineConfig, pool: WorkerPool, scheduler: Scheduler) -> Self {
        let config = Rc::new(config);
        let pool = Rc::new(pool);
        let registry = AnimationRegistry::new(config.clone(), scheduler.clone(), pool.clone());
        Self {
            config,
            scheduler,
            pool,
            registry,
        }
    }

    pub fn init(&self, request: AnimationRequest) -> Result<Animation, PlayerError> {
        self.registry.init(request)
    }

    pub fn remove_view(&self, render_id: &RenderId, view_id: ViewId) -> Result<(), PlayerError> {
        self.registry.remove_view(render_id, view_id)
    }

    /// One host redraw: deliver worker messages, run redraw tasks, end the turn.
    #[instrument(level = "trace", skip(self))]
    pub fn run_frame(&self, now: Instant) -> Result<FrameStats, PlayerError> {
        let envelopes = self.pool.poll()?;
        let mut tick_end_hooks = self.scheduler.run_tick_end();
        let animating = self.scheduler.run_animations(now);
        tick_end_hooks += self.scheduler.run_tick_end();
        let stats = FrameStats {
            envelopes,
            animating,
            tick_end_hooks,
        };
        trace!(?stats, "frame done");
        Ok(stats)
    }

    /// Ends the current turn outside of a redraw (after host calls).
    pub fn end_turn(&self) -> usize {
        self.scheduler.run_tick_end()
    }

    /// Destroys every animation and posts the resulting messages.
    pub fn shutdown(&self) {
        self.registry.clear();
        self.scheduler.run_tick_end();
    }
}
