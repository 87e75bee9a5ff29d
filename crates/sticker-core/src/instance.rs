use crate::cache::{wrap_index, FrameCache};
use crate::config::{AnimationParams, EngineConfig};
use crate::errors::PlayerError;
use crate::pool::WorkerHandle;
use crate::protocol::{CallbackArgs, MethodCall, RemoteError, TimingInfo};
use crate::registry::{AnimationRequest, WeakRegistry};
use crate::scheduler::Scheduler;
use crate::types::{Coords, Direction, RenderId, Rgb, ViewId};
use crate::view::{offset_in, Canvas, Container, View, ViewTarget};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tiny_skia::Pixmap;
use tracing::{debug, error, info, warn};

/// Consecutive rejected frame renders retried before playback stops.
const MAX_RENDER_RETRIES: u32 = 3;

/// Consumer callback without arguments (load, end, loop).
pub type EventHandler = Rc<dyn Fn()>;

/// Shared services an instance needs.
pub(crate) struct InstanceDeps {
    pub config: Rc<EngineConfig>,
    pub scheduler: Scheduler,
    pub worker: WorkerHandle,
    pub registry: WeakRegistry,
}

/// Playback state of one render id, shared by all of its views.
pub struct AnimationInstance {
    this: Weak<RefCell<AnimationInstance>>,
    render_id: RenderId,
    source_url: String,
    params: AnimationParams,
    custom_color: Option<Rgb>,
    config: Rc<EngineConfig>,
    scheduler: Scheduler,
    worker: WorkerHandle,
    registry: WeakRegistry,

    views: BTreeMap<ViewId, View>,
    frames: FrameCache,
    frames_count: Option<usize>,
    img_size: u32,

    approx_frame_index: f64,
    prev_frame_index: Option<usize>,
    stop_frame_index: Option<f64>,

    is_animating: bool,
    is_waiting: bool,
    is_ended: bool,
    is_destroyed: bool,
    is_renderer_inited: bool,
    tick_scheduled: bool,

    direction: Direction,
    speed: f64,
    reduce_factor: u32,
    ms_per_frame: f64,
    cache_modulo: usize,
    last_render_at: Option<Instant>,
    render_failures: u32,

    on_ended: Option<EventHandler>,
    on_loop: Option<EventHandler>,
    fired: Vec<EventHandler>,
}

/// Point-in-time copy of an animation's playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub render_id: RenderId,
    pub source_url: String,
    pub worker_index: usize,
    pub frame_index: usize,
    pub approx_frame_index: f64,
    pub prev_frame_index: Option<usize>,
    pub stop_frame_index: Option<f64>,
    pub frames_count: Option<usize>,
    pub is_animating: bool,
    pub is_waiting: bool,
    pub is_ended: bool,
    pub is_destroyed: bool,
    pub is_renderer_inited: bool,
    pub direction: Direction,
    pub speed: f64,
    pub reduce_factor: u32,
    pub ms_per_frame: f64,
    pub img_size: u32,
    pub view_count: usize,
    pub cached_frames: usize,
    pub pending_frames: usize,
}

impl AnimationInstance {
    fn add_view(
        &mut self,
        view_id: ViewId,
        container: Container,
        on_load: Option<EventHandler>,
        coords: Option<Coords>,
    ) -> Result<(), PlayerError> {
        if self.is_destroyed {
            return Err(PlayerError::Destroyed(self.render_id.clone()));
        }
        let factor = self.config.size_factor(&self.params);
        let target = match container {
            Container::Mount(mount) => {
                if !mount.is_attached() {
                    return Err(PlayerError::ContainerNotMounted);
                }
                let size = self.params.size.ok_or(PlayerError::MissingSize)?;
                let pixels = (size as f32 * factor).round() as u32;
                if self.img_size == 0 {
                    self.img_size = pixels;
                }
                let canvas = Canvas::new(pixels, pixels)?;
                canvas.set_layout_size(size, size);
                mount.append(canvas.clone());
                ViewTarget::Dedicated { canvas, mount }
            }
            Container::SharedCanvas(canvas) => {
                if !canvas.is_connected() {
                    return Err(PlayerError::SharedCanvasNotMounted);
                }
                let size = self.params.size.ok_or(PlayerError::MissingSize)?;
                if self.img_size == 0 {
                    self.img_size = (size as f32 * factor).round() as u32;
                }
                let (width, height) = canvas.fit_to_layout(factor)?;
                let offset = offset_in(coords, width, height);
                ViewTarget::SharedRegion { canvas, offset }
            }
        };
        debug!(render_id = %self.render_id, %view_id, shared = target.is_shared(), "view added");
        self.views.insert(view_id, View::new(target, on_load));

        if self.is_renderer_inited {
            self.do_play();
        }
        Ok(())
    }

    fn remove_view(&mut self, view_id: ViewId) -> Result<(), PlayerError> {
        let view = self
            .views
            .remove(&view_id)
            .ok_or(PlayerError::UnknownView(view_id))?;
        view.target.detach(self.img_size);
        debug!(render_id = %self.render_id, %view_id, remaining = self.views.len(), "view removed");
        if self.views.is_empty() {
            self.destroy();
        }
        Ok(())
    }

    fn view_mut(&mut self, view_id: ViewId) -> Result<&mut View, PlayerError> {
        self.views
            .get_mut(&view_id)
            .ok_or(PlayerError::UnknownView(view_id))
    }

    fn is_playing(&self) -> bool {
        self.is_animating || self.is_waiting
    }

    fn play(&mut self, restart: bool, view_id: Option<ViewId>) -> Result<(), PlayerError> {
        if let Some(view_id) = view_id {
            self.view_mut(view_id)?.is_paused = false;
        }
        if self.is_ended && restart {
            self.approx_frame_index = 0.0;
        }
        self.stop_frame_index = None;
        self.direction = Direction::Forward;
        self.render_failures = 0;
        self.do_play();
        Ok(())
    }

    fn pause(&mut self, view_id: Option<ViewId>) -> Result<(), PlayerError> {
        self.last_render_at = None;
        if let Some(view_id) = view_id {
            self.view_mut(view_id)?.is_paused = true;
            if !self.views.values().all(|view| view.is_paused) {
                return Ok(());
            }
        }

        if self.is_waiting {
            self.stop_frame_index = Some(self.approx_frame_index);
        } else {
            self.is_animating = false;
        }

        if !self.params.is_low_priority {
            self.frames.retain_only(self.prev_frame_index);
        }
        Ok(())
    }

    fn play_segment(
        &mut self,
        (from, to): (u32, u32),
        restart: bool,
        view_id: Option<ViewId>,
    ) -> Result<(), PlayerError> {
        if let Some(view_id) = view_id {
            self.view_mut(view_id)?.is_paused = false;
        }
        let reduce_factor = self.reduce_factor.max(1) as f64;
        let last = self
            .frames_count
            .map_or(f64::MAX, |count| count.saturating_sub(1) as f64);
        let current = self.approx_frame_index.round();
        self.stop_frame_index = Some((to as f64 / reduce_factor).floor().min(last));
        if current != to as f64 || restart {
            self.approx_frame_index = (from as f64 / reduce_factor).floor().min(last);
        }
        self.direction = Direction::between(from, to);
        self.render_failures = 0;
        self.do_play();
        Ok(())
    }

    fn set_shared_canvas_coords(&mut self, view_id: ViewId, coords: Option<Coords>) -> Result<(), PlayerError> {
        let view = self
            .views
            .get(&view_id)
            .ok_or(PlayerError::UnknownView(view_id))?;
        let ViewTarget::SharedRegion { canvas, .. } = &view.target else {
            return Err(PlayerError::NotSharedCanvas(view_id));
        };
        let canvas = canvas.clone();

        if canvas.is_just_cleaned() {
            let this = self.this.clone();
            canvas.when_cleaned(move || {
                if let Some(inner) = this.upgrade() {
                    Animation { inner }.with(|instance| instance.reposition(view_id, coords));
                }
            });
            return Ok(());
        }

        let factor = self.config.size_factor(&self.params);
        canvas.fit_to_layout(factor)?;
        canvas.clear();
        canvas.mark_just_cleaned(&self.scheduler);
        self.reposition(view_id, coords);
        Ok(())
    }

    fn reposition(&mut self, view_id: ViewId, coords: Option<Coords>) {
        let Some(view) = self.views.get_mut(&view_id) else {
            debug!(%view_id, "view removed before reposition");
            return;
        };
        if let ViewTarget::SharedRegion { canvas, offset } = &mut view.target {
            *offset = offset_in(coords, canvas.width(), canvas.height());
        }
        let frame = self
            .prev_frame_index
            .and_then(|index| self.frames.frame(index))
            .or_else(|| self.frames.frame(self.approx_frame_index.round() as usize));
        if let Some(bitmap) = frame {
            view.target.draw_frame(bitmap);
        }
    }

    fn set_color(&mut self, color: Option<Rgb>) {
        self.custom_color = color;
        let _ = self.worker.connector.request(MethodCall::SetColor {
            render_id: self.render_id.clone(),
            custom_color: color,
        });
    }

    fn change_data(&mut self, source_url: String) {
        // Pausing without a view id cannot fail.
        let _ = self.pause(None);
        self.source_url = source_url;
        self.init_config();
        let this = self.this.clone();
        let _ = self.worker.connector.request_with_callback(
            MethodCall::ChangeData {
                render_id: self.render_id.clone(),
                source_url: self.source_url.clone(),
                is_low_priority: self.params.is_low_priority,
            },
            move |args| match args {
                CallbackArgs::Inited(timing) => {
                    if let Some(inner) = this.upgrade() {
                        Animation { inner }.with(|instance| instance.on_change_data(timing));
                    }
                }
                other => warn!("Unexpected changeData callback: {:?}", other),
            },
        );
    }

    fn init_config(&mut self) {
        self.cache_modulo = self.config.cache_modulo_for(self.params.is_low_priority);
    }

    fn init_renderer(&mut self) {
        let this = self.this.clone();
        let _ = self.worker.connector.request_with_callback(
            MethodCall::Init {
                render_id: self.render_id.clone(),
                source_url: self.source_url.clone(),
                size: self.img_size,
                is_low_priority: self.params.is_low_priority,
                custom_color: self.custom_color,
            },
            move |args| match args {
                CallbackArgs::Inited(timing) => {
                    if let Some(inner) = this.upgrade() {
                        Animation { inner }.with(|instance| instance.on_renderer_init(timing));
                    }
                }
                other => warn!("Unexpected init callback: {:?}", other),
            },
        );
    }

    fn on_renderer_init(&mut self, timing: TimingInfo) {
        self.apply_timing(timing);
        self.is_renderer_inited = true;
        debug!(render_id = %self.render_id, frames = timing.frames_count, "renderer ready");
        if self.is_waiting {
            self.do_play();
        }
    }

    fn on_change_data(&mut self, timing: TimingInfo) {
        self.apply_timing(timing);
        self.frames.clear();
        self.prev_frame_index = None;
        self.stop_frame_index = None;
        let last = timing.frames_count.saturating_sub(1) as f64;
        self.approx_frame_index = self.approx_frame_index.min(last);
        self.is_waiting = false;
        self.is_animating = false;
        self.do_play();
    }

    fn apply_timing(&mut self, timing: TimingInfo) {
        self.reduce_factor = timing.reduce_factor;
        self.ms_per_frame = timing.ms_per_frame;
        self.frames_count = Some(timing.frames_count);
    }

    fn destroy(&mut self) {
        if self.is_destroyed {
            return;
        }
        self.is_destroyed = true;
        for view in std::mem::take(&mut self.views).into_values() {
            view.target.detach(self.img_size);
        }
        let _ = self.pause(None);
        self.frames.clear();
        let _ = self.worker.connector.request(MethodCall::Destroy {
            render_id: self.render_id.clone(),
        });
        self.registry.forget(&self.render_id, &self.this);
        info!(render_id = %self.render_id, "Animation destroyed");
    }

    fn do_play(&mut self) {
        if self.frames_count.is_none() || self.is_destroyed || self.is_animating {
            return;
        }
        if !self.is_waiting {
            self.last_render_at = None;
        }
        self.is_ended = false;
        self.is_animating = true;
        self.is_waiting = false;

        if !self.tick_scheduled {
            self.tick_scheduled = true;
            let this = self.this.clone();
            self.scheduler.animate(move |now| match this.upgrade() {
                Some(inner) => Animation { inner }.with(|instance| {
                    let keep = instance.tick(now);
                    if !keep {
                        instance.tick_scheduled = false;
                    }
                    keep
                }),
                None => false,
            });
        }
    }

    /// One redraw step. Returns whether to stay scheduled.
    fn tick(&mut self, now: Instant) -> bool {
        if self.is_destroyed {
            return false;
        }
        if !self.is_animating && self.views.values().all(|view| view.is_loaded) {
            return false;
        }
        let Some(frames_count) = self.frames_count.filter(|count| *count > 0) else {
            return false;
        };

        let index = self.approx_frame_index.round() as usize;
        if !self.frames.is_decoded(index) {
            if self.frames.is_empty_slot(index) {
                self.request_frame(index);
            }
            self.is_animating = false;
            self.is_waiting = true;
            return false;
        }

        if self.cache_modulo > 0 && index % self.cache_modulo == 0 {
            self.cleanup_prev_frame(index, frames_count);
        }

        if self.prev_frame_index != Some(index) || self.views.values().any(|view| !view.is_loaded) {
            self.draw_frame(index);
            self.prev_frame_index = Some(index);
        }

        let ratio = self
            .last_render_at
            .map(|at| self.ms_per_frame / (now.saturating_duration_since(at).as_secs_f64() * 1000.0))
            .unwrap_or(1.0);
        let delta = self.direction.sign() * self.speed / ratio;
        let next = (self.approx_frame_index + delta).round();
        let last = frames_count - 1;
        self.last_render_at = Some(now);

        if delta > 0.0 && (index == last || next > last as f64) {
            if self.params.no_loop {
                return self.end();
            }
            self.fire_loop();
            self.approx_frame_index = 0.0;
        } else if delta < 0.0 && (index == 0 || next < 0.0) {
            if self.params.no_loop {
                return self.end();
            }
            self.fire_loop();
            self.approx_frame_index = last as f64;
        } else {
            if let Some(stop) = self.stop_frame_index {
                let reached = index as f64 == stop
                    || (delta > 0.0 && next > stop)
                    || (delta < 0.0 && next < stop);
                if reached {
                    self.stop_frame_index = None;
                    self.is_animating = false;
                    return false;
                }
            }
            self.approx_frame_index += delta;
        }

        let index = self.approx_frame_index.round() as usize;
        if self.frames.is_empty_slot(index) {
            self.request_frame(index);
            self.is_waiting = true;
            self.is_animating = false;
            return false;
        }
        true
    }

    fn end(&mut self) -> bool {
        self.is_animating = false;
        self.is_ended = true;
        if let Some(handler) = &self.on_ended {
            self.fired.push(handler.clone());
        }
        false
    }

    fn fire_loop(&mut self) {
        if let Some(handler) = &self.on_loop {
            self.fired.push(handler.clone());
        }
    }

    fn draw_frame(&mut self, index: usize) {
        let Some(bitmap) = self.frames.frame(index) else {
            return;
        };
        for view in self.views.values_mut() {
            if !(view.is_loaded && view.is_paused) {
                view.target.clear_region(self.img_size);
                view.target.draw_frame(bitmap);
            }
            if !view.is_loaded {
                view.is_loaded = true;
                if let Some(on_load) = &view.on_load {
                    self.fired.push(on_load.clone());
                }
            }
        }
    }

    fn cleanup_prev_frame(&mut self, index: usize, frames_count: usize) {
        if frames_count < 3 {
            return;
        }
        self.frames.evict(wrap_index(frames_count, index as i64 - 1));
    }

    fn request_frame(&mut self, index: usize) {
        self.frames.mark_pending(index);
        let this = self.this.clone();
        let (reply, _) = self.worker.connector.request_with_callback(
            MethodCall::RenderFrames {
                render_id: self.render_id.clone(),
                start_index: index,
            },
            move |args| match args {
                CallbackArgs::Frame { index, bitmap } => {
                    if let Some(inner) = this.upgrade() {
                        Animation { inner }.with(|instance| instance.on_frame_load(index, bitmap));
                    }
                }
                other => warn!("Unexpected renderFrames callback: {:?}", other),
            },
        );
        let this = self.this.clone();
        self.worker.connector.on_settled(&reply, move |settlement| {
            if let (Err(e), Some(inner)) = (settlement, this.upgrade()) {
                Animation { inner }.with(|instance| instance.on_render_rejected(index, e));
            }
        });
    }

    fn on_render_rejected(&mut self, index: usize, e: &RemoteError) {
        if self.is_destroyed {
            return;
        }
        if self.frames.is_pending(index) {
            self.frames.evict(index);
        }
        self.render_failures += 1;
        if self.render_failures > MAX_RENDER_RETRIES {
            error!(render_id = %self.render_id, index, failures = self.render_failures, "Giving up on frame: {}", e);
            self.is_waiting = false;
            self.is_animating = false;
            return;
        }
        warn!(render_id = %self.render_id, index, "Frame render rejected, retrying: {}", e);
        if self.is_waiting {
            self.do_play();
        }
    }

    fn on_frame_load(&mut self, index: usize, bitmap: Pixmap) {
        if self.is_destroyed {
            return;
        }
        if !matches!(self.frames_count, Some(count) if index < count) {
            warn!(render_id = %self.render_id, index, "Frame out of range");
            return;
        }
        let accept =
            self.frames.is_pending(index) || (self.frames.is_empty_slot(index) && self.is_playing());
        if !accept {
            debug!(render_id = %self.render_id, index, "dropping late frame");
            return;
        }
        self.frames.store(index, bitmap);
        self.render_failures = 0;
        if self.is_waiting {
            self.do_play();
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            render_id: self.render_id.clone(),
            source_url: self.source_url.clone(),
            worker_index: self.worker.index,
            frame_index: self.approx_frame_index.round() as usize,
            approx_frame_index: self.approx_frame_index,
            prev_frame_index: self.prev_frame_index,
            stop_frame_index: self.stop_frame_index,
            frames_count: self.frames_count,
            is_animating: self.is_animating,
            is_waiting: self.is_waiting,
            is_ended: self.is_ended,
            is_destroyed: self.is_destroyed,
            is_renderer_inited: self.is_renderer_inited,
            direction: self.direction,
            speed: self.speed,
            reduce_factor: self.reduce_factor,
            ms_per_frame: self.ms_per_frame,
            img_size: self.img_size,
            view_count: self.views.len(),
            cached_frames: self.frames.decoded_count(),
            pending_frames: self.frames.pending_count(),
        }
    }
}

/// Shared handle of an animation instance.
///
/// Every view of the same render id holds the same instance. Event handlers
/// run after the instance borrow is released, so they may call back in.
#[derive(Clone)]
pub struct Animation {
    inner: Rc<RefCell<AnimationInstance>>,
}

impl std::fmt::Debug for Animation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animation").finish_non_exhaustive()
    }
}

impl Animation {
    pub(crate) fn create(request: AnimationRequest, deps: InstanceDeps) -> Result<Self, PlayerError> {
        let AnimationRequest {
            source_url,
            container,
            render_id,
            params,
            view_id,
            custom_color,
            on_load,
            on_ended,
            on_loop,
        } = request;

        let inner = Rc::new_cyclic(|this| {
            RefCell::new(AnimationInstance {
                this: this.clone(),
                render_id,
                source_url,
                params,
                custom_color,
                config: deps.config,
                scheduler: deps.scheduler,
                worker: deps.worker,
                registry: deps.registry,
                views: BTreeMap::new(),
                frames: FrameCache::new(),
                frames_count: None,
                img_size: 0,
                approx_frame_index: 0.0,
                prev_frame_index: None,
                // A new animation shows its first frame and holds until played.
                stop_frame_index: Some(0.0),
                is_animating: false,
                is_waiting: true,
                is_ended: false,
                is_destroyed: false,
                is_renderer_inited: false,
                tick_scheduled: false,
                direction: Direction::Forward,
                speed: 1.0,
                reduce_factor: 1,
                ms_per_frame: 1000.0 / 60.0,
                cache_modulo: 0,
                last_render_at: None,
                render_failures: 0,
                on_ended,
                on_loop,
                fired: Vec::new(),
            })
        });

        let animation = Animation { inner };
        animation.with(|instance| -> Result<(), PlayerError> {
            let coords = instance.params.coords;
            instance.add_view(view_id, container, on_load, coords)?;
            instance.init_config();
            instance.init_renderer();
            Ok(())
        })?;
        Ok(animation)
    }

    fn with<R>(&self, f: impl FnOnce(&mut AnimationInstance) -> R) -> R {
        let (result, fired) = {
            let mut instance = self.inner.borrow_mut();
            let result = f(&mut instance);
            (result, std::mem::take(&mut instance.fired))
        };
        for handler in fired {
            handler();
        }
        result
    }

    pub fn render_id(&self) -> RenderId {
        self.inner.borrow().render_id.clone()
    }

    /// Whether both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Animation) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn is_instance(&self, other: &Weak<RefCell<AnimationInstance>>) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.inner), other.as_ptr())
    }

    /// Starts or resumes playback. `restart` rewinds an ended animation.
    pub fn play(&self, restart: bool, view_id: Option<ViewId>) -> Result<(), PlayerError> {
        self.with(|instance| instance.play(restart, view_id))
    }

    /// Pauses one view, or the whole animation when `view_id` is `None`.
    ///
    /// Playback halts once every view is paused.
    pub fn pause(&self, view_id: Option<ViewId>) -> Result<(), PlayerError> {
        self.with(|instance| instance.pause(view_id))
    }

    /// Plays native frames `from..=to` and stops at `to`.
    pub fn play_segment(&self, segment: (u32, u32), restart: bool, view_id: Option<ViewId>) -> Result<(), PlayerError> {
        self.with(|instance| instance.play_segment(segment, restart, view_id))
    }

    /// Sets the playback rate multiplier. Non-finite or non-positive values are ignored.
    pub fn set_speed(&self, speed: f64) {
        self.with(|instance| {
            if speed.is_finite() && speed > 0.0 {
                instance.speed = speed;
            } else {
                debug!(render_id = %instance.render_id, speed, "ignoring invalid speed");
            }
        });
    }

    pub fn set_no_loop(&self, no_loop: bool) {
        self.with(|instance| instance.params.no_loop = no_loop);
    }

    pub fn set_color(&self, color: Option<Rgb>) {
        self.with(|instance| instance.set_color(color));
    }

    /// Swaps the animation source while keeping views and playback position.
    pub fn change_data(&self, source_url: impl Into<String>) {
        let source_url = source_url.into();
        self.with(|instance| instance.change_data(source_url));
    }

    pub fn add_view(
        &self,
        view_id: ViewId,
        container: Container,
        on_load: Option<EventHandler>,
        coords: Option<Coords>,
    ) -> Result<(), PlayerError> {
        self.with(|instance| instance.add_view(view_id, container, on_load, coords))
    }

    /// Removes a view. Removing the last one destroys the animation.
    pub fn remove_view(&self, view_id: ViewId) -> Result<(), PlayerError> {
        self.with(|instance| instance.remove_view(view_id))
    }

    /// Moves a shared-canvas view. The canvas is refitted and cleared at most
    /// once per turn; later moves in the same turn wait for tick end.
    pub fn set_shared_canvas_coords(&self, view_id: ViewId, coords: Option<Coords>) -> Result<(), PlayerError> {
        self.with(|instance| instance.set_shared_canvas_coords(view_id, coords))
    }

    pub fn is_playing(&self) -> bool {
        self.inner.borrow().is_playing()
    }

    pub fn has_view(&self, view_id: ViewId) -> bool {
        self.inner.borrow().views.contains_key(&view_id)
    }

    pub fn view_ids(&self) -> Vec<ViewId> {
        self.inner.borrow().views.keys().copied().collect()
    }

    pub fn is_view_loaded(&self, view_id: ViewId) -> Option<bool> {
        self.inner.borrow().views.get(&view_id).map(|view| view.is_loaded)
    }

    pub fn is_view_paused(&self, view_id: ViewId) -> Option<bool> {
        self.inner.borrow().views.get(&view_id).map(|view| view.is_paused)
    }

    /// Surface a view draws into.
    pub fn canvas(&self, view_id: ViewId) -> Option<Canvas> {
        self.inner
            .borrow()
            .views
            .get(&view_id)
            .map(|view| view.target.canvas().clone())
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.borrow().snapshot()
    }

    pub(crate) fn destroy(&self) {
        self.with(|instance| instance.destroy());
    }
}
