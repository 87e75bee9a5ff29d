use crate::config::{AnimationParams, EngineConfig};
use crate::errors::PlayerError;
use crate::instance::{Animation, AnimationInstance, EventHandler, InstanceDeps};
use crate::pool::WorkerPool;
use crate::scheduler::Scheduler;
use crate::types::{RenderId, Rgb, ViewId};
use crate::view::Container;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, info, instrument};

/// Everything needed to show one sticker in one place.
pub struct AnimationRequest {
    pub(crate) source_url: String,
    pub(crate) container: Container,
    pub(crate) render_id: RenderId,
    pub(crate) params: AnimationParams,
    pub(crate) view_id: ViewId,
    pub(crate) custom_color: Option<Rgb>,
    pub(crate) on_load: Option<EventHandler>,
    pub(crate) on_ended: Option<EventHandler>,
    pub(crate) on_loop: Option<EventHandler>,
}

impl AnimationRequest {
    /// A request with a freshly allocated view id and default params.
    pub fn new(source_url: impl Into<String>, container: Container, render_id: impl Into<RenderId>) -> Self {
        Self {
            source_url: source_url.into(),
            container,
            render_id: render_id.into(),
            params: AnimationParams::default(),
            view_id: ViewId::next(),
            custom_color: None,
            on_load: None,
            on_ended: None,
            on_loop: None,
        }
    }

    pub fn with_params(mut self, params: AnimationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_view_id(mut self, view_id: ViewId) -> Self {
        self.view_id = view_id;
        self
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.custom_color = Some(color);
        self
    }

    /// Fires once this view has drawn its first frame.
    pub fn on_load(mut self, handler: impl Fn() + 'static) -> Self {
        self.on_load = Some(Rc::new(handler));
        self
    }

    /// Fires when a no-loop animation reaches its boundary.
    pub fn on_ended(mut self, handler: impl Fn() + 'static) -> Self {
        self.on_ended = Some(Rc::new(handler));
        self
    }

    /// Fires whenever playback wraps around.
    pub fn on_loop(mut self, handler: impl Fn() + 'static) -> Self {
        self.on_loop = Some(Rc::new(handler));
        self
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn render_id(&self) -> &RenderId {
        &self.render_id
    }
}

#[derive(Default)]
struct RegistryInner {
    instances: RefCell<HashMap<RenderId, Animation>>,
}

/// Non-owning registry handle kept by instances to deregister themselves.
#[derive(Clone, Default)]
pub(crate) struct WeakRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakRegistry {
    pub(crate) fn forget(&self, render_id: &RenderId, instance: &Weak<RefCell<AnimationInstance>>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut instances = inner.instances.borrow_mut();
        if instances
            .get(render_id)
            .is_some_and(|animation| animation.is_instance(instance))
        {
            instances.remove(render_id);
            debug!(%render_id, remaining = instances.len(), "animation deregistered");
        }
    }
}

/// Map from render id to the one live animation of that id.
pub struct AnimationRegistry {
    inner: Rc<RegistryInner>,
    config: Rc<EngineConfig>,
    scheduler: Scheduler,
    pool: Rc<WorkerPool>,
}

impl AnimationRegistry {
    pub fn new(config: Rc<EngineConfig>, scheduler: Scheduler, pool: Rc<WorkerPool>) -> Self {
        Self {
            inner: Rc::new(RegistryInner::default()),
            config,
            scheduler,
            pool,
        }
    }

    /// Returns the animation of `request.render_id`, creating it on first use.
    ///
    /// A hit attaches the request's container as a new view of the existing
    /// instance; its source, params and handlers other than `on_load` are ignored.
    #[instrument(level = "debug", skip(self, request), fields(render_id = %request.render_id, view_id = %request.view_id))]
    pub fn init(&self, request: AnimationRequest) -> Result<Animation, PlayerError> {
        let existing = self.inner.instances.borrow().get(&request.render_id).cloned();
        if let Some(animation) = existing {
            animation.add_view(
                request.view_id,
                request.container,
                request.on_load,
                request.params.coords,
            )?;
            return Ok(animation);
        }

        let render_id = request.render_id.clone();
        let source_url = request.source_url.clone();
        let worker = self.pool.acquire_for_new_instance()?;
        let worker_index = worker.index;
        let animation = Animation::create(
            request,
            InstanceDeps {
                config: self.config.clone(),
                scheduler: self.scheduler.clone(),
                worker,
                registry: WeakRegistry {
                    inner: Rc::downgrade(&self.inner),
                },
            },
        )?;
        self.inner
            .instances
            .borrow_mut()
            .insert(render_id.clone(), animation.clone());
        info!(%render_id, %source_url, worker = worker_index, "Animation created");
        Ok(animation)
    }

    pub fn get(&self, render_id: &RenderId) -> Option<Animation> {
        self.inner.instances.borrow().get(render_id).cloned()
    }

    pub fn contains(&self, render_id: &RenderId) -> bool {
        self.inner.instances.borrow().contains_key(render_id)
    }

    pub fn len(&self) -> usize {
        self.inner.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.instances.borrow().is_empty()
    }

    /// Removes one view of `render_id`.
    pub fn remove_view(&self, render_id: &RenderId, view_id: ViewId) -> Result<(), PlayerError> {
        let animation = self.get(render_id).ok_or(PlayerError::UnknownView(view_id))?;
        animation.remove_view(view_id)
    }

    /// Destroys every animation.
    pub fn clear(&self) {
        let animations: Vec<Animation> = self.inner.instances.borrow().values().cloned().collect();
        for animation in animations {
            animation.destroy();
        }
        self.inner.instances.borrow_mut().clear();
    }
}
