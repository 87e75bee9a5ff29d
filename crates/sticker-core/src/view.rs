use crate::errors::PlayerError;
use crate::scheduler::Scheduler;
use crate::types::{Coords, PixelOffset};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tiny_skia::{BlendMode, Color, Paint, Pixmap, PixmapPaint, Rect, Transform};

struct CanvasInner {
    pixmap: RefCell<Pixmap>,
    layout_size: Cell<(u32, u32)>,
    connected: Cell<bool>,
    just_cleaned: Cell<bool>,
    after_clean: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// A drawing surface backed by a `tiny-skia` pixmap.
///
/// Cloning yields another handle to the same surface.
#[derive(Clone)]
pub struct Canvas {
    inner: Rc<CanvasInner>,
}

impl Canvas {
    /// Surface of `width`x`height` physical pixels laid out at the same logical size.
    pub fn new(width: u32, height: u32) -> Result<Self, PlayerError> {
        let pixmap = Pixmap::new(width, height).ok_or(PlayerError::SurfaceAllocation(width, height))?;
        Ok(Self {
            inner: Rc::new(CanvasInner {
                pixmap: RefCell::new(pixmap),
                layout_size: Cell::new((width, height)),
                connected: Cell::new(true),
                just_cleaned: Cell::new(false),
                after_clean: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Host-owned atlas canvas with a logical layout size.
    pub fn shared(layout_width: u32, layout_height: u32) -> Result<Self, PlayerError> {
        Self::new(layout_width, layout_height)
    }

    pub fn width(&self) -> u32 {
        self.inner.pixmap.borrow().width()
    }

    pub fn height(&self) -> u32 {
        self.inner.pixmap.borrow().height()
    }

    pub fn layout_size(&self) -> (u32, u32) {
        self.inner.layout_size.get()
    }

    pub fn set_layout_size(&self, width: u32, height: u32) {
        self.inner.layout_size.set((width, height));
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.get()
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.set(connected);
    }

    /// Resizes the backing store to `layout_size * factor`. Returns the pixel size.
    pub fn fit_to_layout(&self, factor: f32) -> Result<(u32, u32), PlayerError> {
        let (layout_w, layout_h) = self.layout_size();
        let width = (layout_w as f32 * factor).round() as u32;
        let height = (layout_h as f32 * factor).round() as u32;
        let mut pixmap = self.inner.pixmap.borrow_mut();
        if pixmap.width() != width || pixmap.height() != height {
            *pixmap = Pixmap::new(width, height).ok_or(PlayerError::SurfaceAllocation(width, height))?;
        }
        Ok((width, height))
    }

    pub fn clear_rect(&self, x: i32, y: i32, width: u32, height: u32) {
        let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) else {
            return;
        };
        let mut paint = Paint::default();
        paint.blend_mode = BlendMode::Clear;
        self.inner
            .pixmap
            .borrow_mut()
            .fill_rect(rect, &paint, Transform::identity(), None);
    }

    pub fn clear(&self) {
        self.inner.pixmap.borrow_mut().fill(Color::TRANSPARENT);
    }

    pub fn draw(&self, bitmap: &Pixmap, x: i32, y: i32) {
        self.inner.pixmap.borrow_mut().draw_pixmap(
            x,
            y,
            bitmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// Premultiplied RGBA of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.inner
            .pixmap
            .borrow()
            .pixel(x, y)
            .map(|p| [p.red(), p.green(), p.blue(), p.alpha()])
    }

    pub fn with_pixmap<R>(&self, f: impl FnOnce(&Pixmap) -> R) -> R {
        f(&self.inner.pixmap.borrow())
    }

    pub fn is_just_cleaned(&self) -> bool {
        self.inner.just_cleaned.get()
    }

    /// Flags the canvas as cleared in this turn. The flag resets at tick end,
    /// which then runs the continuations queued with [`Canvas::when_cleaned`].
    pub fn mark_just_cleaned(&self, scheduler: &Scheduler) {
        if self.inner.just_cleaned.replace(true) {
            return;
        }
        let weak: Weak<CanvasInner> = Rc::downgrade(&self.inner);
        scheduler.on_tick_end(move || {
            if let Some(inner) = weak.upgrade() {
                inner.just_cleaned.set(false);
                let hooks = std::mem::take(&mut *inner.after_clean.borrow_mut());
                for hook in hooks {
                    hook();
                }
            }
        });
    }

    /// Runs `f` now, or after the pending clear settles.
    pub fn when_cleaned(&self, f: impl FnOnce() + 'static) {
        if self.is_just_cleaned() {
            self.inner.after_clean.borrow_mut().push(Box::new(f));
        } else {
            f();
        }
    }

    pub fn ptr_eq(&self, other: &Canvas) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

struct MountInner {
    attached: Cell<bool>,
    children: RefCell<Vec<Canvas>>,
}

/// Host container receiving dedicated canvases.
#[derive(Clone)]
pub struct Mount {
    inner: Rc<MountInner>,
}

impl Mount {
    fn with_state(attached: bool) -> Self {
        Self {
            inner: Rc::new(MountInner {
                attached: Cell::new(attached),
                children: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn attached() -> Self {
        Self::with_state(true)
    }

    /// A container that is not part of the host tree yet.
    pub fn detached() -> Self {
        Self::with_state(false)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.get()
    }

    pub fn set_attached(&self, attached: bool) {
        self.inner.attached.set(attached);
    }

    pub fn append(&self, canvas: Canvas) {
        self.inner.children.borrow_mut().push(canvas);
    }

    pub fn remove(&self, canvas: &Canvas) {
        self.inner
            .children
            .borrow_mut()
            .retain(|child| !child.ptr_eq(canvas));
    }

    pub fn children(&self) -> Vec<Canvas> {
        self.inner.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }
}

/// Where a new view draws.
#[derive(Clone)]
pub enum Container {
    /// A dedicated canvas is created and appended to the mount.
    Mount(Mount),
    /// The view draws into a region of a host-owned canvas.
    SharedCanvas(Canvas),
}

pub enum ViewTarget {
    Dedicated { canvas: Canvas, mount: Mount },
    SharedRegion { canvas: Canvas, offset: PixelOffset },
}

impl ViewTarget {
    pub fn canvas(&self) -> &Canvas {
        match self {
            ViewTarget::Dedicated { canvas, .. } | ViewTarget::SharedRegion { canvas, .. } => canvas,
        }
    }

    pub fn offset(&self) -> PixelOffset {
        match self {
            ViewTarget::Dedicated { .. } => PixelOffset::default(),
            ViewTarget::SharedRegion { offset, .. } => *offset,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ViewTarget::SharedRegion { .. })
    }

    pub fn clear_region(&self, img_size: u32) {
        let offset = self.offset();
        self.canvas().clear_rect(offset.x, offset.y, img_size, img_size);
    }

    pub fn draw_frame(&self, bitmap: &Pixmap) {
        let offset = self.offset();
        self.canvas().draw(bitmap, offset.x, offset.y);
    }

    /// Removes the view's pixels from the host.
    pub fn detach(&self, img_size: u32) {
        match self {
            ViewTarget::Dedicated { canvas, mount } => mount.remove(canvas),
            ViewTarget::SharedRegion { .. } => self.clear_region(img_size),
        }
    }
}

/// Pixel offset of fractional `coords` inside a `width`x`height` surface.
pub fn offset_in(coords: Option<Coords>, width: u32, height: u32) -> PixelOffset {
    let coords = coords.unwrap_or_default();
    PixelOffset {
        x: (coords.x * width as f32).round() as i32,
        y: (coords.y * height as f32).round() as i32,
    }
}

/// One consumer of an animation.
pub struct View {
    pub target: ViewTarget,
    pub is_paused: bool,
    /// Set once the first frame has been drawn.
    pub is_loaded: bool,
    pub on_load: Option<Rc<dyn Fn()>>,
}

impl View {
    pub fn new(target: ViewTarget, on_load: Option<Rc<dyn Fn()>>) -> Self {
        Self {
            target,
            is_paused: false,
            is_loaded: false,
            on_load,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(size: u32, r: u8) -> Pixmap {
        let mut pixmap = Pixmap::new(size, size).unwrap();
        pixmap.fill(Color::from_rgba8(r, 0, 0, 255));
        pixmap
    }

    #[test]
    fn draw_and_clear_region() {
        let canvas = Canvas::new(8, 8).unwrap();
        canvas.draw(&solid(4, 200), 4, 4);
        assert_eq!(canvas.pixel(5, 5), Some([200, 0, 0, 255]));
        assert_eq!(canvas.pixel(1, 1), Some([0, 0, 0, 0]));

        canvas.clear_rect(4, 4, 4, 4);
        assert_eq!(canvas.pixel(5, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn fit_to_layout_resizes_backing_store() {
        let canvas = Canvas::shared(100, 50).unwrap();
        assert_eq!(canvas.fit_to_layout(2.0).unwrap(), (200, 100));
        assert_eq!((canvas.width(), canvas.height()), (200, 100));
        assert!(matches!(
            canvas.fit_to_layout(0.0),
            Err(PlayerError::SurfaceAllocation(0, 0))
        ));
    }

    #[test]
    fn cleaned_flag_resets_at_tick_end() {
        let scheduler = Scheduler::new();
        let canvas = Canvas::new(4, 4).unwrap();
        let ran = Rc::new(Cell::new(0));

        let counter = ran.clone();
        canvas.when_cleaned(move || counter.set(counter.get() + 1));
        assert_eq!(ran.get(), 1);

        canvas.mark_just_cleaned(&scheduler);
        let counter = ran.clone();
        canvas.when_cleaned(move || counter.set(counter.get() + 1));
        assert_eq!(ran.get(), 1);

        scheduler.run_tick_end();
        assert!(!canvas.is_just_cleaned());
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn mount_tracks_children() {
        let mount = Mount::attached();
        let canvas = Canvas::new(2, 2).unwrap();
        mount.append(canvas.clone());
        assert_eq!(mount.child_count(), 1);
        let target = ViewTarget::Dedicated {
            canvas,
            mount: mount.clone(),
        };
        target.detach(2);
        assert_eq!(mount.child_count(), 0);
    }

    #[test]
    fn offsets_round_fractional_coords() {
        assert_eq!(offset_in(Some(Coords::new(0.5, 0.25)), 200, 100), PixelOffset { x: 100, y: 25 });
        assert_eq!(offset_in(None, 200, 100), PixelOffset::default());
    }
}
