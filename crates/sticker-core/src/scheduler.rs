use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

type AnimationTask = Box<dyn FnMut(Instant) -> bool>;
type TickEndHook = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerInner {
    animations: RefCell<Vec<AnimationTask>>,
    tick_end: RefCell<VecDeque<TickEndHook>>,
}

/// Main-thread scheduling surface.
///
/// Animation tasks run once per host redraw and stay scheduled while they
/// return `true`. Tick-end hooks run once when the current turn finishes.
/// Cloning yields another handle to the same queues.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a redraw task.
    pub fn animate(&self, task: impl FnMut(Instant) -> bool + 'static) {
        self.inner.animations.borrow_mut().push(Box::new(task));
    }

    /// Registers a hook for the end of the current turn.
    pub fn on_tick_end(&self, hook: impl FnOnce() + 'static) {
        self.inner.tick_end.borrow_mut().push_back(Box::new(hook));
    }

    /// Runs every scheduled task once. Returns how many stay scheduled.
    ///
    /// Tasks registered while running are kept for the next redraw.
    pub fn run_animations(&self, now: Instant) -> usize {
        let tasks = std::mem::take(&mut *self.inner.animations.borrow_mut());
        let mut kept = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if task(now) {
                kept.push(task);
            }
        }
        let mut animations = self.inner.animations.borrow_mut();
        let added = std::mem::take(&mut *animations);
        kept.extend(added);
        *animations = kept;
        animations.len()
    }

    /// Drains tick-end hooks, including hooks queued by hooks.
    pub fn run_tick_end(&self) -> usize {
        let mut ran = 0;
        loop {
            let hook = self.inner.tick_end.borrow_mut().pop_front();
            match hook {
                Some(hook) => {
                    hook();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn pending_animations(&self) -> usize {
        self.inner.animations.borrow().len()
    }

    pub fn pending_tick_end(&self) -> usize {
        self.inner.tick_end.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn tasks_stay_scheduled_while_true() {
        let scheduler = Scheduler::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        scheduler.animate(move |_| {
            counter.set(counter.get() + 1);
            counter.get() < 3
        });

        let now = Instant::now();
        assert_eq!(scheduler.run_animations(now), 1);
        assert_eq!(scheduler.run_animations(now), 1);
        assert_eq!(scheduler.run_animations(now), 0);
        assert_eq!(scheduler.run_animations(now), 0);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn tasks_added_during_a_run_wait_for_the_next_one() {
        let scheduler = Scheduler::new();
        let ran_inner = Rc::new(Cell::new(false));
        let flag = ran_inner.clone();
        let handle = scheduler.clone();
        scheduler.animate(move |_| {
            let flag = flag.clone();
            handle.animate(move |_| {
                flag.set(true);
                false
            });
            false
        });

        scheduler.run_animations(Instant::now());
        assert!(!ran_inner.get());
        assert_eq!(scheduler.pending_animations(), 1);
        scheduler.run_animations(Instant::now());
        assert!(ran_inner.get());
    }

    #[test]
    fn tick_end_drains_nested_hooks() {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        let handle = scheduler.clone();
        scheduler.on_tick_end(move || {
            o1.borrow_mut().push(1);
            let o3 = o1.clone();
            handle.on_tick_end(move || o3.borrow_mut().push(3));
        });
        scheduler.on_tick_end(move || o2.borrow_mut().push(2));

        assert_eq!(scheduler.run_tick_end(), 3);
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
        assert_eq!(scheduler.pending_tick_end(), 0);
    }
}
