use tiny_skia::Pixmap;

/// State of one frame index.
#[derive(Default)]
pub enum FrameSlot {
    #[default]
    Empty,
    /// Requested from the worker, not yet delivered.
    Pending,
    Decoded(Pixmap),
}

/// Sparse per-index frame store of one animation.
#[derive(Default)]
pub struct FrameCache {
    slots: Vec<FrameSlot>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self, index: usize) -> Option<&Pixmap> {
        match self.slots.get(index) {
            Some(FrameSlot::Decoded(bitmap)) => Some(bitmap),
            _ => None,
        }
    }

    pub fn is_decoded(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(FrameSlot::Decoded(_)))
    }

    pub fn is_pending(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(FrameSlot::Pending))
    }

    pub fn is_empty_slot(&self, index: usize) -> bool {
        matches!(self.slots.get(index), None | Some(FrameSlot::Empty))
    }

    pub fn mark_pending(&mut self, index: usize) {
        *self.slot_mut(index) = FrameSlot::Pending;
    }

    pub fn store(&mut self, index: usize, bitmap: Pixmap) {
        *self.slot_mut(index) = FrameSlot::Decoded(bitmap);
    }

    pub fn evict(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = FrameSlot::Empty;
        }
    }

    /// Empties every slot except `keep`. Pending slots are emptied too.
    pub fn retain_only(&mut self, keep: Option<usize>) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if Some(index) != keep {
                *slot = FrameSlot::Empty;
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn decoded_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, FrameSlot::Decoded(_)))
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, FrameSlot::Pending))
            .count()
    }

    fn slot_mut(&mut self, index: usize) -> &mut FrameSlot {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, FrameSlot::default);
        }
        &mut self.slots[index]
    }
}

/// Euclidean modulo for signed frame arithmetic.
pub fn wrap_index(count: usize, index: i64) -> usize {
    if count == 0 {
        return 0;
    }
    index.rem_euclid(count as i64) as usize
}
