//! Fixed-size ring of per-frame state.

/// `N` slots indexed by `frame % N`.
///
/// The frame counter only moves forward through [`FrameRing::advance`], so
/// the current slot is always the one the next frame will use.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    frame: u64,
}

impl<T> FrameRing<T> {
    /// Wraps `slots`. Returns `None` when there are none.
    pub fn new(slots: Vec<T>) -> Option<Self> {
        if slots.is_empty() {
            return None;
        }
        Some(Self { slots, frame: 0 })
    }

    /// Builds `count` slots with `make`, stopping at the first error.
    pub fn try_from_fn<E>(
        count: usize,
        mut make: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Option<Self>, E> {
        let slots = (0..count).map(&mut make).collect::<Result<Vec<_>, E>>()?;
        Ok(Self::new(slots))
    }

    /// Index of the current slot.
    #[inline]
    pub fn index(&self) -> usize {
        (self.frame % self.slots.len() as u64) as usize
    }

    /// Frames advanced past so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a ring has at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn current(&self) -> &T {
        &self.slots[self.index()]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        let index = self.index();
        &mut self.slots[index]
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)
    }

    /// Moves to the next slot.
    #[inline]
    pub fn advance(&mut self) {
        self.frame += 1;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.slots.iter_mut()
    }
}
