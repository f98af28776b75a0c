//! The per-frame protocol.
//!
//! [`FramePipeline::run_iteration`] is the single place where the order of
//! operations for a frame is decided:
//!
//! 1. Rebuild the swapchain first if a resize is pending, and stop there
//! 2. Wait for the slot's fence
//! 3. Acquire an image; if the swapchain needs rebuilding, do so and stop
//! 4. Reset the fence and command pool, then record
//! 5. Submit
//! 6. Present, then advance to the next slot
//! 7. Rebuild the swapchain if presentation asked for it
//!
//! The GPU side is reached only through [`FrameBackend`], so the ordering
//! can be checked against a recording backend in tests.

use harness_rhi::swapchain::AcquireOutcome;
use tracing::{debug, warn};

use crate::error::FrameError;
use crate::frame::FrameRing;

/// Where a frame slot is in its cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    /// Not in use by the GPU; the fence is signaled.
    #[default]
    Idle,
    /// Command buffer being recorded.
    Recording,
    /// Submitted; the fence signals on completion.
    Submitted,
}

/// What one iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Presented {
        image_index: u32,
        /// The swapchain was rebuilt after presenting.
        recreated: bool,
    },
    /// The swapchain was rebuilt instead of drawing.
    Skipped,
    /// A rebuild is pending but the framebuffer has no area.
    Deferred,
}

/// GPU operations the frame protocol is built from.
///
/// `slot` is always in `0..frames_in_flight`.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Acquires the next swapchain image, signaling the slot's acquire
    /// semaphore.
    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome, FrameError>;

    /// Resets the slot's fence and command pool.
    fn reset_slot(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Records the frame's commands targeting `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError>;

    /// Submits the slot's command buffer.
    fn submit(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Presents `image_index`. Returns true if the swapchain should be
    /// rebuilt.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, FrameError>;

    /// Rebuilds the swapchain and everything sized by it.
    ///
    /// Returns false, without touching anything, when the framebuffer has
    /// zero area.
    fn recreate(&mut self) -> Result<bool, FrameError>;

    /// Returns a slot to a usable state after a frame was abandoned
    /// between [`reset_slot`](Self::reset_slot) and a successful
    /// [`submit`](Self::submit).
    fn abandon(&mut self, slot: usize) -> Result<(), FrameError>;
}

/// Drives [`FrameBackend`] through the frame protocol.
#[derive(Debug)]
pub struct FramePipeline {
    slots: FrameRing<SlotState>,
    resize_requested: bool,
}

impl FramePipeline {
    /// Creates the pipeline for `frames_in_flight` slots. Returns `None`
    /// for zero.
    pub fn new(frames_in_flight: usize) -> Option<Self> {
        Some(Self {
            slots: FrameRing::new(vec![SlotState::Idle; frames_in_flight])?,
            resize_requested: false,
        })
    }

    /// Requests a swapchain rebuild at the start of the next iteration.
    #[inline]
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    #[inline]
    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.slots.frame_number()
    }

    /// Slot the next iteration will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.slots.index()
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).copied()
    }

    /// Slots whose last submission may still be executing.
    pub fn submitted_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|&&state| state == SlotState::Submitted)
            .count()
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// A [`FrameError::Transient`] means the frame was dropped and the next
    /// call may proceed. A [`FrameError::Fatal`] should end the loop.
    pub fn run_iteration<B: FrameBackend>(
        &mut self,
        backend: &mut B,
    ) -> Result<FrameOutcome, FrameError> {
        if self.resize_requested {
            debug!("Resize requested, rebuilding before acquire");
            return Ok(if self.recreate(backend)? {
                FrameOutcome::Skipped
            } else {
                FrameOutcome::Deferred
            });
        }

        let slot = self.slots.index();

        backend.wait_for_slot(slot)?;
        *self.slots.current_mut() = SlotState::Idle;

        let image_index = match backend.acquire(slot)? {
            AcquireOutcome::Image(index) => index,
            AcquireOutcome::Recreate => {
                debug!("Swapchain out of date at acquire, skipping frame");
                self.resize_requested = true;
                self.recreate(backend)?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        if let Err(e) = self.record_and_submit(backend, slot, image_index) {
            return Err(self.abandon(backend, slot, e));
        }

        let presented = backend.present(slot, image_index);
        self.slots.advance();

        match presented {
            Ok(true) => self.resize_requested = true,
            Ok(false) => {}
            Err(e) => {
                // The image may never have been queued; rebuilding releases it.
                self.resize_requested = true;
                return Err(e);
            }
        }

        let recreated = self.resize_requested && self.recreate(backend)?;
        Ok(FrameOutcome::Presented {
            image_index,
            recreated,
        })
    }

    fn record_and_submit<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        slot: usize,
        image_index: u32,
    ) -> Result<(), FrameError> {
        backend.reset_slot(slot)?;
        *self.slots.current_mut() = SlotState::Recording;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        *self.slots.current_mut() = SlotState::Submitted;
        Ok(())
    }

    /// Restores `slot` after a failure before submission and schedules a
    /// rebuild, which also releases the acquired image.
    fn abandon<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        slot: usize,
        error: FrameError,
    ) -> FrameError {
        warn!("Abandoning frame on slot {}: {}", slot, error);
        *self.slots.current_mut() = SlotState::Idle;
        self.resize_requested = true;
        match backend.abandon(slot) {
            Ok(()) => error,
            Err(restore_error) => FrameError::Fatal(match restore_error {
                FrameError::Transient(e) | FrameError::Fatal(e) => e,
            }),
        }
    }

    /// Rebuilds through the backend, clearing the request on success.
    /// Returns false when the rebuild was deferred.
    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<bool, FrameError> {
        let done = backend.recreate()?;
        if done {
            self.resize_requested = false;
            for state in self.slots.iter_mut() {
                *state = SlotState::Idle;
            }
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use harness_rhi::RhiError;

    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
        Abandon(usize),
    }

    /// Records calls and models each slot's fence.
    struct MockBackend {
        calls: Vec<Call>,
        /// Per slot: true while the fence is unsignaled.
        pending: Vec<bool>,
        /// Per slot: the fence was waited on since the last submit.
        waited: Vec<bool>,
        acquire_results: VecDeque<AcquireOutcome>,
        present_results: VecDeque<bool>,
        next_image: u32,
        image_count: u32,
        framebuffer_has_area: bool,
        fail_record: bool,
        max_pending: usize,
    }

    impl MockBackend {
        fn new(slots: usize) -> Self {
            Self {
                calls: Vec::new(),
                pending: vec![false; slots],
                waited: vec![false; slots],
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                next_image: 0,
                image_count: 3,
                framebuffer_has_area: true,
                fail_record: false,
                max_pending: 0,
            }
        }

        fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| matches(c)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> Result<(), FrameError> {
            self.calls.push(Call::Wait(slot));
            // The GPU finishes whatever the slot had in flight.
            self.pending[slot] = false;
            self.waited[slot] = true;
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome, FrameError> {
            self.calls.push(Call::Acquire(slot));
            if let Some(outcome) = self.acquire_results.pop_front() {
                return Ok(outcome);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Image(index))
        }

        fn reset_slot(&mut self, slot: usize) -> Result<(), FrameError> {
            assert!(self.waited[slot], "slot {slot} reset before its fence wait");
            assert!(!self.pending[slot], "slot {slot} reset while in flight");
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError> {
            self.calls.push(Call::Record(slot, image_index));
            if self.fail_record {
                return Err(FrameError::Transient(RhiError::InvalidHandle(
                    "record failed".into(),
                )));
            }
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<(), FrameError> {
            self.calls.push(Call::Submit(slot));
            self.pending[slot] = true;
            self.waited[slot] = false;
            self.max_pending = self
                .max_pending
                .max(self.pending.iter().filter(|&&p| p).count());
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, FrameError> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self.present_results.pop_front().unwrap_or(false))
        }

        fn recreate(&mut self) -> Result<bool, FrameError> {
            if !self.framebuffer_has_area {
                return Ok(false);
            }
            self.calls.push(Call::Recreate);
            // Recreation waits for the device to go idle.
            self.pending.iter_mut().for_each(|p| *p = false);
            Ok(true)
        }

        fn abandon(&mut self, slot: usize) -> Result<(), FrameError> {
            self.calls.push(Call::Abandon(slot));
            self.pending[slot] = false;
            Ok(())
        }
    }

    #[test]
    fn test_zero_frames_in_flight_is_rejected() {
        assert!(FramePipeline::new(0).is_none());
    }

    #[test]
    fn test_steady_state_call_order() {
        let mut pipeline = FramePipeline::new(2).unwrap();
        let mut backend = MockBackend::new(2);

        let outcome = pipeline.run_iteration(&mut backend).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                recreated: false
            }
        );
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(pipeline.current_slot(), 1);
        assert_eq!(pipeline.frame_number(), 1);
        assert_eq!(pipeline.slot_state(0), Some(SlotState::Submitted));
    }

    #[test]
    fn test_fence_wait_precedes_every_reset() {
        let mut pipeline = FramePipeline::new(2).unwrap();
        let mut backend = MockBackend::new(2);

        for _ in 0..7 {
            pipeline.run_iteration(&mut backend).unwrap();
        }

        // The mock asserts on every reset; check the pairing explicitly too.
        for (i, call) in backend.calls.iter().enumerate() {
            if let Call::Reset(slot) = call {
                let last_wait = backend.calls[..i]
                    .iter()
                    .rposition(|c| *c == Call::Wait(*slot));
                let last_submit = backend.calls[..i]
                    .iter()
                    .rposition(|c| *c == Call::Submit(*slot));
                assert!(last_wait > last_submit, "reset of slot {slot} at {i}");
            }
        }
    }

    #[test]
    fn test_slots_cycle_and_submissions_are_bounded() {
        for frames in 1..=3 {
            let mut pipeline = FramePipeline::new(frames).unwrap();
            let mut backend = MockBackend::new(frames);

            for _ in 0..10 {
                pipeline.run_iteration(&mut backend).unwrap();
                assert!(pipeline.submitted_count() <= frames);
            }
            assert!(backend.max_pending <= frames);

            let submits: Vec<usize> = backend
                .calls
                .iter()
                .filter_map(|c| match c {
                    Call::Submit(slot) => Some(*slot),
                    _ => None,
                })
                .collect();
            let expected: Vec<usize> = (0..10).map(|i| i % frames).collect();
            assert_eq!(submits, expected);
        }
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame() {
        let mut pipeline = FramePipeline::new(2).unwrap();
        let mut backend = MockBackend::new(2);
        backend.acquire_results.push_back(AcquireOutcome::Recreate);

        let outcome = pipeline.run_iteration(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(
            backend.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]
        );
        assert_eq!(backend.count(|c| matches!(c, Call::Record(..))), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 0);
        assert!(!pipeline.resize_requested());

        // The same slot is used again, its fence untouched.
        assert_eq!(pipeline.current_slot(), 0);
        let outcome = pipeline.run_iteration(&mut backend).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    }

    #[test]
    fn test_suboptimal_present_recreates_after_advancing() {
        let mut pipeline = FramePipeline::new(2).unwrap();
        let mut backend = MockBackend::new(2);
        backend.present_results.push_back(true);

        let outcome = pipeline.run_iteration(&mut backend).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                recreated: true
            }
        );
        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
        assert_eq!(pipeline.current_slot(), 1);
        assert_eq!(pipeline.submitted_count(), 0);
    }

    #[test]
    fn test_resize_request_rebuilds_before_acquire() {
        let mut pipeline = FramePipeline::new(2).unwrap();
        let mut backend = MockBackend::new(2);

        pipeline.request_resize();
        let outcome = pipeline.run_iteration(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(backend.calls, vec![Call::Recreate]);
        assert!(!pipeline.resize_requested());
    }

    #[test]
    fn test_zero_area_defers_until_resized() {
        let mut pipeline = FramePipeline::new(2).unwrap();
        let mut backend = MockBackend::new(2);
        backend.framebuffer_has_area = false;

        pipeline.request_resize();
        for _ in 0..3 {
            assert_eq!(
                pipeline.run_iteration(&mut backend).unwrap(),
                FrameOutcome::Deferred
            );
        }
        assert!(backend.calls.is_empty());
        assert!(pipeline.resize_requested());

        backend.framebuffer_has_area = true;
        assert_eq!(
            pipeline.run_iteration(&mut backend).unwrap(),
            FrameOutcome::Skipped
        );
        assert!(matches!(
            pipeline.run_iteration(&mut backend).unwrap(),
            FrameOutcome::Presented { .. }
        ));
    }

    #[test]
    fn test_record_failure_abandons_slot() {
        let mut pipeline = FramePipeline::new(2).unwrap();
        let mut backend = MockBackend::new(2);
        backend.fail_record = true;

        let err = pipeline.run_iteration(&mut backend).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(backend.calls.last(), Some(&Call::Abandon(0)));
        assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 0);
        assert_eq!(pipeline.slot_state(0), Some(SlotState::Idle));
        assert!(pipeline.resize_requested());

        backend.fail_record = false;
        assert_eq!(
            pipeline.run_iteration(&mut backend).unwrap(),
            FrameOutcome::Skipped
        );
        assert!(matches!(
            pipeline.run_iteration(&mut backend).unwrap(),
            FrameOutcome::Presented { .. }
        ));
    }
}
