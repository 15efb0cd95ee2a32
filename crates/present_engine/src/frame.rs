//! Frame pacing state machine
//!
//! [`FrameLoop`] drives one frame through wait, acquire, update, submit,
//! and present against a [`FrameContext`]. The loop owns the two index
//! spaces involved and never conflates them:
//!
//! - the *slot* cycles through the frames-in-flight synchronization
//!   objects and advances only when a frame's work was actually submitted
//! - the *image index* comes back from acquire and picks the per-image
//!   resources; the presentation engine may hand images out in any order
//!
//! Out-of-date results are ordinary outcomes here, not errors. When
//! acquire reports the swapchain stale the frame aborts before touching
//! the slot's fence, so the slot can be retried as-is after a rebuild.
//!
//! The [`FrameContext`] seam exists so this ordering logic can be driven
//! by a scripted fake in tests; `Renderer` supplies the Vulkan-backed
//! implementation.

use crate::error::VulkanResult;

/// What acquire reported for this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image is ready; render into the resources for `image_index`
    Ready {
        /// Which swapchain image was handed out
        image_index: u32,
    },
    /// The swapchain no longer matches the surface and must be rebuilt
    OutOfDate,
}

/// What presentation reported for this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    /// The image was queued for presentation
    Presented {
        /// The image presented but no longer matches the surface exactly
        suboptimal: bool,
    },
    /// The swapchain was rejected outright; the frame's work still ran
    OutOfDate,
}

/// Outcome of one pass through the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Work was submitted and a present was attempted
    Presented {
        /// Presentation reported the swapchain stale or suboptimal
        needs_rebuild: bool,
    },
    /// Acquire refused the swapchain; nothing was submitted this frame
    RebuildRequired,
}

/// Per-frame operations the loop sequences.
///
/// `slot` arguments index the frames-in-flight synchronization objects;
/// `image_index` arguments index swapchain images.
pub trait FrameContext {
    /// Number of frame slots being cycled.
    ///
    /// Must be at least one; the loop advances the slot modulo this count.
    fn frames_in_flight(&self) -> usize;

    /// Block until the slot's previous submission has retired
    fn wait_for_fence(&mut self, slot: usize) -> VulkanResult<()>;

    /// Return the slot's fence to the unsignaled state.
    ///
    /// Called only once this frame is certain to submit; an aborted frame
    /// must leave the fence signaled or the next wait on this slot would
    /// never return.
    fn reset_fence(&mut self, slot: usize) -> VulkanResult<()>;

    /// Ask the presentation engine for the next image
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireResult>;

    /// Write this frame's data into the acquired image's resources
    fn update_frame_data(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Submit the image's command buffer, fencing on the slot
    fn submit_commands(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Queue the image for presentation
    fn present_image(&mut self, slot: usize, image_index: u32)
        -> VulkanResult<PresentResult>;
}

/// Cycles frame slots and sequences the per-frame operations
pub struct FrameLoop {
    current_frame: usize,
}

impl FrameLoop {
    /// Start the loop at slot zero
    pub fn new() -> Self {
        Self { current_frame: 0 }
    }

    /// Slot the next frame will use
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Run one frame.
    ///
    /// The slot advances only on [`FrameOutcome::Presented`]; an
    /// acquire-time abort leaves both the slot and its fence untouched so
    /// the same slot retries after the caller rebuilds the swapchain.
    pub fn advance<C: FrameContext>(&mut self, ctx: &mut C) -> VulkanResult<FrameOutcome> {
        let slot = self.current_frame;

        ctx.wait_for_fence(slot)?;

        let image_index = match ctx.acquire_image(slot)? {
            AcquireResult::Ready { image_index } => image_index,
            AcquireResult::OutOfDate => return Ok(FrameOutcome::RebuildRequired),
        };

        ctx.update_frame_data(image_index)?;

        // The frame is now committed to submitting, so unsignaling the
        // fence cannot strand the slot.
        ctx.reset_fence(slot)?;
        ctx.submit_commands(slot, image_index)?;

        let present = ctx.present_image(slot, image_index)?;

        self.current_frame = (slot + 1) % ctx.frames_in_flight();

        let needs_rebuild = matches!(
            present,
            PresentResult::OutOfDate | PresentResult::Presented { suboptimal: true }
        );
        Ok(FrameOutcome::Presented { needs_rebuild })
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Lifecycle of a scripted fence. `Pending` models a submission the
    /// GPU has not retired yet; waiting on it "completes" the work.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FenceState {
        Signaled,
        Unsignaled,
        Pending,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        WaitFence(usize),
        ResetFence(usize),
        Acquire(usize),
        Update(u32),
        Submit(usize, u32),
        Present(usize, u32),
    }

    /// Scripted [`FrameContext`] that records every call and enforces the
    /// fence protocol with panics, so an ordering bug fails the test at
    /// the exact operation that broke it.
    struct ScriptedContext {
        frames_in_flight: usize,
        fences: Vec<FenceState>,
        acquires: VecDeque<AcquireResult>,
        presents: VecDeque<PresentResult>,
        events: Vec<Event>,
        max_pending: usize,
    }

    impl ScriptedContext {
        fn new(frames_in_flight: usize) -> Self {
            Self {
                frames_in_flight,
                fences: vec![FenceState::Signaled; frames_in_flight],
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                events: Vec::new(),
                max_pending: 0,
            }
        }

        fn script_acquire(&mut self, result: AcquireResult) {
            self.acquires.push_back(result);
        }

        fn script_present(&mut self, result: PresentResult) {
            self.presents.push_back(result);
        }

        fn pending_count(&self) -> usize {
            self.fences
                .iter()
                .filter(|f| **f == FenceState::Pending)
                .count()
        }
    }

    impl FrameContext for ScriptedContext {
        fn frames_in_flight(&self) -> usize {
            self.frames_in_flight
        }

        fn wait_for_fence(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(Event::WaitFence(slot));
            match self.fences[slot] {
                FenceState::Pending => self.fences[slot] = FenceState::Signaled,
                FenceState::Signaled => {}
                FenceState::Unsignaled => {
                    panic!("slot {slot}: waiting on a fence nothing will signal")
                }
            }
            Ok(())
        }

        fn reset_fence(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(Event::ResetFence(slot));
            assert_eq!(
                self.fences[slot],
                FenceState::Signaled,
                "slot {slot}: fence reset while not signaled"
            );
            self.fences[slot] = FenceState::Unsignaled;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireResult> {
            self.events.push(Event::Acquire(slot));
            Ok(self
                .acquires
                .pop_front()
                .unwrap_or_else(|| panic!("acquire script exhausted at slot {slot}")))
        }

        fn update_frame_data(&mut self, image_index: u32) -> VulkanResult<()> {
            self.events.push(Event::Update(image_index));
            Ok(())
        }

        fn submit_commands(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.events.push(Event::Submit(slot, image_index));
            assert_eq!(
                self.fences[slot],
                FenceState::Unsignaled,
                "slot {slot}: submitted without resetting the fence"
            );
            self.fences[slot] = FenceState::Pending;
            self.max_pending = self.max_pending.max(self.pending_count());
            Ok(())
        }

        fn present_image(
            &mut self,
            slot: usize,
            image_index: u32,
        ) -> VulkanResult<PresentResult> {
            self.events.push(Event::Present(slot, image_index));
            Ok(self
                .presents
                .pop_front()
                .unwrap_or(PresentResult::Presented { suboptimal: false }))
        }
    }

    #[test]
    fn frame_order_within_one_frame() {
        let mut ctx = ScriptedContext::new(2);
        ctx.script_acquire(AcquireResult::Ready { image_index: 2 });

        let mut frames = FrameLoop::new();
        let outcome = frames.advance(&mut ctx).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                needs_rebuild: false
            }
        );
        assert_eq!(
            ctx.events,
            vec![
                Event::WaitFence(0),
                Event::Acquire(0),
                Event::Update(2),
                Event::ResetFence(0),
                Event::Submit(0, 2),
                Event::Present(0, 2),
            ]
        );
    }

    #[test]
    fn at_most_frames_in_flight_submissions_outstanding() {
        let mut ctx = ScriptedContext::new(2);
        for i in 0..6 {
            ctx.script_acquire(AcquireResult::Ready {
                image_index: i % 3,
            });
        }

        let mut frames = FrameLoop::new();
        for _ in 0..6 {
            let outcome = frames.advance(&mut ctx).unwrap();
            assert_eq!(
                outcome,
                FrameOutcome::Presented {
                    needs_rebuild: false
                }
            );
        }

        // The wait at the top of each frame caps outstanding work at the
        // slot count. The fence protocol asserts inside the context would
        // have panicked on any ordering violation.
        assert_eq!(ctx.max_pending, 2);
    }

    #[test]
    fn image_indices_flow_through_out_of_order() {
        let mut ctx = ScriptedContext::new(2);
        for image in [2u32, 0, 1] {
            ctx.script_acquire(AcquireResult::Ready { image_index: image });
        }

        let mut frames = FrameLoop::new();
        for _ in 0..3 {
            frames.advance(&mut ctx).unwrap();
        }

        let submits: Vec<Event> = ctx
            .events
            .iter()
            .copied()
            .filter(|e| matches!(e, Event::Submit(..)))
            .collect();
        assert_eq!(
            submits,
            vec![Event::Submit(0, 2), Event::Submit(1, 0), Event::Submit(0, 1)]
        );
    }

    #[test]
    fn out_of_date_acquire_aborts_without_touching_the_slot() {
        let mut ctx = ScriptedContext::new(2);
        for image in [0u32, 1, 0, 1] {
            ctx.script_acquire(AcquireResult::Ready { image_index: image });
        }
        ctx.script_acquire(AcquireResult::OutOfDate);
        ctx.script_acquire(AcquireResult::Ready { image_index: 0 });

        let mut frames = FrameLoop::new();
        for _ in 0..4 {
            frames.advance(&mut ctx).unwrap();
        }
        assert_eq!(frames.current_frame(), 0);

        let before_abort = ctx.events.len();
        let outcome = frames.advance(&mut ctx).unwrap();
        assert_eq!(outcome, FrameOutcome::RebuildRequired);

        // The aborted frame waited and acquired, nothing else.
        assert_eq!(
            &ctx.events[before_abort..],
            &[Event::WaitFence(0), Event::Acquire(0)]
        );
        assert_eq!(frames.current_frame(), 0);
        assert_eq!(ctx.fences[0], FenceState::Signaled);

        // After a rebuild the same slot runs a full frame.
        let outcome = frames.advance(&mut ctx).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                needs_rebuild: false
            }
        );
        assert_eq!(frames.current_frame(), 1);
    }

    #[test]
    fn fence_stays_signaled_when_first_acquire_fails() {
        let mut ctx = ScriptedContext::new(2);
        ctx.script_acquire(AcquireResult::OutOfDate);

        let mut frames = FrameLoop::new();
        let outcome = frames.advance(&mut ctx).unwrap();

        assert_eq!(outcome, FrameOutcome::RebuildRequired);
        assert_eq!(ctx.events, vec![Event::WaitFence(0), Event::Acquire(0)]);
        assert_eq!(ctx.fences[0], FenceState::Signaled);
    }

    #[test]
    fn out_of_date_present_still_advances_the_slot() {
        let mut ctx = ScriptedContext::new(2);
        ctx.script_acquire(AcquireResult::Ready { image_index: 0 });
        ctx.script_present(PresentResult::OutOfDate);

        let mut frames = FrameLoop::new();
        let outcome = frames.advance(&mut ctx).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented { needs_rebuild: true }
        );
        // The work was submitted, so the slot moves on even though the
        // present was rejected.
        assert_eq!(frames.current_frame(), 1);
        assert!(ctx.events.contains(&Event::Submit(0, 0)));
        assert!(ctx.events.contains(&Event::Present(0, 0)));
    }

    #[test]
    fn suboptimal_present_requests_rebuild() {
        let mut ctx = ScriptedContext::new(2);
        ctx.script_acquire(AcquireResult::Ready { image_index: 0 });
        ctx.script_present(PresentResult::Presented { suboptimal: true });

        let mut frames = FrameLoop::new();
        let outcome = frames.advance(&mut ctx).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented { needs_rebuild: true }
        );
        assert_eq!(frames.current_frame(), 1);
    }

    #[test]
    fn slots_cycle_modulo_frames_in_flight() {
        let mut ctx = ScriptedContext::new(3);
        for i in 0..7 {
            ctx.script_acquire(AcquireResult::Ready { image_index: i });
        }

        let mut frames = FrameLoop::new();
        for _ in 0..7 {
            frames.advance(&mut ctx).unwrap();
        }

        let waited: Vec<usize> = ctx
            .events
            .iter()
            .filter_map(|e| match e {
                Event::WaitFence(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(waited, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
