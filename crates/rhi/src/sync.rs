//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for Vulkan synchronization objects and the
//! bookkeeping the swapchain uses to schedule them:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//! - [`FrameSync`] - The semaphore/semaphore/fence set for one frame in flight
//! - [`FrameCounter`] - Which frame-in-flight slot the next frame uses
//! - [`ImageFenceTracker`] - Which slot's fence last guarded each swapchain image
//!
//! # Overview
//!
//! The number of swapchain images and the number of frames in flight are
//! independent. Waiting on the current slot's fence only guarantees that the
//! slot's semaphores and fence are reusable; the acquired image may still be
//! the target of a submission made from a *different* slot. The
//! [`ImageFenceTracker`] records, per image, the slot whose fence covers the
//! last submission to that image so it can be waited on before reuse.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan semaphore wrapper.
///
/// Semaphores are used for GPU-to-GPU synchronization between queue operations:
/// - Image available semaphore: signaled when a swapchain image is ready
/// - Render finished semaphore: signaled when rendering is complete
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
///
/// Fences are used for GPU-to-CPU synchronization, allowing the host to wait
/// for a frame's submission to complete before reusing its resources.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state so the
    ///   first wait on it returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or the timeout (nanoseconds) expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait times out or the device is lost.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any queue operation when this is called.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Maximum number of frames that can be processed concurrently.
///
/// Using 2 allows the CPU to record the next frame while the GPU
/// renders the current one.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-frame synchronization primitives.
///
/// # Usage Pattern
///
/// ```text
/// 1. Wait for in_flight_fence (the slot's previous submission is done)
/// 2. Acquire swapchain image (signals image_available)
/// 3. Wait for the acquired image's tracked fence, if any
/// 4. Reset in_flight_fence
/// 5. Submit command buffer:
///    - Wait on image_available
///    - Signal render_finished
///    - Signal in_flight_fence on completion
/// 6. Present (waits on render_finished)
/// ```
pub struct FrameSync {
    /// Semaphore signaled when a swapchain image is available.
    image_available_semaphore: Semaphore,
    /// Semaphore signaled when rendering is complete.
    render_finished_semaphore: Semaphore,
    /// Fence used to wait for frame completion before reusing resources.
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates a new set of frame synchronization primitives.
    ///
    /// The in-flight fence is created in the signaled state so the first
    /// frame can proceed without waiting.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    /// Creates one [`FrameSync`] per frame-in-flight slot.
    pub fn for_frames_in_flight(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let frames = (0..count)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created synchronization for {} frames in flight", count);
        Ok(frames)
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }
}

/// Cycling index in `[0, frames_in_flight)` selecting the synchronization
/// slot for the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCounter {
    current: usize,
    frames_in_flight: usize,
}

impl FrameCounter {
    /// Creates a counter starting at slot 0. A zero slot count is treated as one.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            current: 0,
            frames_in_flight: frames_in_flight.max(1),
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Moves to the next slot, wrapping, and returns it.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.frames_in_flight;
        self.current
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(MAX_FRAMES_IN_FLIGHT)
    }
}

/// Per-swapchain-image reference to the frame slot whose fence guards the
/// image's most recent submission.
///
/// An entry is `None` until the image is first submitted, so a fence is never
/// waited on for an image that was never rendered to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFenceTracker {
    slots: Vec<Option<usize>>,
}

impl ImageFenceTracker {
    pub fn new(image_count: usize) -> Self {
        Self {
            slots: vec![None; image_count],
        }
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot whose fence must be waited on before `image_index` is reused.
    pub fn in_flight_slot(&self, image_index: usize) -> Option<usize> {
        self.slots.get(image_index).copied().flatten()
    }

    /// Records that `slot` now guards `image_index`, returning the previous slot.
    ///
    /// # Panics
    ///
    /// Panics if `image_index` is out of bounds.
    pub fn mark(&mut self, image_index: usize, slot: usize) -> Option<usize> {
        self.slots[image_index].replace(slot)
    }
}

/// Slot bookkeeping for one submission, produced by
/// [`FrameSchedule::begin_submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitSlots {
    /// Slot whose semaphores and fence this submission uses.
    pub slot: usize,
    /// Slot that guarded the image before this submission, if any.
    pub previous: Option<usize>,
}

/// Frame-slot and per-image fence bookkeeping for one swapchain.
///
/// The swapchain calls, per frame:
/// 1. [`current_slot`](Self::current_slot): wait on that slot's fence, then acquire
/// 2. [`image_wait_slot`](Self::image_wait_slot): wait on that fence before the
///    image's command buffer is re-recorded
/// 3. [`begin_submit`](Self::begin_submit): the image is now guarded by the current slot
/// 4. [`finish_submit`](Self::finish_submit): advance to the next slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSchedule {
    counter: FrameCounter,
    images: ImageFenceTracker,
}

impl FrameSchedule {
    /// Creates a schedule for `image_count` images and [`MAX_FRAMES_IN_FLIGHT`] slots.
    pub fn new(image_count: usize) -> Self {
        Self::with_frames_in_flight(image_count, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn with_frames_in_flight(image_count: usize, frames_in_flight: usize) -> Self {
        Self {
            counter: FrameCounter::new(frames_in_flight),
            images: ImageFenceTracker::new(image_count),
        }
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.counter.current()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.image_count()
    }

    /// Slot whose fence must signal before the command buffer of the freshly
    /// acquired `image_index` may be reset and recorded again.
    #[inline]
    pub fn image_wait_slot(&self, image_index: usize) -> Option<usize> {
        self.images.in_flight_slot(image_index)
    }

    /// Hands `image_index` to the current slot. Returns `None` for an index
    /// outside the chain, leaving the schedule untouched.
    pub fn begin_submit(&mut self, image_index: usize) -> Option<SubmitSlots> {
        if image_index >= self.images.image_count() {
            return None;
        }
        let slot = self.counter.current();
        let previous = self.images.mark(image_index, slot);
        Some(SubmitSlots { slot, previous })
    }

    /// Moves to the next slot once the submission was handed to the queue.
    pub fn finish_submit(&mut self) -> usize {
        self.counter.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 1);
        assert!(MAX_FRAMES_IN_FLIGHT <= 4);
    }

    #[test]
    fn test_semaphore_and_fence_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }

    #[test]
    fn test_frame_counter_cycles() {
        let mut counter = FrameCounter::new(2);
        let mut seen = vec![counter.current()];
        for _ in 0..5 {
            seen.push(counter.advance());
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_frame_counter_advances_by_exactly_one() {
        for frames in 1..=4 {
            let mut counter = FrameCounter::new(frames);
            for _ in 0..10 {
                let before = counter.current();
                let after = counter.advance();
                assert_eq!(after, (before + 1) % frames);
            }
        }
    }

    #[test]
    fn test_frame_counter_zero_is_one_slot() {
        let mut counter = FrameCounter::new(0);
        assert_eq!(counter.frames_in_flight(), 1);
        assert_eq!(counter.advance(), 0);
    }

    #[test]
    fn test_tracker_starts_empty() {
        let tracker = ImageFenceTracker::new(3);
        assert_eq!(tracker.image_count(), 3);
        assert!((0..3).all(|i| tracker.in_flight_slot(i).is_none()));
        assert!(tracker.in_flight_slot(7).is_none());
    }

    #[test]
    fn test_tracker_mark_replaces_previous_slot() {
        let mut tracker = ImageFenceTracker::new(3);
        assert_eq!(tracker.mark(1, 0), None);
        assert_eq!(tracker.in_flight_slot(1), Some(0));
        assert_eq!(tracker.mark(1, 1), Some(0));
        assert_eq!(tracker.in_flight_slot(1), Some(1));
        assert!(tracker.in_flight_slot(0).is_none());
    }

    #[test]
    fn test_schedule_hands_images_to_alternating_slots() {
        let mut schedule = FrameSchedule::new(3);
        let mut slots = Vec::new();
        for frame in 0..6 {
            let submit = schedule.begin_submit(frame % 3).expect("in range");
            slots.push(submit.slot);
            schedule.finish_submit();
        }
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_schedule_rejects_out_of_range_image() {
        let mut schedule = FrameSchedule::new(2);
        assert_eq!(schedule.begin_submit(2), None);
        assert_eq!(schedule.current_slot(), 0);
        assert!((0..2).all(|i| schedule.image_wait_slot(i).is_none()));
    }

    /// With three images and two slots, image `i` returns one frame after
    /// the other slot submitted it. The wait reported at acquire time must be
    /// that other slot, which the per-slot fence wait does not cover.
    #[test]
    fn test_reacquired_image_waits_on_slot_that_submitted_it() {
        let mut schedule = FrameSchedule::new(3);
        // Frame 0 on slot 0 renders image 2
        assert_eq!(schedule.begin_submit(2).map(|s| s.slot), Some(0));
        schedule.finish_submit();

        // Frame 1 on slot 1 acquires image 2 again
        assert_eq!(schedule.current_slot(), 1);
        assert_eq!(schedule.image_wait_slot(2), Some(0));

        let submit = schedule.begin_submit(2).expect("in range");
        assert_eq!(submit, SubmitSlots { slot: 1, previous: Some(0) });
        schedule.finish_submit();
        assert_eq!(schedule.image_wait_slot(2), Some(1));
    }

    /// Replays random acquire orders through a schedule that is rebuilt on
    /// resize, tracking which slot each image's command buffer is pending on.
    /// Waiting on the reported slots before recording must leave no buffer
    /// pending when it is re-recorded.
    #[test]
    fn test_waits_cover_pending_command_buffers_across_resizes() {
        let mut seed: u32 = 0x2545_f491;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        let mut schedule = FrameSchedule::new(3);
        // Slot each image's command buffer was last submitted on, while pending
        let mut pending: Vec<Option<usize>> = vec![None; 3];

        for _ in 0..500 {
            if next() % 7 == 0 {
                // Recreation drains the device first
                let image_count = 2 + (next() % 3) as usize;
                schedule = FrameSchedule::new(image_count);
                pending = vec![None; image_count];
                continue;
            }

            let retire = |pending: &mut [Option<usize>], slot: usize| {
                for entry in pending.iter_mut() {
                    if *entry == Some(slot) {
                        *entry = None;
                    }
                }
            };

            retire(&mut pending, schedule.current_slot());
            let image = next() as usize % schedule.image_count();
            if let Some(slot) = schedule.image_wait_slot(image) {
                retire(&mut pending, slot);
            }
            assert_eq!(pending[image], None, "image {} re-recorded while pending", image);

            let submit = schedule.begin_submit(image).expect("in range");
            pending[image] = Some(submit.slot);
            schedule.finish_submit();
        }
    }
}
