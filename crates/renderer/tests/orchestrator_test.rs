//! Integration tests for the frame orchestrator.
//!
//! A recording backend stands in for Vulkan. It drives the real swapchain
//! bookkeeping (`FrameSchedule`) so the fence and counter behavior is
//! checked against the production types, and it tracks which command
//! buffers are still pending on the GPU.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use vkframe_renderer::{FrameBackend, FrameOrchestrator, FrameOutcome, FrameState, FrameWindow};
use vkframe_rhi::swapchain::{Acquired, SurfaceStatus};
use vkframe_rhi::sync::{FrameSchedule, MAX_FRAMES_IN_FLIGHT};
use vkframe_rhi::{RhiError, RhiResult, vk};

// ============================================================================
// Mock window
// ============================================================================

struct MockWindow {
    extent: vk::Extent2D,
    resized: bool,
    close_requested: bool,
}

impl MockWindow {
    fn new(width: u32, height: u32) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            resized: false,
            close_requested: false,
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
        self.resized = true;
    }
}

impl FrameWindow for MockWindow {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }
}

// ============================================================================
// Recording backend
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    WaitIdle,
    WaitSlotFence { slot: usize },
    Acquire { image: u32 },
    Record { cmd: u64, image: u32, extent: vk::Extent2D },
    WaitImageFence { image: u32, slot: usize },
    Submit { cmd: u64, image: u32, slot: usize },
    RecreateSwapchain { generation: u32, images: usize, extent: vk::Extent2D },
    DestroySwapchain { generation: u32 },
    CreatePipeline { generation: u32 },
    DestroyPipeline { generation: u32 },
    DestroyPipelineLayout,
    Allocate { count: usize },
    Free { count: usize },
}

enum ScriptedAcquire {
    OutOfDate,
    Suboptimal,
    DeviceLost,
}

#[derive(Default)]
struct Log {
    events: Vec<Event>,
    /// Image fence waits on an image that had not been submitted.
    uninitialized_fence_waits: usize,
    /// Release of a resource that was already gone.
    double_destroys: usize,
    /// Command buffers recorded while their last submission was unfinished.
    records_while_pending: usize,
}

impl Log {
    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events.iter().position(pred)
    }
}

struct MockBackend {
    log: Rc<RefCell<Log>>,

    // Swapchain
    generation: u32,
    swapchain_live: bool,
    images: usize,
    extent: vk::Extent2D,
    next_image: usize,
    schedule: FrameSchedule,
    submitted: HashSet<usize>,
    /// Submitted command buffers and the slot whose fence retires them.
    pending: HashMap<u64, usize>,

    // Pipeline
    pipeline: Option<u32>,
    layout_live: bool,

    // Command buffers
    next_cmd: u64,
    live_cmds: HashSet<u64>,

    // Scripting
    acquire_script: VecDeque<ScriptedAcquire>,
    /// Images handed out instead of round-robin order, taken modulo the count.
    image_script: VecDeque<u32>,
    present_script: VecDeque<SurfaceStatus>,
    /// Image count used by the next recreation, if it should change.
    next_image_count: Option<usize>,
}

impl MockBackend {
    fn new(images: usize, width: u32, height: u32) -> (Self, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let backend = Self {
            log: log.clone(),
            generation: 0,
            swapchain_live: true,
            images,
            extent: vk::Extent2D { width, height },
            next_image: 0,
            schedule: FrameSchedule::new(images),
            submitted: HashSet::new(),
            pending: HashMap::new(),
            pipeline: Some(0),
            layout_live: true,
            next_cmd: 1,
            live_cmds: HashSet::new(),
            acquire_script: VecDeque::new(),
            image_script: VecDeque::new(),
            present_script: VecDeque::new(),
            next_image_count: None,
        };
        (backend, log)
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().events.push(event);
    }

    /// Waits on `slot`'s fence: everything submitted on it has finished.
    fn wait_slot_fence(&mut self, slot: usize) {
        self.pending.retain(|_, pending_slot| *pending_slot != slot);
    }
}

impl FrameBackend for MockBackend {
    type CommandBuffer = u64;

    fn image_count(&self) -> usize {
        if self.swapchain_live { self.images } else { 0 }
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn acquire_next_image(&mut self) -> RhiResult<Acquired> {
        let slot = self.schedule.current_slot();
        self.wait_slot_fence(slot);
        self.push(Event::WaitSlotFence { slot });

        let scripted = self.acquire_script.pop_front();
        if let Some(ScriptedAcquire::OutOfDate) = scripted {
            return Ok(Acquired::OutOfDate);
        }
        if let Some(ScriptedAcquire::DeviceLost) = scripted {
            return Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST));
        }

        let image = match self.image_script.pop_front() {
            Some(image) => image % self.images as u32,
            None => {
                self.next_image += 1;
                ((self.next_image - 1) % self.images) as u32
            }
        };
        self.push(Event::Acquire { image });

        if let Some(slot) = self.schedule.image_wait_slot(image as usize) {
            if !self.submitted.contains(&(image as usize)) {
                self.log.borrow_mut().uninitialized_fence_waits += 1;
            }
            self.wait_slot_fence(slot);
            self.push(Event::WaitImageFence { image, slot });
        }

        match scripted {
            Some(ScriptedAcquire::Suboptimal) => Ok(Acquired::Suboptimal(image)),
            _ => Ok(Acquired::Ready(image)),
        }
    }

    fn record_command_buffer(&mut self, cmd: u64, image_index: u32) -> RhiResult<()> {
        if self.pipeline != Some(self.generation) {
            return Err(RhiError::PipelineError(
                "pipeline does not match swapchain".to_string(),
            ));
        }
        assert!(self.live_cmds.contains(&cmd), "recording a freed command buffer");
        if self.pending.contains_key(&cmd) {
            self.log.borrow_mut().records_while_pending += 1;
        }
        self.push(Event::Record {
            cmd,
            image: image_index,
            extent: self.extent,
        });
        Ok(())
    }

    fn submit_command_buffers(&mut self, cmd: u64, image_index: u32) -> RhiResult<SurfaceStatus> {
        let image = image_index as usize;
        let submit = self.schedule.begin_submit(image).ok_or_else(|| {
            RhiError::SwapchainError(format!("image {} out of range", image_index))
        })?;
        if let Some(previous) = submit.previous {
            // Already retired at acquire
            assert!(
                !self.pending.values().any(|&slot| slot == previous),
                "image {} submitted before slot {} retired",
                image_index,
                previous
            );
        }

        self.submitted.insert(image);
        self.pending.insert(cmd, submit.slot);
        self.push(Event::Submit {
            cmd,
            image: image_index,
            slot: submit.slot,
        });
        self.schedule.finish_submit();

        Ok(self.present_script.pop_front().unwrap_or(SurfaceStatus::Ok))
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.push(Event::WaitIdle);
        Ok(())
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        let old_generation = self.generation;
        let had_previous = self.swapchain_live;

        self.generation += 1;
        if let Some(count) = self.next_image_count.take() {
            self.images = count;
        }
        self.extent = extent;
        self.next_image = 0;
        self.schedule = FrameSchedule::new(self.images);
        self.submitted.clear();
        // The orchestrator drained the device before recreating
        self.pending.clear();
        self.swapchain_live = true;

        self.push(Event::RecreateSwapchain {
            generation: self.generation,
            images: self.images,
            extent,
        });
        // Previous chain goes away only after the new one is built
        if had_previous {
            self.push(Event::DestroySwapchain {
                generation: old_generation,
            });
        }
        Ok(())
    }

    fn create_pipeline(&mut self) -> RhiResult<()> {
        assert!(self.swapchain_live, "pipeline built without a swapchain");
        assert!(self.layout_live, "pipeline built without a layout");
        self.pipeline = Some(self.generation);
        self.push(Event::CreatePipeline {
            generation: self.generation,
        });
        Ok(())
    }

    fn release_pipeline(&mut self) {
        if let Some(generation) = self.pipeline.take() {
            self.push(Event::DestroyPipeline { generation });
        }
    }

    fn release_swapchain(&mut self) {
        if self.swapchain_live {
            self.swapchain_live = false;
            self.push(Event::DestroySwapchain {
                generation: self.generation,
            });
        }
    }

    fn release_pipeline_layout(&mut self) {
        if self.layout_live {
            self.layout_live = false;
            self.push(Event::DestroyPipelineLayout);
        }
    }

    fn allocate_command_buffers(&mut self, count: usize) -> RhiResult<Vec<u64>> {
        let buffers: Vec<u64> = (0..count as u64).map(|i| self.next_cmd + i).collect();
        self.next_cmd += count as u64;
        self.live_cmds.extend(buffers.iter().copied());
        self.push(Event::Allocate { count });
        Ok(buffers)
    }

    fn free_command_buffers(&mut self, buffers: &[u64]) {
        for cmd in buffers {
            if !self.live_cmds.remove(cmd) {
                self.log.borrow_mut().double_destroys += 1;
            }
        }
        self.push(Event::Free {
            count: buffers.len(),
        });
    }
}

fn setup(images: usize, width: u32, height: u32) -> (FrameOrchestrator<MockBackend>, MockWindow, Rc<RefCell<Log>>) {
    let (backend, log) = MockBackend::new(images, width, height);
    let orchestrator = FrameOrchestrator::new(backend).expect("orchestrator");
    (orchestrator, MockWindow::new(width, height), log)
}

/// Checks that every re-recorded image waited on its fence after acquire.
fn assert_image_fence_precedes_record(log: &Log) {
    let mut submitted = HashSet::new();
    let mut acquired = None;
    let mut waited = false;
    for event in &log.events {
        match *event {
            Event::RecreateSwapchain { .. } => submitted.clear(),
            Event::Acquire { image } => {
                acquired = Some(image);
                waited = false;
            }
            Event::WaitImageFence { image, .. } => {
                assert_eq!(Some(image), acquired, "fence wait for an image not just acquired");
                waited = true;
            }
            Event::Record { image, .. } => {
                assert_eq!(Some(image), acquired);
                if submitted.contains(&image) {
                    assert!(waited, "image {} recorded before its fence wait", image);
                }
            }
            Event::Submit { image, .. } => {
                submitted.insert(image);
            }
            _ => {}
        }
    }
}

/// Small deterministic PRNG so the interleaving test is reproducible.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

// ============================================================================
// Steady state
// ============================================================================

#[test]
fn test_ten_frames_cycle_slots_and_images() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    assert_eq!(orchestrator.command_buffer_count(), 3);

    for _ in 0..10 {
        let outcome = orchestrator.draw_frame(&mut window).expect("frame");
        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(orchestrator.state(), FrameState::Presenting);
    }

    let log = log.borrow();
    let slots: Vec<usize> = log
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Submit { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);

    let mut acquired: HashMap<u32, usize> = HashMap::new();
    for event in &log.events {
        if let Event::Acquire { image } = event {
            *acquired.entry(*image).or_default() += 1;
        }
    }
    assert_eq!(acquired.len(), 3);
    assert!(acquired.values().all(|&n| n >= 3));
    assert_eq!(log.uninitialized_fence_waits, 0);
}

#[test]
fn test_each_frame_advances_counter_by_one() {
    let (mut orchestrator, mut window, _log) = setup(3, 800, 600);

    for _ in 0..7 {
        let before = orchestrator.backend().schedule.current_slot();
        orchestrator.draw_frame(&mut window).expect("frame");
        let after = orchestrator.backend().schedule.current_slot();
        assert_eq!(after, (before + 1) % MAX_FRAMES_IN_FLIGHT);
    }
}

#[test]
fn test_command_buffer_matches_image_index() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);

    for _ in 0..6 {
        orchestrator.draw_frame(&mut window).expect("frame");
    }

    let log = log.borrow();
    let mut cmd_for_image: HashMap<u32, u64> = HashMap::new();
    for event in &log.events {
        if let Event::Record { cmd, image, .. } = event {
            let first = *cmd_for_image.entry(*image).or_insert(*cmd);
            assert_eq!(first, *cmd, "image {} recorded into two buffers", image);
        }
    }
    assert_eq!(cmd_for_image.len(), 3);
}

#[test]
fn test_reacquired_image_waits_before_recording() {
    // Three images over two slots: each image comes back on the other slot
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    for _ in 0..12 {
        orchestrator.draw_frame(&mut window).expect("frame");
    }

    let log = log.borrow();
    assert_eq!(log.records_while_pending, 0);
    assert!(log.count(|e| matches!(e, Event::WaitImageFence { .. })) >= 9);
    assert_image_fence_precedes_record(&log);
}

#[test]
fn test_same_image_twice_in_a_row_waits_on_other_slot() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator.backend_mut().image_script.extend([2, 2, 2]);
    for _ in 0..3 {
        orchestrator.draw_frame(&mut window).expect("frame");
    }

    let log = log.borrow();
    let waits: Vec<(u32, usize)> = log
        .events
        .iter()
        .filter_map(|e| match *e {
            Event::WaitImageFence { image, slot } => Some((image, slot)),
            _ => None,
        })
        .collect();
    assert_eq!(waits, vec![(2, 0), (2, 1)]);
    assert_eq!(log.records_while_pending, 0);
}

#[test]
fn test_close_requested_skips_frame() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator.draw_frame(&mut window).expect("frame");

    window.close_requested = true;
    window.resize(400, 300);
    let before = log.borrow().events.len();
    let outcome = orchestrator.draw_frame(&mut window).expect("frame");
    assert_eq!(outcome, FrameOutcome::Skipped);
    assert_eq!(orchestrator.state(), FrameState::Idle);
    assert_eq!(log.borrow().events.len(), before);
}

#[test]
fn test_zero_extent_skips_frame() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    window.resize(0, 0);

    let outcome = orchestrator.draw_frame(&mut window).expect("frame");
    assert_eq!(outcome, FrameOutcome::Skipped);
    assert_eq!(orchestrator.state(), FrameState::Idle);
    // Flag stays set so recreation happens once the window is visible again
    assert!(window.was_resized());

    let log = log.borrow();
    assert_eq!(log.count(|e| matches!(e, Event::Acquire { .. })), 0);
    assert_eq!(log.count(|e| matches!(e, Event::RecreateSwapchain { .. })), 0);
}

// ============================================================================
// Recreation triggers
// ============================================================================

#[test]
fn test_resize_recreates_with_new_extent() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);

    for _ in 0..3 {
        orchestrator.draw_frame(&mut window).expect("frame");
    }

    window.resize(400, 300);
    let outcome = orchestrator.draw_frame(&mut window).expect("frame");
    assert_eq!(outcome, FrameOutcome::Recreated);
    assert!(!window.was_resized());
    assert_eq!(
        orchestrator.backend().extent(),
        vk::Extent2D {
            width: 400,
            height: 300
        }
    );

    let outcome = orchestrator.draw_frame(&mut window).expect("frame");
    assert_eq!(outcome, FrameOutcome::Presented);

    let log = log.borrow();
    let last_record_extent = log
        .events
        .iter()
        .rev()
        .find_map(|e| match e {
            Event::Record { extent, .. } => Some(*extent),
            _ => None,
        })
        .expect("a recorded frame");
    assert_eq!(
        last_record_extent,
        vk::Extent2D {
            width: 400,
            height: 300
        }
    );
}

#[test]
fn test_recreation_order() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    window.resize(1024, 768);
    orchestrator.draw_frame(&mut window).expect("frame");

    let log = log.borrow();
    let idle = log.position(|e| *e == Event::WaitIdle).expect("idle");
    let destroy_pipeline = log
        .position(|e| *e == Event::DestroyPipeline { generation: 0 })
        .expect("pipeline released");
    let recreate = log
        .position(|e| matches!(e, Event::RecreateSwapchain { generation: 1, .. }))
        .expect("swapchain rebuilt");
    let destroy_old = log
        .position(|e| *e == Event::DestroySwapchain { generation: 0 })
        .expect("old swapchain released");
    let create_pipeline = log
        .position(|e| *e == Event::CreatePipeline { generation: 1 })
        .expect("pipeline rebuilt");

    assert!(idle < destroy_pipeline);
    assert!(destroy_pipeline < recreate);
    assert!(recreate < destroy_old);
    assert!(destroy_old < create_pipeline);
}

#[test]
fn test_out_of_date_acquire_recreates_without_recording() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator
        .backend_mut()
        .acquire_script
        .push_back(ScriptedAcquire::OutOfDate);

    let outcome = orchestrator.draw_frame(&mut window).expect("frame");
    assert_eq!(outcome, FrameOutcome::Recreated);
    assert_eq!(orchestrator.state(), FrameState::Idle);
    {
        let log = log.borrow();
        assert_eq!(log.count(|e| matches!(e, Event::Record { .. })), 0);
        assert_eq!(log.count(|e| matches!(e, Event::Submit { .. })), 0);
        assert_eq!(log.count(|e| matches!(e, Event::RecreateSwapchain { .. })), 1);
    }

    let outcome = orchestrator.draw_frame(&mut window).expect("frame");
    assert_eq!(outcome, FrameOutcome::Presented);
}

#[test]
fn test_suboptimal_acquire_still_presents() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator
        .backend_mut()
        .acquire_script
        .push_back(ScriptedAcquire::Suboptimal);

    let outcome = orchestrator.draw_frame(&mut window).expect("frame");
    assert_eq!(outcome, FrameOutcome::Presented);

    let log = log.borrow();
    assert_eq!(log.count(|e| matches!(e, Event::Submit { .. })), 1);
    assert_eq!(log.count(|e| matches!(e, Event::RecreateSwapchain { .. })), 0);
}

#[test]
fn test_stale_present_recreates_after_submit() {
    for status in [SurfaceStatus::Suboptimal, SurfaceStatus::OutOfDate] {
        let (mut orchestrator, mut window, log) = setup(3, 800, 600);
        orchestrator.backend_mut().present_script.push_back(status);

        let outcome = orchestrator.draw_frame(&mut window).expect("frame");
        assert_eq!(outcome, FrameOutcome::Recreated);

        let log = log.borrow();
        let submit = log
            .position(|e| matches!(e, Event::Submit { .. }))
            .expect("submitted");
        let recreate = log
            .position(|e| matches!(e, Event::RecreateSwapchain { .. }))
            .expect("recreated");
        assert!(submit < recreate, "{:?}: recreation must follow the present", status);
    }
}

// ============================================================================
// Command buffer reallocation
// ============================================================================

#[test]
fn test_same_image_count_keeps_command_buffers() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator.draw_frame(&mut window).expect("frame");

    window.resize(640, 480);
    orchestrator.draw_frame(&mut window).expect("frame");

    let log = log.borrow();
    assert_eq!(log.count(|e| matches!(e, Event::Allocate { .. })), 1);
    assert_eq!(log.count(|e| matches!(e, Event::Free { .. })), 0);
    assert_eq!(orchestrator.command_buffer_count(), 3);
}

#[test]
fn test_changed_image_count_reallocates_exactly() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator.draw_frame(&mut window).expect("frame");

    orchestrator.backend_mut().next_image_count = Some(4);
    window.resize(640, 480);
    orchestrator.draw_frame(&mut window).expect("frame");

    assert_eq!(orchestrator.command_buffer_count(), 4);
    {
        let log = log.borrow();
        assert!(log.events.contains(&Event::Free { count: 3 }));
        assert!(log.events.contains(&Event::Allocate { count: 4 }));
        assert_eq!(log.double_destroys, 0);
    }
    assert_eq!(orchestrator.backend().live_cmds.len(), 4);

    // Every image of the new chain has a buffer to record into
    for _ in 0..8 {
        assert_eq!(
            orchestrator.draw_frame(&mut window).expect("frame"),
            FrameOutcome::Presented
        );
    }
}

#[test]
fn test_explicit_recreate_ignores_zero_extent() {
    let (mut orchestrator, _window, log) = setup(3, 800, 600);
    orchestrator
        .recreate(vk::Extent2D {
            width: 0,
            height: 600,
        })
        .expect("recreate");

    assert!(log.borrow().events.iter().all(|e| matches!(e, Event::Allocate { .. })));
}

// ============================================================================
// Fence bookkeeping under resizes
// ============================================================================

#[test]
fn test_resize_interleaving_keeps_fence_waits_ordered() {
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);

    for _ in 0..20 {
        let (mut orchestrator, mut window, log) = setup(3, 800, 600);

        for _ in 0..60 {
            match rng.next() % 10 {
                0 => {
                    let width = 100 + (rng.next() % 1000) as u32;
                    let height = 100 + (rng.next() % 1000) as u32;
                    orchestrator.backend_mut().next_image_count =
                        Some(2 + (rng.next() % 3) as usize);
                    window.resize(width, height);
                }
                1 => orchestrator
                    .backend_mut()
                    .acquire_script
                    .push_back(ScriptedAcquire::OutOfDate),
                2 => orchestrator
                    .backend_mut()
                    .present_script
                    .push_back(SurfaceStatus::Suboptimal),
                3 | 4 => {
                    let image = (rng.next() % 4) as u32;
                    orchestrator.backend_mut().image_script.push_back(image);
                }
                _ => {}
            }
            orchestrator.draw_frame(&mut window).expect("frame");
            assert_eq!(
                orchestrator.command_buffer_count(),
                orchestrator.backend().image_count()
            );
        }

        let log = log.borrow();
        assert_eq!(log.uninitialized_fence_waits, 0);
        assert_eq!(log.double_destroys, 0);
        assert_eq!(log.records_while_pending, 0);
        assert_image_fence_precedes_record(&log);
    }
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_close_drains_then_releases_in_order() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator.draw_frame(&mut window).expect("frame");

    window.close_requested = true;
    assert!(window.should_close());
    let start = log.borrow().events.len();
    orchestrator.shutdown().expect("shutdown");

    let log = log.borrow();
    assert_eq!(
        log.events[start..].to_vec(),
        vec![
            Event::WaitIdle,
            Event::Free { count: 3 },
            Event::DestroyPipeline { generation: 0 },
            Event::DestroySwapchain { generation: 0 },
            Event::DestroyPipelineLayout,
        ]
    );
}

#[test]
fn test_shutdown_is_idempotent_and_runs_on_drop_once() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator.draw_frame(&mut window).expect("frame");

    orchestrator.shutdown().expect("shutdown");
    orchestrator.shutdown().expect("second shutdown");
    assert!(orchestrator.is_shut_down());
    let after_shutdown = log.borrow().events.len();

    drop(orchestrator);

    let log = log.borrow();
    assert_eq!(log.events.len(), after_shutdown);
    assert_eq!(log.count(|e| *e == Event::DestroyPipelineLayout), 1);
    assert_eq!(log.double_destroys, 0);
}

#[test]
fn test_drop_without_shutdown_releases_everything() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator.draw_frame(&mut window).expect("frame");
    drop(orchestrator);

    let log = log.borrow();
    assert_eq!(log.count(|e| matches!(e, Event::DestroyPipeline { .. })), 1);
    assert_eq!(log.count(|e| matches!(e, Event::DestroySwapchain { .. })), 1);
    assert_eq!(log.count(|e| *e == Event::DestroyPipelineLayout), 1);
}

#[test]
fn test_every_swapchain_generation_released_once() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    for size in [640, 700, 900] {
        window.resize(size, size);
        orchestrator.draw_frame(&mut window).expect("frame");
        orchestrator.draw_frame(&mut window).expect("frame");
    }
    orchestrator.shutdown().expect("shutdown");

    let log = log.borrow();
    for generation in 0..=3 {
        assert_eq!(
            log.count(|e| *e == Event::DestroySwapchain { generation }),
            1,
            "generation {}",
            generation
        );
        assert_eq!(
            log.count(|e| *e == Event::DestroyPipeline { generation }),
            1,
            "pipeline generation {}",
            generation
        );
    }
}

#[test]
fn test_fatal_acquire_error_propagates_and_drop_cleans_up() {
    let (mut orchestrator, mut window, log) = setup(3, 800, 600);
    orchestrator
        .backend_mut()
        .acquire_script
        .push_back(ScriptedAcquire::DeviceLost);

    let err = orchestrator.draw_frame(&mut window).unwrap_err();
    assert!(matches!(
        err,
        RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
    ));

    drop(orchestrator);
    let log = log.borrow();
    assert_eq!(log.count(|e| *e == Event::DestroyPipelineLayout), 1);
}

#[test]
fn test_draw_after_shutdown_fails() {
    let (mut orchestrator, mut window, _log) = setup(3, 800, 600);
    orchestrator.shutdown().expect("shutdown");
    assert!(orchestrator.draw_frame(&mut window).is_err());
}
