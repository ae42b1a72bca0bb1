//! Frame orchestration.
//!
//! [`FrameOrchestrator`] drives one frame per [`FrameOrchestrator::draw_frame`]
//! call: acquire, record, submit and present, recreating the swapchain and
//! pipeline when the surface goes stale or the window is resized.
//!
//! The GPU side sits behind [`FrameBackend`] and the window behind
//! [`FrameWindow`], so the state machine itself never touches Vulkan.
//!
//! # Frame States
//!
//! ```text
//!            acquire Ok/Suboptimal          submitted
//!   Idle ---------------------------> Recording ----------> Presenting
//!    ^  \                                                    |    |
//!    |   `-- acquire OutOfDate: recreate                     |    |
//!    |                                                       |    |
//!    `------ present OutOfDate/Suboptimal or resize: recreate'    |
//!    `------ next frame ------------------------------------------'
//! ```

use ash::vk;
use tracing::{debug, error, info};

use vkframe_platform::Window;
use vkframe_rhi::swapchain::{Acquired, SurfaceStatus};
use vkframe_rhi::{RhiError, RhiResult};

/// Where the orchestrator is within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// No command buffer is being recorded.
    Idle,
    /// A command buffer is being built for an acquired image.
    Recording,
    /// The last frame was submitted and presented.
    Presenting,
}

/// Result of one [`FrameOrchestrator::draw_frame`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented.
    Presented,
    /// The swapchain and pipeline were rebuilt. A frame may or may not have
    /// been presented before the rebuild.
    Recreated,
    /// The window is minimized or closing; nothing was done.
    Skipped,
}

/// Window state polled by the orchestrator.
pub trait FrameWindow {
    fn extent(&self) -> vk::Extent2D;
    fn should_close(&self) -> bool;
    fn was_resized(&self) -> bool;
    fn reset_resized_flag(&mut self);
}

impl FrameWindow for Window {
    fn extent(&self) -> vk::Extent2D {
        Window::extent(self)
    }

    fn should_close(&self) -> bool {
        Window::should_close(self)
    }

    fn was_resized(&self) -> bool {
        Window::was_resized(self)
    }

    fn reset_resized_flag(&mut self) {
        Window::reset_resized_flag(self)
    }
}

/// GPU operations the orchestrator sequences.
///
/// The backend owns the swapchain, the pipeline and the pipeline layout. The
/// orchestrator owns the command buffers and decides when each resource is
/// rebuilt or released. The `release_*` methods must tolerate being called
/// for a resource that is already gone.
pub trait FrameBackend {
    type CommandBuffer: Copy;

    /// Number of images in the live swapchain.
    fn image_count(&self) -> usize;
    /// Extent of the live swapchain.
    fn extent(&self) -> vk::Extent2D;

    fn acquire_next_image(&mut self) -> RhiResult<Acquired>;
    fn record_command_buffer(&mut self, cmd: Self::CommandBuffer, image_index: u32)
    -> RhiResult<()>;
    fn submit_command_buffers(
        &mut self,
        cmd: Self::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus>;

    /// Blocks until the device has no queued work.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Builds a new swapchain for `extent`, handing the live one over as the
    /// previous chain.
    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()>;
    /// Builds the pipeline against the live swapchain's render pass.
    fn create_pipeline(&mut self) -> RhiResult<()>;

    fn release_pipeline(&mut self);
    fn release_swapchain(&mut self);
    fn release_pipeline_layout(&mut self);

    fn allocate_command_buffers(&mut self, count: usize) -> RhiResult<Vec<Self::CommandBuffer>>;
    fn free_command_buffers(&mut self, buffers: &[Self::CommandBuffer]);
}

/// Drives the acquire, record, submit and present loop.
///
/// All work happens on the calling thread. Recreation and shutdown both
/// start with a full device idle.
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    /// One per swapchain image, indexed by image index.
    command_buffers: Vec<B::CommandBuffer>,
    state: FrameState,
    shut_down: bool,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    /// Takes ownership of a fully built backend and allocates one command
    /// buffer per swapchain image.
    ///
    /// # Errors
    ///
    /// Returns an error if command buffer allocation fails.
    pub fn new(mut backend: B) -> RhiResult<Self> {
        let count = backend.image_count();
        let command_buffers = backend.allocate_command_buffers(count)?;

        info!(
            "Frame orchestrator ready: {} command buffer(s), extent {}x{}",
            command_buffers.len(),
            backend.extent().width,
            backend.extent().height
        );

        Ok(Self {
            backend,
            command_buffers,
            state: FrameState::Idle,
            shut_down: false,
        })
    }

    /// Renders one frame.
    ///
    /// Surface staleness and resizes are absorbed here and reported as
    /// [`FrameOutcome::Recreated`]; only fatal conditions return `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if any backend operation fails or the orchestrator
    /// has already been shut down.
    pub fn draw_frame<W: FrameWindow>(&mut self, window: &mut W) -> RhiResult<FrameOutcome> {
        if self.shut_down {
            return Err(RhiError::InvalidHandle(
                "Frame orchestrator has been shut down".to_string(),
            ));
        }

        self.state = FrameState::Idle;

        if window.should_close() {
            debug!("Close requested, not starting a frame");
            return Ok(FrameOutcome::Skipped);
        }

        let extent = window.extent();
        if extent.width == 0 || extent.height == 0 {
            return Ok(FrameOutcome::Skipped);
        }

        if window.was_resized() {
            debug!("Resize pending, recreating before acquire");
            self.recreate_for(window)?;
            return Ok(FrameOutcome::Recreated);
        }

        let image_index = match self.backend.acquire_next_image()? {
            Acquired::Ready(index) => index,
            Acquired::Suboptimal(index) => {
                debug!("Acquired image {} from a suboptimal swapchain", index);
                index
            }
            Acquired::OutOfDate => {
                debug!("Swapchain out of date on acquire");
                self.recreate_for(window)?;
                return Ok(FrameOutcome::Recreated);
            }
        };

        let cmd = *self
            .command_buffers
            .get(image_index as usize)
            .ok_or_else(|| {
                RhiError::CommandBufferError(format!(
                    "No command buffer for image {} ({} allocated)",
                    image_index,
                    self.command_buffers.len()
                ))
            })?;

        self.state = FrameState::Recording;
        self.backend.record_command_buffer(cmd, image_index)?;

        let status = self.backend.submit_command_buffers(cmd, image_index)?;
        self.state = FrameState::Presenting;

        if status.needs_recreation() || window.was_resized() {
            debug!("Recreating after present (status: {:?})", status);
            self.recreate_for(window)?;
            return Ok(FrameOutcome::Recreated);
        }

        Ok(FrameOutcome::Presented)
    }

    fn recreate_for<W: FrameWindow>(&mut self, window: &mut W) -> RhiResult<()> {
        self.recreate(window.extent())?;
        window.reset_resized_flag();
        Ok(())
    }

    /// Rebuilds the swapchain and pipeline for `extent`.
    ///
    /// Waits for the device to go idle, releases the pipeline, rebuilds the
    /// swapchain from the live one and builds a new pipeline against its
    /// render pass. Command buffers are reallocated only when the image
    /// count changed. A zero-sized extent is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. Resources released before the
    /// failure stay released.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        if extent.width == 0 || extent.height == 0 {
            debug!("Ignoring recreation for zero extent");
            return Ok(());
        }

        let old_extent = self.backend.extent();
        let old_count = self.command_buffers.len();

        self.backend.wait_idle()?;
        self.state = FrameState::Idle;

        self.backend.release_pipeline();
        self.backend.recreate_swapchain(extent)?;
        self.backend.create_pipeline()?;

        let new_count = self.backend.image_count();
        if new_count != old_count {
            let old = std::mem::take(&mut self.command_buffers);
            self.backend.free_command_buffers(&old);
            self.command_buffers = self.backend.allocate_command_buffers(new_count)?;
            debug!(
                "Reallocated command buffers: {} -> {}",
                old_count,
                self.command_buffers.len()
            );
        }

        let new_extent = self.backend.extent();
        info!(
            "Swapchain recreated: {}x{} -> {}x{}, {} -> {} image(s)",
            old_extent.width,
            old_extent.height,
            new_extent.width,
            new_extent.height,
            old_count,
            new_count
        );

        Ok(())
    }

    /// Drains the GPU and releases everything in reverse acquisition order:
    /// command buffers, pipeline, swapchain, pipeline layout.
    ///
    /// Runs at most once; later calls return `Ok(())`. Resources are released
    /// even when the idle wait fails, and that failure is returned afterwards.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.state = FrameState::Idle;

        let idle = self.backend.wait_idle();
        if let Err(e) = &idle {
            error!("Device wait idle failed during shutdown: {}", e);
        }

        let buffers = std::mem::take(&mut self.command_buffers);
        self.backend.free_command_buffers(&buffers);
        self.backend.release_pipeline();
        self.backend.release_swapchain();
        self.backend.release_pipeline_layout();

        info!("Frame orchestrator shut down");
        idle
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    #[inline]
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: FrameBackend> Drop for FrameOrchestrator<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Frame orchestrator shutdown failed: {}", e);
        }
    }
}
