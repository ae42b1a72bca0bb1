//! Vulkan implementation of [`FrameBackend`].
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order once [`Drop`] has waited for the device:
//! 1. Pipeline
//! 2. Model buffers
//! 3. Swapchain (framebuffers, render pass, depth images, sync objects)
//! 4. Pipeline layout
//! 5. Command pool
//! 6. Surface
//! 7. Device
//! 8. Instance

use std::sync::Arc;

use tracing::{debug, error, info};

use vkframe_core::AppConfig;
use vkframe_platform::{Surface, Window};
use vkframe_rhi::command::{CommandBuffer, CommandPool, clear_values, full_scissor, full_viewport};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use vkframe_rhi::shader::read_spirv_file;
use vkframe_rhi::swapchain::{Acquired, SurfaceStatus, Swapchain};
use vkframe_rhi::vertex::Vertex;
use vkframe_rhi::{RhiError, RhiResult, vk};

use crate::model::{MeshData, Model};
use crate::orchestrator::FrameBackend;

/// Depth value the depth attachment is cleared to.
const CLEAR_DEPTH: f32 = 1.0;

/// Owns every Vulkan object needed to draw the demo model.
pub struct VulkanBackend {
    // Field order is drop order
    pipeline: Option<Pipeline>,
    model: Model,
    swapchain: Option<Swapchain>,
    pipeline_layout: Option<PipelineLayout>,
    command_pool: CommandPool,
    surface: Surface,
    device: Arc<Device>,
    instance: Instance,

    vert_bytes: Vec<u8>,
    frag_bytes: Vec<u8>,
    clear_color: [f32; 4],
    vsync: bool,
}

impl VulkanBackend {
    /// Creates the instance, surface, device, swapchain, pipeline and model
    /// for `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; everything created before the
    /// failing step is released.
    pub fn new(window: &Window, config: &AppConfig) -> RhiResult<Self> {
        let extent = window.extent();
        info!(
            "Initializing Vulkan backend ({}x{})",
            extent.width, extent.height
        );

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::new(
            &config.window.title,
            &surface_extensions,
            config.renderer.validation_enabled(),
        )?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[], &[])?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            extent,
            config.renderer.vsync,
            None,
        )?;

        let model = Model::new(
            device.clone(),
            &MeshData::for_demo(config.renderer.mesh),
        )?;

        let vert_bytes = read_spirv_file(&config.shaders.vertex)?;
        let frag_bytes = read_spirv_file(&config.shaders.fragment)?;

        let mut backend = Self {
            pipeline: None,
            model,
            swapchain: Some(swapchain),
            pipeline_layout: Some(pipeline_layout),
            command_pool,
            surface,
            device,
            instance,
            vert_bytes,
            frag_bytes,
            clear_color: config.renderer.clear_color,
            vsync: config.renderer.vsync,
        };
        backend.create_pipeline()?;

        info!(
            "Vulkan backend initialized on '{}': {} swapchain image(s)",
            physical_device_info.device_name(),
            backend.image_count()
        );

        Ok(backend)
    }

    fn swapchain(&self) -> RhiResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("Swapchain has been released".to_string()))
    }

    fn swapchain_mut(&mut self) -> RhiResult<&mut Swapchain> {
        self.swapchain
            .as_mut()
            .ok_or_else(|| RhiError::SwapchainError("Swapchain has been released".to_string()))
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl FrameBackend for VulkanBackend {
    type CommandBuffer = vk::CommandBuffer;

    fn image_count(&self) -> usize {
        self.swapchain.as_ref().map_or(0, Swapchain::image_count)
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or(vk::Extent2D::default(), Swapchain::extent)
    }

    fn acquire_next_image(&mut self) -> RhiResult<Acquired> {
        self.swapchain_mut()?.acquire_next_image()
    }

    fn record_command_buffer(&mut self, cmd: vk::CommandBuffer, image_index: u32) -> RhiResult<()> {
        let swapchain = self.swapchain()?;
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| RhiError::PipelineError("Pipeline has been released".to_string()))?;

        if pipeline.render_pass() != swapchain.render_pass() {
            return Err(RhiError::PipelineError(
                "Pipeline was built against a different render pass than the live swapchain"
                    .to_string(),
            ));
        }

        let framebuffer = swapchain.framebuffer(image_index as usize).ok_or_else(|| {
            RhiError::SwapchainError(format!(
                "No framebuffer for image {} ({} images)",
                image_index,
                swapchain.image_count()
            ))
        })?;

        let extent = swapchain.extent();
        let clear = clear_values(self.clear_color, CLEAR_DEPTH, 0);
        let cmd = CommandBuffer::from_handle(self.device.clone(), cmd);

        cmd.begin()?;
        cmd.begin_render_pass(
            swapchain.render_pass(),
            framebuffer,
            full_scissor(extent),
            &clear,
        );
        cmd.set_viewport(&full_viewport(extent));
        cmd.set_scissor(&full_scissor(extent));
        pipeline.bind(&cmd);
        self.model.bind(&cmd);
        self.model.draw(&cmd);
        cmd.end_render_pass();
        cmd.end()?;

        Ok(())
    }

    fn submit_command_buffers(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus> {
        self.swapchain_mut()?
            .submit_command_buffers(cmd, image_index)
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        let previous = self.swapchain.take();
        let swapchain = Swapchain::new(
            &self.instance,
            self.device.clone(),
            self.surface.handle(),
            extent,
            self.vsync,
            previous,
        )?;
        self.swapchain = Some(swapchain);
        Ok(())
    }

    fn create_pipeline(&mut self) -> RhiResult<()> {
        let swapchain = self.swapchain()?;
        let layout = self.pipeline_layout.as_ref().ok_or_else(|| {
            RhiError::PipelineError("Pipeline layout has been released".to_string())
        })?;

        let mut config = PipelineConfig::default_config(swapchain.width(), swapchain.height());
        config.render_pass = swapchain.render_pass();
        config.pipeline_layout = layout.handle();

        let pipeline = Pipeline::new::<Vertex>(
            self.device.clone(),
            &self.vert_bytes,
            &self.frag_bytes,
            &config,
        )?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn release_pipeline(&mut self) {
        if self.pipeline.take().is_some() {
            debug!("Pipeline released");
        }
    }

    fn release_swapchain(&mut self) {
        if self.swapchain.take().is_some() {
            debug!("Swapchain released");
        }
    }

    fn release_pipeline_layout(&mut self) {
        if self.pipeline_layout.take().is_some() {
            debug!("Pipeline layout released");
        }
    }

    fn allocate_command_buffers(&mut self, count: usize) -> RhiResult<Vec<vk::CommandBuffer>> {
        let count = u32::try_from(count).map_err(|_| {
            RhiError::CommandBufferError(format!("Too many command buffers requested: {}", count))
        })?;
        self.command_pool.allocate_command_buffers(count)
    }

    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]) {
        self.command_pool.free_command_buffers(buffers);
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during backend drop: {}", e);
        }
        info!("Vulkan backend destroyed");
    }
}
