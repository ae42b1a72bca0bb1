//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, submission
//! and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] owns everything whose lifetime is tied to the chain of
//! presentable images:
//! - Swapchain images and their views
//! - One depth attachment per image
//! - A render pass compatible with the color and depth formats
//! - One framebuffer per image
//! - Per-frame synchronization ([`FrameSync`] x [`MAX_FRAMES_IN_FLIGHT`]) and
//!   the per-image fence references that keep an image from being reused
//!   while a submission targeting it is still running
//!
//! There is no in-place recreate. A new chain is built by passing the live
//! one as `previous` to [`Swapchain::new`], which reuses its surface format
//! and present mode, hands its handle to the driver as `old_swapchain`, and
//! drops it only once the new chain is complete.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::swapchain::{Acquired, Swapchain};
//! use ash::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR,
//! #            cmd: vk::CommandBuffer) -> vkframe_rhi::RhiResult<()> {
//! let extent = vk::Extent2D { width: 800, height: 600 };
//! let mut swapchain = Swapchain::new(instance, device.clone(), surface, extent, false, None)?;
//!
//! match swapchain.acquire_next_image()? {
//!     Acquired::Ready(index) | Acquired::Suboptimal(index) => {
//!         // ... record `cmd` against swapchain.framebuffer(index as usize) ...
//!         let status = swapchain.submit_command_buffers(cmd, index)?;
//!         if status.needs_recreation() {
//!             device.wait_idle()?;
//!             swapchain = Swapchain::new(instance, device, surface, extent, false, Some(swapchain))?;
//!         }
//!     }
//!     Acquired::OutOfDate => { /* rebuild before the next acquire */ }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::depth_buffer::DepthBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::{FrameSchedule, FrameSync, MAX_FRAMES_IN_FLIGHT, SubmitSlots};

/// Health of the surface as reported by acquire or present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The chain matches the surface.
    Ok,
    /// Still presentable, but the chain no longer matches the surface exactly.
    Suboptimal,
    /// The surface changed; the chain must be rebuilt before further use.
    OutOfDate,
}

impl SurfaceStatus {
    /// Whether the chain should be rebuilt before the next acquire.
    #[inline]
    pub fn needs_recreation(self) -> bool {
        !matches!(self, SurfaceStatus::Ok)
    }
}

/// Result of [`Swapchain::acquire_next_image`].
///
/// An out-of-date surface produces no image index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Ready(u32),
    Suboptimal(u32),
    OutOfDate,
}

impl Acquired {
    pub fn status(self) -> SurfaceStatus {
        match self {
            Acquired::Ready(_) => SurfaceStatus::Ok,
            Acquired::Suboptimal(_) => SurfaceStatus::Suboptimal,
            Acquired::OutOfDate => SurfaceStatus::OutOfDate,
        }
    }

    /// The acquired image, if any.
    pub fn image_index(self) -> Option<u32> {
        match self {
            Acquired::Ready(index) | Acquired::Suboptimal(index) => Some(index),
            Acquired::OutOfDate => None,
        }
    }
}

/// Swapchain surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain with its attachments, render pass, framebuffers and
/// frame synchronization.
///
/// # Thread Safety
///
/// The swapchain is exclusively owned by the frame loop. Acquire and submit
/// take `&mut self` since they advance the frame counter and the per-image
/// fence references.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    /// Owned by the swapchain handle; never destroyed individually
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_buffers: Vec<DepthBuffer>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    frame_sync: Vec<FrameSync>,
    schedule: FrameSchedule,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Builds a swapchain for `surface` sized to `extent`.
    ///
    /// Format selection prefers B8G8R8A8_SRGB; the present mode is FIFO when
    /// `vsync` is set, otherwise MAILBOX when available. When `previous` is
    /// given, its surface format and present mode are kept if the surface
    /// still supports them, and it is dropped after the new chain is built.
    ///
    /// The caller must ensure no work using `previous` is still executing.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceIncompatible`] if the surface reports no
    /// formats or present modes, and any Vulkan or allocation error from
    /// building the chain. Partially built resources are released.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        vsync: bool,
        previous: Option<Swapchain>,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;

        let previous_choice = previous
            .as_ref()
            .map(|old| (old.surface_format, old.present_mode));
        let (surface_format, present_mode) = negotiate(&support, previous_choice, vsync)?;
        let extent = choose_extent(&support.capabilities, extent.width, extent.height);
        let min_image_count = determine_image_count(&support.capabilities);
        let depth_format = device.depth_format()?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, depth {:?}, present mode {:?}, min {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            depth_format,
            present_mode,
            min_image_count
        );

        let (graphics_family, present_family) = device
            .queue_families()
            .pair()
            .ok_or_else(|| RhiError::SwapchainError("Missing queue family".to_string()))?;
        let (sharing_mode, queue_family_indices) = sharing_mode(graphics_family, present_family);

        let old_swapchain = previous
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |old| old.swapchain);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let handle = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        // Every later failure unwinds through Drop, which skips null handles.
        let mut chain = Self {
            device,
            swapchain_loader,
            swapchain: handle,
            images: Vec::new(),
            image_views: Vec::new(),
            depth_buffers: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            frame_sync: Vec::new(),
            schedule: FrameSchedule::new(0),
            surface_format,
            depth_format,
            extent,
            present_mode,
        };

        chain.images = unsafe { chain.swapchain_loader.get_swapchain_images(handle)? };
        chain.create_image_views()?;
        chain.create_depth_resources()?;
        chain.create_render_pass()?;
        chain.create_framebuffers()?;
        chain.frame_sync = FrameSync::for_frames_in_flight(&chain.device, MAX_FRAMES_IN_FLIGHT)?;
        chain.schedule = FrameSchedule::new(chain.images.len());

        if let Some(old) = previous {
            if !chain.has_matching_formats(&old) {
                warn!(
                    "Swapchain formats changed: color {:?} -> {:?}, depth {:?} -> {:?}",
                    old.image_format(),
                    chain.image_format(),
                    old.depth_format(),
                    chain.depth_format()
                );
            }
            info!(
                "Swapchain rebuilt: {}x{} ({} images) -> {}x{} ({} images)",
                old.width(),
                old.height(),
                old.image_count(),
                chain.width(),
                chain.height(),
                chain.image_count()
            );
            drop(old);
        }

        info!("Swapchain created with {} images", chain.images.len());
        Ok(chain)
    }

    /// Waits for the current frame slot to retire, then acquires the next
    /// presentable image with no timeout.
    ///
    /// Before returning an image, also waits on the fence of the slot that
    /// last submitted it, so its command buffer is no longer pending when
    /// the caller records into it.
    ///
    /// # Errors
    ///
    /// Any device error other than out-of-date is fatal.
    pub fn acquire_next_image(&mut self) -> RhiResult<Acquired> {
        let sync = &self.frame_sync[self.schedule.current_slot()];
        sync.in_flight_fence().wait(u64::MAX)?;

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available_semaphore().handle(),
                vk::Fence::null(),
            )
        };

        let acquired = classify_acquire(result)?;
        if acquired.status().needs_recreation() {
            debug!("Acquire reported {:?}", acquired.status());
        }

        if let Some(index) = acquired.image_index()
            && let Some(slot) = self.schedule.image_wait_slot(index as usize)
        {
            self.frame_sync[slot].in_flight_fence().wait(u64::MAX)?;
        }
        Ok(acquired)
    }

    /// Submits `command_buffer` for `image_index` and presents the image.
    ///
    /// The fence of the slot that last rendered to this image was already
    /// waited on at acquire; waiting again here returns at once. The submission waits on the slot's
    /// image-available semaphore, signals render-finished, and signals the
    /// slot's fence, which then guards the image. The frame counter advances
    /// once the submission is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] for an index outside the chain and
    /// any device error other than out-of-date from submit or present.
    pub fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus> {
        let SubmitSlots { slot, previous } = self
            .schedule
            .begin_submit(image_index as usize)
            .ok_or_else(|| {
                RhiError::SwapchainError(format!(
                    "Image index {} out of range ({} images)",
                    image_index,
                    self.images.len()
                ))
            })?;
        if let Some(previous) = previous {
            self.frame_sync[previous].in_flight_fence().wait(u64::MAX)?;
        }

        let sync = &self.frame_sync[slot];
        let wait_semaphores = [sync.image_available_semaphore().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished_semaphore().handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        sync.in_flight_fence().reset()?;
        unsafe {
            self.device
                .submit_graphics(&[submit_info], sync.in_flight_fence().handle())?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        self.schedule.finish_submit();

        let status = classify_present(result)?;
        if status.needs_recreation() {
            debug!("Present reported {:?}", status);
        }
        Ok(status)
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Render pass every framebuffer of this chain was built against.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn framebuffer(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).copied()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Frame-in-flight slot the next acquire will use.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.schedule.current_slot()
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        aspect_ratio(self.extent)
    }

    /// Whether `other` renders to the same color and depth formats.
    pub fn has_matching_formats(&self, other: &Swapchain) -> bool {
        self.image_format() == other.image_format() && self.depth_format() == other.depth_format()
    }

    fn create_image_views(&mut self) -> RhiResult<()> {
        self.image_views.reserve(self.images.len());

        for (i, &image) in self.images.iter().enumerate() {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            let image_view = unsafe {
                self.device
                    .handle()
                    .create_image_view(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainError(format!(
                            "Failed to create image view {}: {:?}",
                            i, e
                        ))
                    })?
            };

            self.image_views.push(image_view);
        }

        debug!("Created {} image views", self.image_views.len());
        Ok(())
    }

    fn create_depth_resources(&mut self) -> RhiResult<()> {
        for _ in 0..self.images.len() {
            let depth = DepthBuffer::new(self.device.clone(), self.extent, self.depth_format)?;
            self.depth_buffers.push(depth);
        }
        Ok(())
    }

    fn create_render_pass(&mut self) -> RhiResult<()> {
        let attachments = render_pass_attachments(self.surface_format.format, self.depth_format);

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];

        let dependencies = [external_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        self.render_pass = unsafe { self.device.handle().create_render_pass(&create_info, None)? };
        debug!("Render pass created");
        Ok(())
    }

    fn create_framebuffers(&mut self) -> RhiResult<()> {
        self.framebuffers.reserve(self.image_views.len());

        for (view, depth) in self.image_views.iter().zip(&self.depth_buffers) {
            let attachments = [*view, depth.image_view()];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe { self.device.handle().create_framebuffer(&create_info, None)? };
            self.framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} framebuffers ({}x{})",
            self.framebuffers.len(),
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                self.device
                    .handle()
                    .destroy_render_pass(self.render_pass, None);
            }
            for &image_view in &self.image_views {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.framebuffers.clear();
        self.image_views.clear();
        self.depth_buffers.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Maps the raw acquire result onto [`Acquired`].
///
/// `ERROR_OUT_OF_DATE_KHR` is transient; every other error is fatal.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<Acquired> {
    match result {
        Ok((index, false)) => Ok(Acquired::Ready(index)),
        Ok((index, true)) => Ok(Acquired::Suboptimal(index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(e) => Err(RhiError::SwapchainError(format!(
            "Failed to acquire swapchain image: {:?}",
            e
        ))),
    }
}

/// Maps the raw present result onto [`SurfaceStatus`].
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<SurfaceStatus> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Ok),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(SurfaceStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
        Err(e) => Err(RhiError::SwapchainError(format!(
            "Failed to present swapchain image: {:?}",
            e
        ))),
    }
}

/// Picks the surface format and present mode, keeping `previous` where the
/// surface still supports it.
fn negotiate(
    support: &SwapchainSupportDetails,
    previous: Option<(vk::SurfaceFormatKHR, vk::PresentModeKHR)>,
    vsync: bool,
) -> RhiResult<(vk::SurfaceFormatKHR, vk::PresentModeKHR)> {
    if !support.is_adequate() {
        return Err(RhiError::SurfaceIncompatible(format!(
            "surface reports {} formats and {} present modes",
            support.formats.len(),
            support.present_modes.len()
        )));
    }

    let reused_format = previous.map(|(format, _)| format).filter(|format| {
        support
            .formats
            .iter()
            .any(|f| f.format == format.format && f.color_space == format.color_space)
    });
    let surface_format = match reused_format {
        Some(format) => format,
        None => choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::SurfaceIncompatible("no surface formats".to_string())
        })?,
    };

    let present_mode = previous
        .map(|(_, mode)| mode)
        .filter(|mode| support.present_modes.contains(mode))
        .unwrap_or_else(|| choose_present_mode(&support.present_modes, vsync));

    Ok((surface_format, present_mode))
}

/// Chooses the best surface format from the available formats.
///
/// Prefers B8G8R8A8_SRGB, then B8G8R8A8_UNORM (both SRGB_NONLINEAR), then the
/// first reported format. Returns `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let find = |wanted: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return Some(format);
    }

    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return Some(format);
    }

    let first = formats.first().copied();
    if let Some(format) = first {
        warn!("Using first available surface format: {:?}", format.format);
    }
    first
}

/// Chooses the present mode.
///
/// With `vsync`, FIFO. Otherwise MAILBOX when available, falling back to
/// FIFO, which every implementation must support.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }

    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the requested size to the surface's min/max extents.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );

    extent
}

/// Minimum image count requested from the driver: one more than the
/// surface minimum, capped by the surface maximum when there is one.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // A max_image_count of 0 means no maximum
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family != present_family {
        debug!(
            "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
            graphics_family, present_family
        );
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// Color attachment (cleared, stored, presented) and depth attachment
/// (cleared, discarded).
fn render_pass_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ]
}

/// Orders the subpass's attachment writes after the presentation engine's
/// reads and after the previous frame's depth writes.
fn external_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        return 0.0;
    }
    extent.width as f32 / extent.height as f32
}
