//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Swapchain management, including per-image framebuffers and depth
//! - Command buffer recording
//! - Vertex and index buffers
//! - Pipeline creation
//! - Frame synchronization

mod error;

pub mod buffer;
pub mod command;
pub mod depth_buffer;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
