//! Platform abstraction layer for vkframe.
//!
//! This crate provides the window-system collaborator:
//! - Window management via winit
//! - Resize and close bookkeeping polled by the renderer
//! - Vulkan surface creation through raw window handles

mod window;

pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
