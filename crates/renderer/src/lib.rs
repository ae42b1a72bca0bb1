//! Frame orchestration for vkframe.
//!
//! This crate drives the per-frame loop:
//! - Acquire, record, submit and present through [`FrameOrchestrator`]
//! - Swapchain and pipeline recreation on resize or stale surfaces
//! - Ordered shutdown after the GPU drains
//!
//! [`VulkanBackend`] is the production [`FrameBackend`]; tests drive the
//! orchestrator with a recording mock instead.

pub mod backend;
pub mod model;
pub mod orchestrator;

pub use backend::VulkanBackend;
pub use model::{MeshData, Model};
pub use orchestrator::{FrameBackend, FrameOrchestrator, FrameOutcome, FrameState, FrameWindow};
