//! Core utilities for vkframe.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - TOML configuration
//! - Timer utilities

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameRateCounter, Timer};
