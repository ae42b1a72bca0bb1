//! vkframe - Main Entry Point
//!
//! Opens a window and draws the configured demo mesh every frame until the
//! window is closed.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkframe_core::config::default_config_path;
use vkframe_core::{AppConfig, FrameRateCounter};
use vkframe_platform::Window;
use vkframe_renderer::{FrameOrchestrator, FrameOutcome, FrameWindow, VulkanBackend};

/// How often the frame rate is logged.
const FPS_LOG_INTERVAL: Duration = Duration::from_secs(2);

struct App {
    config: AppConfig,
    // Dropped before the window so the surface goes first
    orchestrator: Option<FrameOrchestrator<VulkanBackend>>,
    window: Option<Window>,
    fps: FrameRateCounter,
    /// First fatal error, returned from `main` once the loop exits.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            orchestrator: None,
            window: None,
            fps: FrameRateCounter::new(FPS_LOG_INTERVAL),
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("Fatal error: {:#}", err);
        self.shutdown();
        self.fatal.get_or_insert(err);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(mut orchestrator) = self.orchestrator.take()
            && let Err(e) = orchestrator.shutdown()
        {
            error!("Shutdown error: {}", e);
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(orchestrator), Some(window)) = (self.orchestrator.as_mut(), self.window.as_mut())
        else {
            return;
        };

        match orchestrator.draw_frame(window) {
            Ok(FrameOutcome::Presented) => {
                if let Some(fps) = self.fps.record_frame() {
                    info!("{:.1} FPS", fps);
                }
            }
            Ok(FrameOutcome::Recreated) => debug!("Frame replaced by swapchain recreation"),
            Ok(FrameOutcome::Skipped) => {}
            Err(e) => self.fail(event_loop, anyhow!(e).context("frame failed")),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::from_config(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                self.fail(event_loop, anyhow!(e).context("failed to create window"));
                return;
            }
        };

        let orchestrator = VulkanBackend::new(&window, &self.config)
            .and_then(FrameOrchestrator::new);

        match orchestrator {
            Ok(orchestrator) => {
                info!("Initialization complete, entering main loop");
                self.orchestrator = Some(orchestrator);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, anyhow!(e).context("failed to create renderer")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                if let Some(window) = self.window.as_mut() {
                    window.request_close();
                }
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.draw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref()
            && !FrameWindow::should_close(window)
        {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    vkframe_core::init_logging();
    info!("Starting vkframe");

    let config_path = default_config_path();
    let config = AppConfig::load_or_default(&config_path)?;
    debug!("Configuration: {:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Release GPU resources before the window if the loop ended another way
    app.shutdown();
    drop(app.window.take());

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
