//! Window, event loop, and viewer configuration.

use std::sync::Arc;

use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::viewer::ViewerState;

/// Viewer configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Pandolabo Viewer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Apply command line flags on top of this configuration.
    pub fn apply_args(mut self, args: &[String]) -> anyhow::Result<Self> {
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--size" => {
                    let value = args
                        .get(i + 1)
                        .ok_or_else(|| anyhow::anyhow!("--size needs WIDTHxHEIGHT"))?;
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| anyhow::anyhow!("Invalid size: {value}"))?;
                    self = self.with_size(w.parse()?, h.parse()?);
                    i += 1;
                }
                "--no-vsync" => self.vsync = false,
                "--validation" => self.validation = true,
                other => anyhow::bail!("Unknown option: {other}"),
            }
            i += 1;
        }
        Ok(self)
    }
}

/// Create the event loop and run the viewer until the window closes.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = ViewerRunner {
        config,
        state: None,
        failure: None,
    };
    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct ViewerRunner {
    config: AppConfig,
    state: Option<ViewerState>,
    failure: Option<anyhow::Error>,
}

impl ViewerRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ViewerState> {
        let attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attrs)?);
        ViewerState::new(window, &self.config)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("Viewer error: {e:#}");
        self.state = None;
        self.failure = Some(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for ViewerRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Viewer ready");
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        let outcome = match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                let frames = state.frame_count();
                if let Err(e) = state.shutdown() {
                    warn!("Shutdown wait failed: {e}");
                }
                self.state = None;
                info!(frames, "Viewer closed");
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
                Ok(())
            }
            WindowEvent::RedrawRequested => state.redraw(),
            _ => Ok(()),
        };

        if let Err(e) = outcome {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window().request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("pandolabo-viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn size_and_vsync_flags_apply() {
        let config = AppConfig::default()
            .apply_args(&args(&["--size", "800x600", "--no-vsync"]))
            .unwrap();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(!config.vsync);
    }

    #[test]
    fn malformed_size_is_rejected() {
        assert!(AppConfig::default()
            .apply_args(&args(&["--size", "800"]))
            .is_err());
        assert!(AppConfig::default().apply_args(&args(&["--size"])).is_err());
    }
}
