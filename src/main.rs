// =============================================================================
// TRIANGLE PRESENT - single-frame-in-flight Vulkan presentation loop
// =============================================================================
//
// Opens one window, brings up Vulkan against it and draws a hardcoded
// triangle every iteration until the window is closed.
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence
// 2. Acquire a swapchain image
// 3. Re-record the single command buffer
// 4. Submit to the graphics queue
// 5. Present on the presentation queue
//
// =============================================================================

mod backend;
mod config;
mod renderer;

use anyhow::{Context, Result};
use backend::ErrorKind;
use config::{Config, DebugConfig};
use renderer::Renderer;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config.debug)?;
    log::info!("Starting Vulkan renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.resizable { "resizable" } else { "fixed size" }
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop failed")?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging, optionally duplicating every record into a log file
///
/// `RUST_LOG` wins over the configured level when set.
fn init_logging(debug: &DebugConfig) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or(debug.log_level.as_str());
    let mut builder = env_logger::Builder::from_env(env);

    if debug.log_to_file {
        let file = File::create(&debug.log_file)
            .with_context(|| format!("Failed to create log file {}", debug.log_file))?;
        builder
            .target(env_logger::Target::Pipe(Box::new(Tee { file })))
            .write_style(env_logger::WriteStyle::Never);
    }

    builder.try_init().context("Logger was already initialized")?;
    Ok(())
}

/// Writes everything to stderr and to the log file
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer must go before the window
/// its surface was created from.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    /// Close request or Escape; checked once per loop iteration
    shutdown_requested: bool,
    /// Error that ended the loop, reported from `main`
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            shutdown_requested: false,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };

        let size = window.inner_size();
        match renderer.render_frame((size.width, size.height)) {
            Ok(_) => {}
            // The next iteration retries
            Err(e) if e.kind() == ErrorKind::FrameOperationFailure => {
                log::warn!("Frame dropped: {}", e);
            }
            Err(e) => {
                let error = anyhow::Error::new(e).context("Rendering failed");
                self.fail(event_loop, error);
            }
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                let error = anyhow::Error::new(e).context("Failed to create window");
                self.fail(event_loop, error);
                return;
            }
        };

        match Renderer::new(&*window, &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                let error = anyhow::Error::new(e).context("Failed to initialize Vulkan");
                self.fail(event_loop, error);
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown_requested = true;
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown_requested = true;
                }
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.notify_resized();
                }
            }

            WindowEvent::RedrawRequested => {
                if !self.shutdown_requested {
                    self.redraw(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.shutdown_requested {
            event_loop.exit();
            return;
        }

        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Drains the device, then releases everything in reverse order
        self.renderer = None;
        self.window = None;
        log::info!("Cleanup complete");
    }
}
