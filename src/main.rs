// =============================================================================
// VULKAN TRIANGLE - Context bring-up and a single triangle per frame
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, FPS title)                              │
// │    └── Context (bring-up stages, teardown, swapchain rebuild)   │
// │          └── backend::* (one module per creation step)          │
// │                └── Command buffer + FrameSync per frame         │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Rebuild the swapchain if a resize or out-of-date result asked for it
// 2. Wait for the previous frame's fence
// 3. Acquire swapchain image
// 4. Record clear + triangle draw
// 5. Submit, then present
//
// =============================================================================

mod backend;
mod config;
mod context;
mod diagnostics;
mod vertex;

use anyhow::Result;
use backend::InitError;
use config::Config;
use context::Context;
use diagnostics::Level;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    diagnostics::init_logging(&config);
    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.bring_up_error.take() {
        anyhow::bail!("Vulkan bring-up failed at {}: {}", e.stage(), e);
    }
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

pub struct App {
    config: Config,
    context: Option<Context>,
    /// Why bring-up stopped, reported once the event loop returns
    bring_up_error: Option<InitError>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            context: None,
            bring_up_error: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    pub fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(window) = self.context.as_ref().and_then(Context::window) {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() || self.bring_up_error.is_some() {
            return;
        }

        match Context::new(&self.config, event_loop) {
            Ok(context) => self.context = Some(context),
            Err(e) => {
                diag!(Level::Fatal, "Bring-up stopped at {}: {}", e.stage(), e);
                self.bring_up_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(context) = self.context.as_mut() {
                    context.handle_resize(size);
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(context) = self.context.as_mut() else {
                    return;
                };
                match context.render_frame() {
                    Ok(true) => self.update_fps(),
                    Ok(false) => {}
                    Err(e) => log::error!("Render error: {:?}", e),
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.context.as_ref().and_then(Context::window) {
            window.request_redraw();
        }
    }

    /// Tear the context down while the event loop (and display) still exist
    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.context = None;
    }
}
