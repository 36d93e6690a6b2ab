// =============================================================================
// CONTEXT - Every Vulkan handle for one window, owned in one place
// =============================================================================
//
// Bring-up walks the stages in order (see backend::stage). Each handle sits
// in an Option so teardown can release exactly what the completed (or
// half-completed) stages created, newest first, after the device is idle.

use crate::backend::buffer::VertexBuffer;
use crate::backend::commands::{self, Commands, DrawTarget};
use crate::backend::device::{self, Device, Selection};
use crate::backend::instance::{self, Instance, InstanceDesc, LayerCatalog};
use crate::backend::pipeline::{self, TrianglePipeline};
use crate::backend::stage;
use crate::backend::surface::{self, Surface};
use crate::backend::swapchain::{self, Acquire, Swapchain};
use crate::backend::sync::{FenceState, FrameSync};
use crate::backend::{InitError, InitResult, Progress, Stage};
use crate::config::Config;
use crate::diag;
use crate::diagnostics::Level;
use crate::vertex::TRIANGLE;
use anyhow::{Context as _, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, RawDisplayHandle};
use std::path::PathBuf;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

/// How long to block in vkAcquireNextImageKHR before skipping the frame
const ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;

/// The parts of `Config` bring-up and rendering read
#[derive(Debug, Clone)]
pub struct Settings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub layers: Vec<String>,
    pub validation: bool,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
    pub verify_uploads: bool,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            title: config.window.title.clone(),
            width: config.window.width,
            height: config.window.height,
            layers: config.instance.layers.clone(),
            validation: config.instance.validation,
            vertex_shader: config.shaders.vertex.clone(),
            fragment_shader: config.shaders.fragment.clone(),
            present_mode: config.present_mode(),
            clear_color: config.graphics.clear_color,
            verify_uploads: config.debug.verify_uploads,
        }
    }
}

fn need<T>(slot: &Option<T>, stage: Stage) -> InitResult<&T> {
    slot.as_ref().ok_or(InitError::OutOfOrder(stage))
}

/// A swapchain together with the framebuffers built on its views
type Chain = (Swapchain, Vec<vk::Framebuffer>);

pub struct Context {
    settings: Settings,
    display: RawDisplayHandle,
    progress: Progress,

    entry: Option<Entry>,
    catalog: Option<LayerCatalog>,
    instance: Option<Instance>,
    window: Option<Window>,
    surface: Option<Surface>,
    selection: Option<Selection>,
    device: Option<Device>,
    swapchain: Option<Swapchain>,
    render_pass: Option<vk::RenderPass>,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: Option<TrianglePipeline>,
    vertex_buffer: Option<VertexBuffer>,
    commands: Option<Commands>,
    frame_sync: Option<FrameSync>,
    fence: FenceState,

    /// Set on resize / out-of-date / suboptimal
    needs_recreate: bool,
    /// Window has zero area; nothing is rendered
    minimized: bool,
}

impl Context {
    /// Run every bring-up step. On failure the partially built context is
    /// dropped, which releases whatever the earlier steps created.
    pub fn new(config: &Config, event_loop: &ActiveEventLoop) -> InitResult<Self> {
        let mut context = Self::unbuilt(Settings::from(config), event_loop.raw_display_handle());

        let mut progress = context.progress;
        let result = stage::drive(&mut progress, |stage| context.enter(stage, event_loop));
        context.progress = progress;
        result?;

        if let Some(chain) = &context.swapchain {
            diag!(
                Level::Log,
                "Vulkan context is {}: {}x{} {:?}, {:?}",
                context.progress.reached(),
                chain.extent.width,
                chain.extent.height,
                chain.format,
                chain.present_mode
            );
        }
        Ok(context)
    }

    /// Every slot empty; nothing created yet
    fn unbuilt(settings: Settings, display: RawDisplayHandle) -> Self {
        Self {
            settings,
            display,
            progress: Progress::default(),
            entry: None,
            catalog: None,
            instance: None,
            window: None,
            surface: None,
            selection: None,
            device: None,
            swapchain: None,
            render_pass: None,
            framebuffers: Vec::new(),
            pipeline: None,
            vertex_buffer: None,
            commands: None,
            frame_sync: None,
            fence: FenceState::Signaled,
            needs_recreate: false,
            minimized: false,
        }
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_ref()
    }

    // =========================================================================
    // BRING-UP STEPS
    // =========================================================================

    fn enter(&mut self, stage: Stage, event_loop: &ActiveEventLoop) -> InitResult<()> {
        match stage {
            Stage::Uninitialized => Ok(()),
            Stage::LayersQueried => self.query_layers(),
            Stage::InstanceCreated => self.create_instance(stage),
            Stage::WindowCreated => self.create_window(event_loop),
            Stage::SurfaceCreated => {
                let entry = need(&self.entry, stage)?;
                let instance = need(&self.instance, stage)?;
                let window = need(&self.window, stage)?;
                self.surface = Some(Surface::new(entry, &instance.handle, window)?);
                Ok(())
            }
            Stage::DeviceSelected => self.select_device(stage),
            Stage::DeviceCreated => {
                let instance = need(&self.instance, stage)?;
                let selection = need(&self.selection, stage)?;
                self.device = Some(Device::new(&instance.handle, selection)?);
                Ok(())
            }
            Stage::SwapChainCreated => {
                let device = need(&self.device, stage)?;
                let surface = need(&self.surface, stage)?;
                let size = need(&self.window, stage)?.inner_size();
                self.swapchain = Some(Swapchain::new(
                    device,
                    surface,
                    size.width,
                    size.height,
                    self.settings.present_mode,
                    vk::SwapchainKHR::null(),
                )?);
                Ok(())
            }
            Stage::ImagesAcquired => {
                let device = need(&self.device, stage)?;
                let swapchain = self.swapchain.as_mut().ok_or(InitError::OutOfOrder(stage))?;
                swapchain.acquire_images(device)
            }
            Stage::PipelineReady => self.build_pipeline(stage),
            Stage::Renderable => self.create_frame_resources(stage),
        }
    }

    fn query_layers(&mut self) -> InitResult<()> {
        let entry = unsafe { Entry::load() }?;
        let catalog = LayerCatalog::query(&entry);
        self.entry = Some(entry);

        let catalog = catalog?;
        catalog.log_summary();
        self.catalog = Some(catalog);
        Ok(())
    }

    fn create_instance(&mut self, stage: Stage) -> InitResult<()> {
        let entry = need(&self.entry, stage)?;
        let catalog = need(&self.catalog, stage)?;

        let mut layers = self.settings.layers.clone();
        let callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT = if self.settings.validation {
            layers.push(instance::VALIDATION_LAYER.to_string());
            Some(instance::vulkan_debug_callback)
        } else {
            None
        };

        let required = surface::required_extensions(self.display)?;
        let desc = InstanceDesc::resolve(catalog, &self.settings.title, &layers, &required, callback)?;
        self.instance = Some(Instance::new(entry, &desc)?);
        Ok(())
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> InitResult<()> {
        let attributes = WindowAttributes::default()
            .with_title(&self.settings.title)
            .with_inner_size(PhysicalSize::new(self.settings.width, self.settings.height));

        let window = event_loop.create_window(attributes)?;
        log::info!("Window {}x{} created", self.settings.width, self.settings.height);
        self.window = Some(window);
        Ok(())
    }

    fn select_device(&mut self, stage: Stage) -> InitResult<()> {
        let instance = need(&self.instance, stage)?;
        let surface = need(&self.surface, stage)?;

        let candidates = device::enumerate_candidates(&instance.handle, surface)?;
        for candidate in &candidates {
            log::info!(
                "GPU: {} ({:?}, {} queue families)",
                candidate.name,
                candidate.device_type,
                candidate.families.len()
            );
        }

        let selection = device::select_device(&candidates)?;
        log::info!("Selected GPU: {} (queue family {})", selection.name, selection.queue_family);
        self.selection = Some(selection);
        Ok(())
    }

    fn build_pipeline(&mut self, stage: Stage) -> InitResult<()> {
        let device = need(&self.device, stage)?;
        let swapchain = need(&self.swapchain, stage)?;

        let render_pass = pipeline::create_render_pass(device, swapchain.format)?;
        self.render_pass = Some(render_pass);

        self.framebuffers = pipeline::create_framebuffers(device, &swapchain.image_views, render_pass, swapchain.extent)?;

        self.pipeline = Some(TrianglePipeline::new(
            device,
            render_pass,
            &self.settings.vertex_shader,
            &self.settings.fragment_shader,
        )?);
        Ok(())
    }

    fn create_frame_resources(&mut self, stage: Stage) -> InitResult<()> {
        let device = need(&self.device, stage)?;

        self.vertex_buffer = Some(VertexBuffer::new(device, &TRIANGLE, self.settings.verify_uploads)?);
        self.commands = Some(Commands::new(device)?);
        self.frame_sync = Some(FrameSync::new(device)?);
        Ok(())
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    pub fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            self.minimized = true;
        } else {
            self.needs_recreate = true;
        }
    }

    /// Build a new swapchain from the old one. The old swapchain and its
    /// views and framebuffers are destroyed only once the attempt is over.
    /// If it failed, no swapchain is left and the next frame retries from a
    /// null handle.
    fn recreate_swapchain(&mut self) -> InitResult<()> {
        let stage = Stage::SwapChainCreated;
        let window = need(&self.window, stage)?;
        let device = need(&self.device, stage)?;
        let surface = need(&self.surface, stage)?;
        let render_pass = *need(&self.render_pass, stage)?;

        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.minimized = true;
            return Ok(());
        }

        device.wait_idle()?;

        let previous = self
            .swapchain
            .take()
            .map(|chain| (chain, std::mem::take(&mut self.framebuffers)));
        let present_mode = self.settings.present_mode;

        let (chain, framebuffers) = swapchain::replace_retired(
            previous,
            |old| build_chain(device, surface, render_pass, size, present_mode, old),
            |(mut chain, mut framebuffers)| {
                pipeline::destroy_framebuffers(device, &mut framebuffers);
                chain.destroy(device);
            },
        )?;

        self.swapchain = Some(chain);
        self.framebuffers = framebuffers;
        self.minimized = false;
        self.needs_recreate = false;
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Draw one frame. Returns false when nothing was presented (minimized,
    /// not ready, or the swapchain needs recreating first).
    pub fn render_frame(&mut self) -> Result<bool> {
        if !self.progress.is_renderable() {
            return Ok(false);
        }

        if self.needs_recreate || self.minimized || self.swapchain.is_none() {
            self.recreate_swapchain()
                .map_err(|e| anyhow::anyhow!("Swapchain recreation failed: {e}"))?;
            if self.minimized || self.swapchain.is_none() {
                return Ok(false);
            }
        }

        let (Some(device), Some(swapchain), Some(pipeline), Some(render_pass), Some(vertices), Some(commands), Some(sync)) = (
            self.device.as_ref(),
            self.swapchain.as_ref(),
            self.pipeline.as_ref(),
            self.render_pass,
            self.vertex_buffer.as_ref(),
            self.commands.as_ref(),
            self.frame_sync.as_ref(),
        ) else {
            anyhow::bail!("Context reached {} but is missing frame resources", self.progress.reached());
        };

        // Wait until the previous submission released the command buffer
        if self.fence.needs_wait() {
            unsafe { device.handle.wait_for_fences(&[sync.in_flight_fence], true, u64::MAX) }
                .context("Waiting for the in-flight fence failed")?;
        }
        self.fence = self.fence.waited();

        let (image_index, suboptimal) = match swapchain
            .acquire_next_image(device, ACQUIRE_TIMEOUT_NS, sync.image_available)
            .context("Acquiring a swapchain image failed")?
        {
            Acquire::Ready { index, suboptimal } => (index, suboptimal),
            Acquire::NotReady => return Ok(false),
            Acquire::OutOfDate => {
                self.needs_recreate = true;
                return Ok(false);
            }
        };

        let recorded = self
            .framebuffers
            .get(image_index as usize)
            .copied()
            .context("Acquired image has no framebuffer")
            .and_then(|framebuffer| {
                let target = DrawTarget {
                    render_pass,
                    framebuffer,
                    extent: swapchain.extent,
                    pipeline: pipeline.pipeline,
                    vertices,
                    clear_color: self.settings.clear_color,
                };
                commands::record_draw(&device.handle, commands.buffer, &target).context("Recording the draw failed")
            });

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [commands.buffer];

        // Without a recorded buffer the submit only consumes the acquire
        // semaphore and signals the fence
        let mut submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);
        if recorded.is_ok() {
            submit_info = submit_info
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);
        }

        unsafe { device.handle.reset_fences(&[sync.in_flight_fence]) }.context("Resetting the in-flight fence failed")?;
        self.fence = self.fence.reset();

        unsafe { device.handle.queue_submit(device.queue, &[submit_info.build()], sync.in_flight_fence) }
            .context("Queue submit failed")?;
        self.fence = self.fence.submitted();

        recorded?;

        let present_outdated = swapchain
            .present(device, image_index, &signal_semaphores)
            .context("Present failed")?;

        if suboptimal || present_outdated {
            self.needs_recreate = true;
        }
        Ok(true)
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    fn release(&mut self, stage: Stage) {
        match stage {
            Stage::Renderable => {
                if let Some(device) = &self.device {
                    if let Some(sync) = self.frame_sync.take() {
                        sync.destroy(device);
                    }
                    if let Some(commands) = self.commands.take() {
                        commands.destroy(device);
                    }
                    if let Some(mut vertices) = self.vertex_buffer.take() {
                        vertices.destroy(device);
                    }
                }
            }
            Stage::PipelineReady => {
                if let Some(device) = &self.device {
                    if let Some(pipeline) = self.pipeline.take() {
                        pipeline.destroy(device);
                    }
                    pipeline::destroy_framebuffers(device, &mut self.framebuffers);
                    if let Some(render_pass) = self.render_pass.take() {
                        unsafe { device.handle.destroy_render_pass(render_pass, None) };
                    }
                }
            }
            Stage::ImagesAcquired => {
                if let (Some(device), Some(swapchain)) = (&self.device, self.swapchain.as_mut()) {
                    swapchain.destroy_views(device);
                }
            }
            Stage::SwapChainCreated => {
                if let (Some(device), Some(mut swapchain)) = (&self.device, self.swapchain.take()) {
                    swapchain.destroy(device);
                }
            }
            Stage::DeviceCreated => {
                if let Some(device) = self.device.take() {
                    device.destroy();
                }
            }
            Stage::DeviceSelected => self.selection = None,
            Stage::SurfaceCreated => {
                if let Some(surface) = self.surface.take() {
                    surface.destroy();
                }
            }
            Stage::WindowCreated => self.window = None,
            Stage::InstanceCreated => {
                if let Some(mut instance) = self.instance.take() {
                    instance.destroy();
                }
            }
            Stage::LayersQueried => {
                self.catalog = None;
                self.entry = None;
            }
            Stage::Uninitialized => {}
        }
    }

    fn teardown(&mut self) {
        if self.progress.entered() == Stage::Uninitialized {
            return;
        }
        log::info!("Tearing down Vulkan context from {}", self.progress.entered());

        // Nothing may be destroyed while the GPU still uses it
        if let Some(device) = &self.device {
            if let Err(e) = device.wait_idle() {
                log::warn!("{} (continuing teardown)", e);
            }
        }

        let stages: Vec<Stage> = self.progress.unwind().collect();
        for stage in stages {
            log::debug!("Releasing {}", stage);
            self.release(stage);
        }
        self.progress.reset();
    }
}

/// Create a swapchain (retiring `old`), its views and framebuffers. Anything
/// created here is destroyed again if a later step fails.
fn build_chain(
    device: &Device,
    surface: &Surface,
    render_pass: vk::RenderPass,
    size: PhysicalSize<u32>,
    present_mode: vk::PresentModeKHR,
    old: Option<&Chain>,
) -> InitResult<Chain> {
    let old_handle = old.map_or(vk::SwapchainKHR::null(), |(chain, _)| chain.handle);
    let mut fresh = Swapchain::new(device, surface, size.width, size.height, present_mode, old_handle)?;

    if let Some((previous, _)) = old {
        if fresh.format != previous.format {
            let err = InitError::SurfaceFormatChanged {
                old: previous.format,
                new: fresh.format,
            };
            fresh.destroy(device);
            return Err(err);
        }
    }

    if let Err(e) = fresh.acquire_images(device) {
        fresh.destroy(device);
        return Err(e);
    }

    match pipeline::create_framebuffers(device, &fresh.image_views, render_pass, fresh.extent) {
        Ok(framebuffers) => Ok((fresh, framebuffers)),
        Err(e) => {
            fresh.destroy(device);
            Err(e)
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.teardown();
        log::info!("Cleanup complete");
    }
}
