// Renderer - owns every per-surface resource and drives the frame loop
//
// Creation order: context, command pool + sync objects, render pass,
// swapchain, pipeline. Drop releases them in reverse after the device idles.

use crate::backend::pipeline::create_render_pass;
use crate::backend::surface::REQUIRED_FORMAT;
use crate::backend::swapchain::SwapchainState;
use crate::backend::{
    FixedPipeline, FrameBackend, FrameScheduler, FrameStatus, FrameSync, PresentStatus,
    RenderError, RenderingContext, Result, ShaderBinaries, SwapchainManager,
};
use crate::config::Config;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub struct Renderer {
    scheduler: FrameScheduler,
    pipeline: Option<FixedPipeline>,
    swapchain: SwapchainManager,
    render_pass: vk::RenderPass,
    sync: FrameSync,
    shaders: ShaderBinaries,
    clear_color: [f32; 4],
    /// Set by resize events and stale frames
    needs_recreate: bool,
    ctx: RenderingContext,
}

impl Renderer {
    pub fn new<W>(window: &W, config: &Config) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        log::info!("Initializing Vulkan...");

        let ctx = RenderingContext::new(window, config)?;
        let shaders = ShaderBinaries::load(&config.shaders.vertex, &config.shaders.fragment)?;

        let device = &ctx.device.device;
        let sync = unsafe { FrameSync::new(device, ctx.device.queue_families.graphics)? };
        // Only one surface format is ever accepted, so the pass outlives every swapchain
        let render_pass = match unsafe { create_render_pass(device, REQUIRED_FORMAT.format) } {
            Ok(render_pass) => render_pass,
            Err(e) => {
                unsafe { sync.destroy(device) };
                return Err(e);
            }
        };

        Ok(Self {
            scheduler: FrameScheduler::new(),
            pipeline: None,
            swapchain: SwapchainManager::new(),
            render_pass,
            sync,
            shaders,
            clear_color: config.graphics.clear_color,
            needs_recreate: true,
            ctx,
        })
    }

    /// The window changed size; rebuild before the next frame
    pub fn notify_resized(&mut self) {
        self.needs_recreate = true;
    }

    /// Render one frame for a drawable of `framebuffer_size` pixels
    ///
    /// Returns false when nothing was presented: the surface has no area or
    /// the swapchain went stale and is rebuilt on the next call.
    pub fn render_frame(&mut self, framebuffer_size: (u32, u32)) -> Result<bool> {
        if (self.needs_recreate || self.swapchain.current().is_none())
            && !self.recreate_swapchain(framebuffer_size)?
        {
            return Ok(false);
        }

        let (Some(swapchain), Some(pipeline)) = (self.swapchain.current(), self.pipeline.as_ref()) else {
            return Ok(false);
        };

        let mut frame = VulkanFrame {
            ctx: &self.ctx,
            sync: &mut self.sync,
            swapchain,
            pipeline,
            render_pass: self.render_pass,
            clear_color: self.clear_color,
        };

        match self.scheduler.draw_frame(&mut frame) {
            Ok(FrameStatus::Presented) => Ok(true),
            Ok(FrameStatus::Stale) => {
                self.needs_recreate = true;
                Ok(false)
            }
            Err(e) => {
                log::error!("Frame failed during {:?}: {}", self.scheduler.state(), e);
                Err(e)
            }
        }
    }

    fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<bool> {
        let built = unsafe { self.swapchain.recreate(&self.ctx, self.render_pass, framebuffer_size)? };
        let Some(current) = self.swapchain.current() else {
            return Ok(built);
        };
        self.needs_recreate = false;

        // Viewport and scissor are baked in, so a new extent needs a new pipeline
        let extent = current.configuration.extent;
        if self.pipeline.as_ref().map(|p| p.extent) != Some(extent) {
            let device = &self.ctx.device.device;
            unsafe {
                if let Some(old) = self.pipeline.take() {
                    old.destroy(device);
                }
                self.pipeline = Some(FixedPipeline::new(device, self.render_pass, extent, &self.shaders)?);
            }
        }

        Ok(true)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Err(e) = self.ctx.device.wait_idle() {
            log::error!("Device did not go idle before cleanup: {}", e);
        }

        let device = &self.ctx.device.device;
        unsafe {
            if let Some(pipeline) = self.pipeline.take() {
                pipeline.destroy(device);
            }
            self.swapchain.teardown(&self.ctx);
            device.destroy_render_pass(self.render_pass, None);
            self.sync.destroy(device);
        }

        log::info!("Presented {} frames", self.scheduler.frames_presented());
    }
}

/// The live Vulkan objects one frame touches
struct VulkanFrame<'a> {
    ctx: &'a RenderingContext,
    sync: &'a mut FrameSync,
    swapchain: &'a SwapchainState,
    pipeline: &'a FixedPipeline,
    render_pass: vk::RenderPass,
    clear_color: [f32; 4],
}

impl FrameBackend for VulkanFrame<'_> {
    fn wait_for_frame(&mut self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .device
                .wait_for_fences(&[self.sync.frame_complete], true, u64::MAX)
        }
        .map_err(RenderError::FenceWaitFailed)
    }

    fn reset_frame_fence(&mut self) -> Result<()> {
        unsafe { self.ctx.device.device.reset_fences(&[self.sync.frame_complete]) }
            .map_err(RenderError::SubmissionFailed)
    }

    fn acquire_image(&mut self) -> Result<(u32, bool)> {
        self.swapchain
            .acquire_next_image(&self.ctx.device.swapchain_loader, self.sync.image_acquired)
    }

    fn record_commands(&mut self, image_index: u32) -> Result<()> {
        let device = &self.ctx.device.device;
        let cmd = self.sync.command_buffer;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.swapchain.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.configuration.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(RenderError::CommandRecordingFailed)?;
            device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())
                .map_err(RenderError::CommandRecordingFailed)?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .map_err(RenderError::CommandRecordingFailed)
        }
    }

    fn submit(&mut self) -> Result<()> {
        let wait_semaphores = [self.sync.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.sync.command_buffer];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let device = &self.ctx.device;
        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], self.sync.frame_complete)
        }
        .map_err(RenderError::SubmissionFailed)
    }

    fn submit_empty(&mut self, signal_fence: bool) -> Result<()> {
        let wait_semaphores = [self.sync.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);
        let fence = if signal_fence {
            self.sync.frame_complete
        } else {
            vk::Fence::null()
        };

        let device = &self.ctx.device;
        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], fence)
        }
        .map_err(RenderError::SubmissionFailed)
    }

    fn present(&mut self, image_index: u32) -> Result<PresentStatus> {
        self.swapchain.present(
            &self.ctx.device.swapchain_loader,
            self.ctx.device.present_queue,
            image_index,
            self.sync.render_finished,
        )
    }

    fn rebuild_sync(&mut self) -> Result<()> {
        unsafe { self.sync.rebuild_signals(&self.ctx.device.device) }
    }
}
