// Swapchain - Window presentation
//
// Owns the chain of images we render to, one view and one framebuffer per
// image. Everything is torn down and rebuilt together when the surface
// changes; nothing survives a recreation.

use super::context::RenderingContext;
use super::device::VulkanDevice;
use super::error::{RenderError, Result};
use super::frame::PresentStatus;
use super::queue::QueueFamilyIndices;
use super::surface::{SurfaceConfiguration, SurfaceSupport};
use ash::vk;

/// Image sharing between the graphics and present families
///
/// Distinct families share the images concurrently so no ownership
/// transfers are needed; a single family keeps them exclusive.
pub fn sharing_policy(families: QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if families.is_unified() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

pub struct SwapchainState {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub configuration: SurfaceConfiguration,
}

impl SwapchainState {
    /// # Safety
    /// All handles must be valid and `render_pass` compatible with the
    /// configuration's format.
    pub unsafe fn create(
        device: &VulkanDevice,
        surface: vk::SurfaceKHR,
        configuration: SurfaceConfiguration,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        log::info!(
            "Creating swapchain: {}x{}",
            configuration.extent.width,
            configuration.extent.height
        );

        let (sharing_mode, family_indices) = sharing_policy(device.queue_families);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(configuration.image_count)
            .image_format(configuration.format.format)
            .image_color_space(configuration.format.color_space)
            .image_extent(configuration.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(configuration.present_mode)
            .clipped(true);

        let handle = device
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(RenderError::SwapchainCreationFailed)?;

        let mut state = Self {
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            configuration,
        };

        // A partially built chain is released in the normal teardown order
        if let Err(e) = state.populate(device, render_pass) {
            state.destroy(device);
            return Err(e);
        }

        log::info!("Created swapchain with {} images", state.images.len());
        Ok(state)
    }

    unsafe fn populate(&mut self, device: &VulkanDevice, render_pass: vk::RenderPass) -> Result<()> {
        self.images = device
            .swapchain_loader
            .get_swapchain_images(self.handle)
            .map_err(RenderError::SwapchainCreationFailed)?;

        for (index, &image) in self.images.iter().enumerate() {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.configuration.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = device
                .device
                .create_image_view(&view_info, None)
                .map_err(|result| RenderError::ImageViewCreationFailed { index, result })?;
            self.image_views.push(view);
        }

        let extent = self.configuration.extent;
        for (index, &view) in self.image_views.iter().enumerate() {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = device
                .device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|result| RenderError::FramebufferCreationFailed { index, result })?;
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// Framebuffers, then views, then the swapchain itself
    ///
    /// # Safety
    /// The device must be idle with respect to these images.
    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        for framebuffer in self.framebuffers.drain(..) {
            device.device.destroy_framebuffer(framebuffer, None);
        }
        for view in self.image_views.drain(..) {
            device.device.destroy_image_view(view, None);
        }
        self.images.clear();
        device.swapchain_loader.destroy_swapchain(self.handle, None);
        self.handle = vk::SwapchainKHR::null();
    }

    /// Acquire next image for rendering, waiting as long as it takes
    pub fn acquire_next_image(
        &self,
        loader: &ash::khr::swapchain::Device,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool)> {
        let result = unsafe { loader.acquire_next_image(self.handle, u64::MAX, signal, vk::Fence::null()) };

        match result {
            Ok(acquired) => Ok(acquired),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SurfaceInvalidated),
            Err(e) => Err(RenderError::AcquireFailed(e)),
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentStatus> {
        let wait_semaphores = [wait];
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SurfaceInvalidated),
            Err(e) => Err(RenderError::PresentationFailed(e)),
        }
    }
}

/// Holds the current swapchain, if the surface currently has area
#[derive(Default)]
pub struct SwapchainManager {
    state: Option<SwapchainState>,
}

impl SwapchainManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&SwapchainState> {
        self.state.as_ref()
    }

    /// Negotiate against fresh surface queries and build a new swapchain
    ///
    /// Returns false, building nothing, while the surface has no area.
    ///
    /// # Safety
    /// No previous swapchain may exist; call `teardown` first.
    pub unsafe fn build(
        &mut self,
        ctx: &RenderingContext,
        render_pass: vk::RenderPass,
        framebuffer_size: (u32, u32),
    ) -> Result<bool> {
        let support = SurfaceSupport::query(
            &ctx.instance.surface_loader,
            ctx.device.physical_device,
            ctx.instance.surface,
        )?;
        let configuration = support.negotiate(framebuffer_size)?;

        if !configuration.has_area() {
            log::debug!("Surface has no area, deferring swapchain creation");
            return Ok(false);
        }

        self.state = Some(SwapchainState::create(
            &ctx.device,
            ctx.instance.surface,
            configuration,
            &support.capabilities,
            render_pass,
        )?);
        Ok(true)
    }

    /// Wait for the device, drop the current chain and build a new one
    ///
    /// # Safety
    /// `render_pass` must stay valid for the new chain's lifetime.
    pub unsafe fn recreate(
        &mut self,
        ctx: &RenderingContext,
        render_pass: vk::RenderPass,
        framebuffer_size: (u32, u32),
    ) -> Result<bool> {
        ctx.device.wait_idle()?;
        self.teardown(ctx);
        self.build(ctx, render_pass, framebuffer_size)
    }

    /// # Safety
    /// The device must be idle with respect to the current chain.
    pub unsafe fn teardown(&mut self, ctx: &RenderingContext) {
        if let Some(mut state) = self.state.take() {
            state.destroy(&ctx.device);
        }
    }
}
