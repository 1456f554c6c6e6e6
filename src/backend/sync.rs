// Synchronization primitives and the command buffer
//
// One frame in flight: a single fence, two semaphores and one command buffer
// that is reset and re-recorded every cycle.

use super::error::{RenderError, Result};
use ash::vk;

pub struct FrameSync {
    /// Signalled by acquire, waited on by the submit
    pub image_acquired: vk::Semaphore,
    /// Signalled by the submit, waited on by present
    pub render_finished: vk::Semaphore,
    /// Signalled when the GPU finished the submitted work
    pub frame_complete: vk::Fence,
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSync {
    /// # Safety
    /// The device must be valid and `graphics_family` one of its queue families.
    pub unsafe fn new(device: &ash::Device, graphics_family: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_family);

        let command_pool = device
            .create_command_pool(&pool_info, None)
            .map_err(RenderError::SyncCreationFailed)?;

        let mut sync = Self {
            image_acquired: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            frame_complete: vk::Fence::null(),
            command_pool,
            command_buffer: vk::CommandBuffer::null(),
        };

        if let Err(e) = sync.populate(device) {
            sync.destroy(device);
            return Err(e);
        }

        Ok(sync)
    }

    unsafe fn populate(&mut self, device: &ash::Device) -> Result<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        self.command_buffer = device
            .allocate_command_buffers(&alloc_info)
            .map_err(RenderError::SyncCreationFailed)?[0];

        self.create_signals(device)
    }

    unsafe fn create_signals(&mut self, device: &ash::Device) -> Result<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first wait returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        self.image_acquired = device
            .create_semaphore(&semaphore_info, None)
            .map_err(RenderError::SyncCreationFailed)?;
        self.render_finished = device
            .create_semaphore(&semaphore_info, None)
            .map_err(RenderError::SyncCreationFailed)?;
        self.frame_complete = device
            .create_fence(&fence_info, None)
            .map_err(RenderError::SyncCreationFailed)?;

        Ok(())
    }

    /// Replace both semaphores and the fence once their state is unknown
    ///
    /// Waits for the device first; the fence comes back signaled.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn rebuild_signals(&mut self, device: &ash::Device) -> Result<()> {
        device.device_wait_idle().map_err(RenderError::SyncCreationFailed)?;

        device.destroy_fence(self.frame_complete, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_acquired, None);
        self.frame_complete = vk::Fence::null();
        self.render_finished = vk::Semaphore::null();
        self.image_acquired = vk::Semaphore::null();

        self.create_signals(device)
    }

    /// Null handles are skipped by the driver, so a partially built value is fine
    ///
    /// # Safety
    /// None of the objects may still be in use by the GPU.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.frame_complete, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_acquired, None);
        // Frees the command buffer as well
        device.destroy_command_pool(self.command_pool, None);
    }
}
