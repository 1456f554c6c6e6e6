// Rendering context - instance, surface and logical device bring-up
//
// Threaded by reference through every later stage instead of living in
// globals. Field order is drop order: the device goes before the instance.

use super::device::{
    check_device_extensions, enumerate_candidates, select_device, VulkanDevice,
    REQUIRED_DEVICE_EXTENSIONS,
};
use super::error::Result;
use super::instance::VulkanInstance;
use super::queue::find_queue_families;
use super::report::log_device_report;
use crate::config::Config;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub struct RenderingContext {
    pub device: VulkanDevice,
    pub instance: VulkanInstance,
}

impl RenderingContext {
    pub fn new<W>(window: &W, config: &Config) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let instance = VulkanInstance::new(window, &config.window.title, config.validation_enabled())?;
        log::info!(
            "Validation layers: {}",
            if instance.validation_enabled() { "enabled" } else { "disabled" }
        );

        let device = unsafe {
            let candidates = enumerate_candidates(&instance.instance)?;

            if config.debug.print_device_info {
                for (i, candidate) in candidates.iter().enumerate() {
                    log_device_report(&instance, i, candidate.handle);
                }
            }

            let chosen = select_device(&candidates)?;
            check_device_extensions(&instance.instance, chosen, &REQUIRED_DEVICE_EXTENSIONS)?;

            let queue_families = find_queue_families(
                &instance.instance,
                &instance.surface_loader,
                chosen.handle,
                instance.surface,
            )?;

            VulkanDevice::new(&instance.instance, chosen, queue_families)?
        };

        Ok(Self { device, instance })
    }
}
