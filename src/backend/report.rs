// Device report - dump what every GPU offers for this surface
//
// Only used with `debug.print_device_info`; query failures are logged and
// skipped rather than aborting startup.

use super::device::{device_name, REQUIRED_DEVICE_EXTENSIONS};
use super::instance::VulkanInstance;
use ash::vk;

/// # Safety
/// The instance, its surface and `physical_device` must be valid.
pub unsafe fn log_device_report(instance: &VulkanInstance, index: usize, physical_device: vk::PhysicalDevice) {
    let vk_instance = &instance.instance;
    let properties = vk_instance.get_physical_device_properties(physical_device);

    log::info!("device[{}]: {}", index, device_name(&properties));
    log::info!("\ttype = {:?}", properties.device_type);
    log::info!(
        "\tapi version = {}.{}.{}",
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    );

    let swapchain_supported = vk_instance
        .enumerate_device_extension_properties(physical_device)
        .map(|extensions| {
            extensions
                .iter()
                .any(|ext| {
                    ext.extension_name_as_c_str()
                        .is_ok_and(|name| name == REQUIRED_DEVICE_EXTENSIONS[0])
                })
        })
        .unwrap_or(false);
    log::info!("\tswapchain support = {}", swapchain_supported);

    let memory = vk_instance.get_physical_device_memory_properties(physical_device);
    let heaps = &memory.memory_heaps[..memory.memory_heap_count as usize];
    log::info!("\tmemory heaps = {}", heaps.len());
    for (i, heap) in heaps.iter().enumerate() {
        log::info!("\t\theap[{}]: {} MiB {:?}", i, heap.size / (1024 * 1024), heap.flags);
    }

    let types = &memory.memory_types[..memory.memory_type_count as usize];
    log::info!("\tmemory types = {}", types.len());
    for (i, memory_type) in types.iter().enumerate() {
        log::info!(
            "\t\ttype[{}]: heap {} {:?}",
            i,
            memory_type.heap_index,
            memory_type.property_flags
        );
    }

    let families = vk_instance.get_physical_device_queue_family_properties(physical_device);
    log::info!("\tqueue families = {}", families.len());
    for (i, family) in (0u32..).zip(&families) {
        let present = instance
            .surface_loader
            .get_physical_device_surface_support(physical_device, i, instance.surface)
            .unwrap_or(false);
        log::info!(
            "\t\tfamily[{}]: {} queues {:?}, present = {}",
            i,
            family.queue_count,
            family.queue_flags,
            present
        );
    }

    let surface_loader = &instance.surface_loader;
    match surface_loader.get_physical_device_surface_formats(physical_device, instance.surface) {
        Ok(formats) => {
            for format in formats {
                log::info!("\tformat: {:?} {:?}", format.format, format.color_space);
            }
        }
        Err(e) => log::warn!("\tformat query failed: {}", e),
    }

    match surface_loader.get_physical_device_surface_present_modes(physical_device, instance.surface) {
        Ok(modes) => log::info!("\tpresent modes: {:?}", modes),
        Err(e) => log::warn!("\tpresent mode query failed: {}", e),
    }

    match surface_loader.get_physical_device_surface_capabilities(physical_device, instance.surface) {
        Ok(caps) => {
            log::info!(
                "\timage count: min = {}, max = {}",
                caps.min_image_count,
                caps.max_image_count
            );
            log::info!(
                "\textent: current = {}x{}, min = {}x{}, max = {}x{}",
                caps.current_extent.width,
                caps.current_extent.height,
                caps.min_image_extent.width,
                caps.min_image_extent.height,
                caps.max_image_extent.width,
                caps.max_image_extent.height
            );
            log::info!("\tmax image array layers = {}", caps.max_image_array_layers);
            log::info!("\tsupported usage = {:?}", caps.supported_usage_flags);
        }
        Err(e) => log::warn!("\tcapability query failed: {}", e),
    }
}
