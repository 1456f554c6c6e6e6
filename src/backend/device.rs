// Vulkan Device - GPU selection and logical device
//
// Responsibilities:
// - Physical device selection (discrete beats integrated, then more VRAM)
// - Required device extension check on the chosen GPU
// - Logical device + graphics/present queue creation

use super::error::{RenderError, Result};
use super::instance::missing_names;
use super::queue::QueueFamilyIndices;
use ash::vk;
use std::ffi::{c_char, CStr};

/// Device extensions the renderer cannot run without
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Integrated,
    Discrete,
    Other,
}

impl DeviceClass {
    pub fn from_device_type(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            _ => Self::Other,
        }
    }
}

/// Snapshot of one enumerated GPU, only used while selecting
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub class: DeviceClass,
    /// Size of the first DEVICE_LOCAL heap, 0 if there is none
    pub device_local_memory: vk::DeviceSize,
}

impl DeviceCandidate {
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(handle);
        let memory = instance.get_physical_device_memory_properties(handle);

        let device_local_memory = memory.memory_heaps[..memory.memory_heap_count as usize]
            .iter()
            .find(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map_or(0, |heap| heap.size);

        Self {
            handle,
            name: device_name(&properties),
            class: DeviceClass::from_device_type(properties.device_type),
            device_local_memory,
        }
    }
}

pub fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

/// Enumerate every physical device the instance exposes
///
/// # Safety
/// The instance must be valid.
pub unsafe fn enumerate_candidates(instance: &ash::Instance) -> Result<Vec<DeviceCandidate>> {
    let devices = instance
        .enumerate_physical_devices()
        .map_err(|_| RenderError::NoSuitableDevice)?;

    Ok(devices
        .into_iter()
        .map(|device| DeviceCandidate::query(instance, device))
        .collect())
}

/// Pick one GPU from `candidates`, evaluated in enumeration order
///
/// Devices that are neither integrated nor discrete are rejected. A discrete
/// device always displaces an integrated one; within one class only strictly
/// more device-local memory displaces the current choice.
pub fn select_device(candidates: &[DeviceCandidate]) -> Result<&DeviceCandidate> {
    let mut best: Option<&DeviceCandidate> = None;

    for (i, candidate) in candidates.iter().enumerate() {
        let current_best = best;
        let decision = match current_best {
            _ if candidate.class == DeviceClass::Other => "not a gpu",
            None => {
                best = Some(candidate);
                "first available"
            }
            Some(current)
                if candidate.class == DeviceClass::Discrete
                    && current.class == DeviceClass::Integrated =>
            {
                best = Some(candidate);
                "integrated to discrete"
            }
            Some(current)
                if candidate.class == current.class
                    && candidate.device_local_memory > current.device_local_memory =>
            {
                best = Some(candidate);
                "new choice has more vram"
            }
            Some(_) => "previous selection was same or better",
        };

        log::info!(
            "device[{}]: {} ({:?}) with vram = {}, {}",
            i,
            candidate.name,
            candidate.class,
            candidate.device_local_memory,
            decision
        );
    }

    best.ok_or(RenderError::NoSuitableDevice)
}

/// Fail unless `candidate` exposes every extension in `required`
///
/// # Safety
/// The instance and the candidate's handle must be valid.
pub unsafe fn check_device_extensions(
    instance: &ash::Instance,
    candidate: &DeviceCandidate,
    required: &[&CStr],
) -> Result<()> {
    let available = instance
        .enumerate_device_extension_properties(candidate.handle)
        .map_err(RenderError::DeviceCreationFailed)?;
    let names: Vec<&CStr> = available
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();

    match missing_names(required, &names).into_iter().next() {
        None => Ok(()),
        Some(extension) => Err(RenderError::MissingDeviceExtension {
            device: candidate.name.clone(),
            extension,
        }),
    }
}

/// Logical device with one queue per resolved family
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub name: String,
}

impl VulkanDevice {
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        candidate: &DeviceCandidate,
        queue_families: QueueFamilyIndices,
    ) -> Result<Self> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_ptrs: Vec<*const c_char> =
            REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = instance
            .create_device(candidate.handle, &create_info, None)
            .map_err(RenderError::DeviceCreationFailed)?;

        let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
        let present_queue = device.get_device_queue(queue_families.present, 0);
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);

        log::info!("Selected GPU: {}", candidate.name);

        Ok(Self {
            device,
            physical_device: candidate.handle,
            swapchain_loader,
            queue_families,
            graphics_queue,
            present_queue,
            name: candidate.name.clone(),
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(RenderError::FenceWaitFailed)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device {}...", self.name);
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
