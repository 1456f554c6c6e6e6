// Vulkan instance - library loading, layer/extension probing, surface
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Debug messenger routing validation output into `log`
// - Window surface creation through ash-window

use super::error::{RenderError, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-level objects, destroyed in reverse order on drop
pub struct VulkanInstance {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    pub entry: Entry,
}

impl VulkanInstance {
    /// Create the instance and a presentation surface for `window`
    ///
    /// A missing validation layer only disables validation; a missing
    /// instance extension is fatal.
    pub fn new<W>(window: &W, app_name: &str, enable_validation: bool) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        let display_handle = window
            .display_handle()
            .map_err(|e| RenderError::SurfaceCreationFailed(e.to_string()))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| RenderError::SurfaceCreationFailed(e.to_string()))?
            .as_raw();

        let validation = enable_validation && Self::validation_layer_available(&entry)?;

        // Required extensions: whatever the window system needs, plus debug utils
        let mut extensions: Vec<&CStr> = ash_window::enumerate_required_extensions(display_handle)
            .map_err(RenderError::InstanceCreationFailed)?
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME);
        }

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(RenderError::InstanceCreationFailed)?;
        let available_names: Vec<&CStr> = available
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();
        let missing = missing_names(&extensions, &available_names);
        if !missing.is_empty() {
            return Err(RenderError::MissingInstanceExtension(missing.join(", ")));
        }

        let app_name = CString::new(app_name)
            .map_err(|_| RenderError::InstanceCreationFailed(vk::Result::ERROR_INITIALIZATION_FAILED))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained so instance creation and destruction are covered too
        let mut instance_debug_info = debug_messenger_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if validation {
            create_info = create_info.push_next(&mut instance_debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(RenderError::InstanceCreationFailed)?;

        let debug_utils = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&debug_messenger_info(), None) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    log::warn!("Failed to set up debug messenger: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        };
        let surface = match surface {
            Ok(surface) => surface,
            Err(e) => {
                unsafe {
                    if let Some((loader, messenger)) = &debug_utils {
                        loader.destroy_debug_utils_messenger(*messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(RenderError::SurfaceCreationFailed(e.to_string()));
            }
        };

        Ok(Self {
            surface,
            surface_loader,
            debug_utils,
            instance,
            entry,
        })
    }

    pub fn validation_enabled(&self) -> bool {
        self.debug_utils.is_some()
    }

    fn validation_layer_available(entry: &Entry) -> Result<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .map_err(RenderError::InstanceCreationFailed)?;
        let names: Vec<&CStr> = layers
            .iter()
            .filter_map(|layer| layer.layer_name_as_c_str().ok())
            .collect();

        if missing_names(&[VALIDATION_LAYER], &names).is_empty() {
            Ok(true)
        } else {
            log::warn!(
                "Validation layers requested, but {} is not available",
                VALIDATION_LAYER.to_string_lossy()
            );
            Ok(false)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Names from `required` that do not appear in `available`
pub fn missing_names(required: &[&CStr], available: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(*name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        _ => log::debug!("[Vulkan] {}", message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_present_means_nothing_missing() {
        let available = [c"VK_KHR_surface", c"VK_KHR_xcb_surface", c"VK_EXT_debug_utils"];
        assert!(missing_names(&[c"VK_KHR_surface", c"VK_EXT_debug_utils"], &available).is_empty());
    }

    #[test]
    fn reports_each_missing_name() {
        let available = [c"VK_KHR_surface"];
        let missing = missing_names(
            &[c"VK_KHR_surface", c"VK_KHR_wayland_surface", VALIDATION_LAYER],
            &available,
        );
        assert_eq!(missing, vec!["VK_KHR_wayland_surface", "VK_LAYER_KHRONOS_validation"]);
    }
}
