// Queue family resolution
//
// Graphics and presentation may live on different families. Presentation
// support is asked per (device, family index, surface) and never cached.

use super::error::{RenderError, Result};
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Whether a single family serves both roles
    pub fn is_unified(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct families, one queue gets created per entry
    pub fn unique(&self) -> Vec<u32> {
        if self.is_unified() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Scan `families` in index order and stop as soon as both roles are filled
///
/// `supports_present` is called once per visited family.
pub fn resolve_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> Result<QueueFamilyIndices>
where
    F: FnMut(u32) -> Result<bool>,
{
    let mut graphics = None;
    let mut present = None;

    for (index, family) in (0u32..).zip(families) {
        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }

        if present.is_none() && supports_present(index)? {
            present = Some(index);
        }

        if graphics.is_some() && present.is_some() {
            break;
        }
    }

    match (graphics, present) {
        (Some(graphics), Some(present)) => {
            log::info!("Queue families: graphics = {}, present = {}", graphics, present);
            Ok(QueueFamilyIndices { graphics, present })
        }
        _ => Err(RenderError::QueueFamilyNotFound),
    }
}

/// Resolve queue families of `physical_device` against `surface`
///
/// # Safety
/// All handles must be valid.
pub unsafe fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilyIndices> {
    let families = instance.get_physical_device_queue_family_properties(physical_device);

    resolve_queue_families(&families, |index| {
        surface_loader
            .get_physical_device_surface_support(physical_device, index, surface)
            .map_err(RenderError::SurfaceQueryFailed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn stops_scanning_once_both_roles_resolve() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];
        let mut queried = Vec::new();

        let indices = resolve_queue_families(&families, |index| {
            queried.push(index);
            Ok(index == 1)
        })
        .unwrap();

        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 1 });
        assert_eq!(queried, vec![0, 1]);
        assert!(indices.is_unified());
        assert_eq!(indices.unique(), vec![1]);
    }

    #[test]
    fn graphics_and_present_can_differ() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];

        let indices = resolve_queue_families(&families, |index| Ok(index == 2)).unwrap();

        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 2 });
        assert_eq!(indices.unique(), vec![0, 2]);
    }

    #[test]
    fn first_matching_family_wins() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];

        let indices = resolve_queue_families(&families, |index| Ok(index >= 1)).unwrap();

        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.present, 1);
    }

    #[test]
    fn missing_present_support_is_fatal() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::COMPUTE)];

        let result = resolve_queue_families(&families, |_| Ok(false));

        assert!(matches!(result, Err(RenderError::QueueFamilyNotFound)));
    }

    #[test]
    fn missing_graphics_is_fatal() {
        let families = [family(vk::QueueFlags::TRANSFER)];

        let result = resolve_queue_families(&families, |_| Ok(true));

        assert!(matches!(result, Err(RenderError::QueueFamilyNotFound)));
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];

        let result = resolve_queue_families(&families, |_| {
            Err(RenderError::SurfaceQueryFailed(vk::Result::ERROR_SURFACE_LOST_KHR))
        });

        assert!(matches!(result, Err(RenderError::SurfaceQueryFailed(_))));
    }
}
