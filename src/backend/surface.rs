// Surface negotiation - turn capability queries into concrete swapchain parameters
//
// Format, present mode, extent and image count are derived independently.
// Re-run on every swapchain recreation with fresh capability queries.

use super::error::{RenderError, Result};
use ash::vk;

/// The only accepted surface format; there is no fallback
pub const REQUIRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Concrete parameters the swapchain is built with
#[derive(Debug, Clone, Copy)]
pub struct SurfaceConfiguration {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SurfaceConfiguration {
    /// A minimized window reports a zero-sized surface; nothing can be built then
    pub fn has_area(&self) -> bool {
        self.extent.width > 0 && self.extent.height > 0
    }
}

/// Raw capability queries for one (device, surface) pair
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
}

impl SurfaceSupport {
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let capabilities = surface_loader
            .get_physical_device_surface_capabilities(physical_device, surface)
            .map_err(RenderError::SurfaceQueryFailed)?;
        let formats = surface_loader
            .get_physical_device_surface_formats(physical_device, surface)
            .map_err(RenderError::SurfaceQueryFailed)?;

        Ok(Self {
            capabilities,
            formats,
        })
    }

    /// Derive the full configuration for a drawable of `framebuffer_size` pixels
    pub fn negotiate(&self, framebuffer_size: (u32, u32)) -> Result<SurfaceConfiguration> {
        let configuration = SurfaceConfiguration {
            format: choose_surface_format(&self.formats)?,
            present_mode: choose_present_mode(),
            extent: choose_extent(&self.capabilities, framebuffer_size),
            image_count: choose_image_count(&self.capabilities),
        };

        log::debug!(
            "Surface configuration: {:?} {:?}, {:?}, {}x{}, {} images",
            configuration.format.format,
            configuration.format.color_space,
            configuration.present_mode,
            configuration.extent.width,
            configuration.extent.height,
            configuration.image_count
        );

        Ok(configuration)
    }
}

pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|f| f.format == REQUIRED_FORMAT.format && f.color_space == REQUIRED_FORMAT.color_space)
        .ok_or(RenderError::NoSuitableFormat)
}

/// FIFO is the one mode every implementation must support
pub fn choose_present_mode() -> vk::PresentModeKHR {
    vk::PresentModeKHR::FIFO
}

/// Current extent verbatim, unless the surface leaves it to the swapchain
/// (width == u32::MAX); then the framebuffer size clamped per axis.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;

    // Not `clamp`: that panics on a driver reporting min > max
    vk::Extent2D {
        width: width.min(max.width).max(min.width),
        height: height.min(max.height).max(min.height),
    }
}

/// One more than the minimum, capped by a nonzero maximum (0 = unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let requested = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && requested > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn image_count_capped_by_maximum() {
        assert_eq!(choose_image_count(&capabilities((800, 600), 2, 3)), 3);
        assert_eq!(choose_image_count(&capabilities((800, 600), 3, 3)), 3);
    }

    #[test]
    fn zero_maximum_means_unbounded() {
        assert_eq!(choose_image_count(&capabilities((800, 600), 2, 0)), 3);
    }

    #[test]
    fn sentinel_extent_uses_framebuffer_size() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 0);

        let extent = choose_extent(&caps, (1920, 1080));

        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn sentinel_extent_clamps_each_axis() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 0);

        let extent = choose_extent(&caps, (8000, 0));

        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn current_extent_is_used_verbatim() {
        let caps = capabilities((1280, 720), 2, 0);

        let extent = choose_extent(&caps, (1920, 1080));

        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn srgb_bgra_is_required() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            REQUIRED_FORMAT,
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);

        let without = [formats[0]];
        assert!(matches!(choose_surface_format(&without), Err(RenderError::NoSuitableFormat)));
    }

    #[test]
    fn matching_format_needs_matching_color_space() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        }];
        assert!(matches!(choose_surface_format(&formats), Err(RenderError::NoSuitableFormat)));
    }

    #[test]
    fn negotiation_is_always_fifo() {
        let support = SurfaceSupport {
            capabilities: capabilities((1024, 768), 2, 8),
            formats: vec![REQUIRED_FORMAT],
        };

        let configuration = support.negotiate((1, 1)).unwrap();

        assert_eq!(configuration.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(configuration.image_count, 3);
        assert_eq!(configuration.extent.width, 1024);
        assert!(configuration.has_area());
    }

    #[test]
    fn minimized_surface_has_no_area() {
        let support = SurfaceSupport {
            capabilities: capabilities((0, 0), 2, 0),
            formats: vec![REQUIRED_FORMAT],
        };

        assert!(!support.negotiate((0, 0)).unwrap().has_area());
    }

    #[test]
    fn renegotiation_after_invalidation_keeps_clamp_invariants() {
        let initial = SurfaceSupport {
            capabilities: capabilities((u32::MAX, u32::MAX), 2, 3),
            formats: vec![REQUIRED_FORMAT],
        };
        let before = initial.negotiate((800, 600)).unwrap();

        // The surface shrank its bounds and the window grew past them
        let mut refreshed = initial.clone();
        refreshed.capabilities.min_image_count = 3;
        refreshed.capabilities.max_image_count = 3;
        refreshed.capabilities.max_image_extent = vk::Extent2D {
            width: 1600,
            height: 900,
        };
        let after = refreshed.negotiate((2560, 1440)).unwrap();

        assert_eq!((before.extent.width, before.extent.height), (800, 600));
        assert_eq!((after.extent.width, after.extent.height), (1600, 900));
        let caps = &refreshed.capabilities;
        assert!(after.image_count >= caps.min_image_count && after.image_count <= caps.max_image_count);
        assert!(after.extent.width >= caps.min_image_extent.width);
        assert!(after.extent.height <= caps.max_image_extent.height);
    }
}
