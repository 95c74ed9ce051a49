//! Surface ownership and swapchain parameter selection
//!
//! The selection functions are pure so the policy is testable without a GPU:
//! format and present mode pick the first preference the surface supports,
//! the extent honors the compositor unless it delegates with the sentinel,
//! and the image count is clamped into the advertised range.

use ash::extensions::khr::Surface;
use ash::vk;

use crate::error::{VulkanError, VulkanResult};
use crate::instance::VulkanInstance;
use crate::window::Window;

/// Owned window surface with its extension loader
pub struct WindowSurface {
    loader: Surface,
    handle: vk::SurfaceKHR,
}

impl WindowSurface {
    /// Create the surface for a window
    pub fn new(instance: &VulkanInstance, window: &Window) -> VulkanResult<Self> {
        let loader = Surface::new(instance.entry(), instance.handle());
        let handle = window.create_surface(instance.handle().handle())?;
        Ok(Self { loader, handle })
    }

    /// Surface extension loader
    pub fn loader(&self) -> &Surface {
        &self.loader
    }

    /// Raw surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

/// Snapshot of what a surface supports on a given adapter
///
/// Queried fresh before every swapchain build; capabilities go stale as the
/// window changes.
pub struct SurfaceProperties {
    /// Surface capabilities (extent bounds, image count bounds, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats, driver order preserved
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceProperties {
    /// Query current surface support from the driver
    pub fn query(
        loader: &Surface,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Self> {
        unsafe {
            let capabilities = loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(VulkanError::Api)?;
            let formats = loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(VulkanError::Api)?;
            let present_modes = loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(VulkanError::Api)?;
            Ok(Self {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Fail when the surface offers no formats or no present modes
    ///
    /// Support can legitimately disappear between builds, so this runs
    /// before every swapchain creation, not just the first.
    pub fn ensure_usable(&self) -> VulkanResult<()> {
        if self.formats.is_empty() {
            return Err(VulkanError::UnsupportedCapability(
                "surface formats".to_string(),
            ));
        }
        if self.present_modes.is_empty() {
            return Err(VulkanError::UnsupportedCapability(
                "surface present modes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pick the first preferred format the surface supports
///
/// Falls back to the driver's first format when no preference matches;
/// `supported` must be non-empty (see [`SurfaceProperties::ensure_usable`]).
pub fn choose_format(
    preferred: &[vk::SurfaceFormatKHR],
    supported: &[vk::SurfaceFormatKHR],
) -> vk::SurfaceFormatKHR {
    preferred
        .iter()
        .find(|want| {
            supported
                .iter()
                .any(|have| have.format == want.format && have.color_space == want.color_space)
        })
        .copied()
        .unwrap_or_else(|| supported[0])
}

/// Pick the first preferred present mode the surface supports
///
/// FIFO is the fallback because every conformant implementation provides it.
pub fn choose_present_mode(
    preferred: &[vk::PresentModeKHR],
    supported: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    preferred
        .iter()
        .find(|want| supported.contains(want))
        .copied()
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Resolve the swapchain extent
///
/// The compositor dictates the extent unless `current_extent.width` is the
/// `u32::MAX` sentinel, in which case the preferred size is clamped into the
/// supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    preferred: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: preferred.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: preferred.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Clamp a requested image count into the surface's supported range
///
/// `max_image_count == 0` means unbounded.
pub fn clamp_image_count(requested: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn caps(
        current: vk::Extent2D,
        min_extent: vk::Extent2D,
        max_extent: vk::Extent2D,
        min_images: u32,
        max_images: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            min_image_extent: min_extent,
            max_image_extent: max_extent,
            min_image_count: min_images,
            max_image_count: max_images,
            ..Default::default()
        }
    }

    #[test]
    fn format_prefers_first_supported_preference() {
        let supported = vec![fmt(vk::Format::R8G8B8A8_UNORM), fmt(vk::Format::B8G8R8A8_SRGB)];
        let preferred = vec![fmt(vk::Format::B8G8R8A8_SRGB), fmt(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(
            choose_format(&preferred, &supported).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn format_falls_back_to_first_supported() {
        let supported = vec![fmt(vk::Format::R5G6B5_UNORM_PACK16), fmt(vk::Format::B8G8R8A8_UNORM)];
        let preferred = vec![fmt(vk::Format::B8G8R8A8_SRGB)];
        assert_eq!(
            choose_format(&preferred, &supported).format,
            vk::Format::R5G6B5_UNORM_PACK16
        );
    }

    #[test]
    fn format_matches_on_color_space_too() {
        let mut linear = fmt(vk::Format::B8G8R8A8_SRGB);
        linear.color_space = vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT;
        let supported = vec![fmt(vk::Format::B8G8R8A8_SRGB)];
        // Same format, wrong color space: no match, falls back
        let chosen = choose_format(&[linear], &supported);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn present_mode_prefers_mailbox_when_available() {
        let supported = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let preferred = vec![vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&preferred, &supported),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let supported = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        let preferred = vec![vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&preferred, &supported),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_honors_compositor_when_fixed() {
        let capabilities = caps(
            vk::Extent2D { width: 800, height: 600 },
            vk::Extent2D { width: 1, height: 1 },
            vk::Extent2D { width: 4096, height: 4096 },
            2,
            8,
        );
        let chosen = choose_extent(&capabilities, vk::Extent2D { width: 640, height: 480 });
        assert_eq!(chosen.width, 800);
        assert_eq!(chosen.height, 600);
    }

    #[test]
    fn extent_clamps_preference_under_sentinel() {
        let capabilities = caps(
            vk::Extent2D { width: u32::MAX, height: u32::MAX },
            vk::Extent2D { width: 100, height: 100 },
            vk::Extent2D { width: 1000, height: 1000 },
            2,
            8,
        );
        let small = choose_extent(&capabilities, vk::Extent2D { width: 10, height: 10 });
        assert_eq!(small, vk::Extent2D { width: 100, height: 100 });
        let big = choose_extent(&capabilities, vk::Extent2D { width: 5000, height: 5000 });
        assert_eq!(big, vk::Extent2D { width: 1000, height: 1000 });
        let fits = choose_extent(&capabilities, vk::Extent2D { width: 640, height: 480 });
        assert_eq!(fits, vk::Extent2D { width: 640, height: 480 });
    }

    #[test]
    fn image_count_clamped_both_ways() {
        let capabilities = caps(
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            2,
            4,
        );
        assert_eq!(clamp_image_count(1, &capabilities), 2);
        assert_eq!(clamp_image_count(3, &capabilities), 3);
        assert_eq!(clamp_image_count(9, &capabilities), 4);
    }

    #[test]
    fn empty_format_list_is_rejected_before_selection() {
        let properties = SurfaceProperties {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            properties.ensure_usable(),
            Err(VulkanError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn empty_present_mode_list_is_rejected() {
        let properties = SurfaceProperties {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![fmt(vk::Format::B8G8R8A8_SRGB)],
            present_modes: Vec::new(),
        };
        assert!(matches!(
            properties.ensure_usable(),
            Err(VulkanError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn populated_surface_support_passes() {
        let properties = SurfaceProperties {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![fmt(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(properties.ensure_usable().is_ok());
    }

    #[test]
    fn zero_max_image_count_means_unbounded() {
        let capabilities = caps(
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            2,
            0,
        );
        assert_eq!(clamp_image_count(64, &capabilities), 64);
    }
}
