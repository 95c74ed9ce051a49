//! Swapchain ownership and the presentation state machine
//!
//! `PresentTarget` is either live or invalid. Resize notifications, an
//! out-of-date acquire, and a suboptimal present all mark it invalid; the
//! caller then runs the synchronous rebuild before the next frame. Rebuild
//! ordering: wait for a non-zero drawable size, pre-rebuild hook, device
//! idle, destroy, recreate, post-rebuild hook with the new extent.

use ash::extensions::khr;
use ash::{vk, Device};

use crate::device::{DeviceContext, QueueFamilies};
use crate::error::{VulkanError, VulkanResult};
use crate::surface::{
    choose_extent, choose_format, choose_present_mode, clamp_image_count, SurfaceProperties,
    WindowSurface,
};
use crate::window::Window;

/// Callbacks around a swapchain rebuild
///
/// Implemented by whoever owns resources derived from the swapchain. The
/// pre hook runs before the device idles and the old swapchain dies; the
/// post hook runs once the replacement exists.
pub trait RebuildHooks {
    /// Release anything referencing the old swapchain images
    fn on_pre_rebuild(&mut self) -> VulkanResult<()>;
    /// Recreate extent-dependent state for the new swapchain
    fn on_post_rebuild(&mut self, extent: vk::Extent2D) -> VulkanResult<()>;
}

/// Swapchain construction preferences
#[derive(Debug, Clone)]
pub struct SwapchainDesc {
    /// Surface formats in preference order
    pub preferred_formats: Vec<vk::SurfaceFormatKHR>,
    /// Present modes in preference order; FIFO is the implicit fallback
    pub preferred_present_modes: Vec<vk::PresentModeKHR>,
    /// Requested image count before clamping
    pub requested_image_count: u32,
    /// Allow the presentation engine to discard obscured pixels
    pub clipped: bool,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self {
            preferred_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            preferred_present_modes: vec![vk::PresentModeKHR::MAILBOX],
            requested_image_count: 3,
            clipped: true,
        }
    }
}

/// One live swapchain with its images and views
struct Swapchain {
    device: Device,
    loader: khr::Swapchain,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    fn create(
        device: Device,
        loader: khr::Swapchain,
        surface: vk::SurfaceKHR,
        properties: &SurfaceProperties,
        desc: &SwapchainDesc,
        families: QueueFamilies,
        preferred_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        properties.ensure_usable()?;
        let format = choose_format(&desc.preferred_formats, &properties.formats);
        let present_mode =
            choose_present_mode(&desc.preferred_present_modes, &properties.present_modes);
        let extent = choose_extent(&properties.capabilities, preferred_extent);
        let image_count = clamp_image_count(desc.requested_image_count, &properties.capabilities);

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(properties.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(desc.clipped);

        let shared_families = [families.graphics, families.present];
        if families.split_presentation() {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&shared_families);
        } else {
            create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let handle = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        let images = unsafe {
            loader
                .get_swapchain_images(handle)
                .map_err(VulkanError::Api)?
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe {
                device
                    .create_image_view(&view_info, None)
                    .map_err(VulkanError::Api)?
            };
            views.push(view);
        }

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}/{:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            device,
            loader,
            handle,
            images,
            views,
            format,
            extent,
        })
    }
}

impl Swapchain {
    /// Destroy the views and the swapchain, leaving a null handle behind
    ///
    /// The surface tolerates only one live swapchain, so the old one must be
    /// gone before a replacement is created.
    fn release(&mut self) {
        unsafe {
            // Views before the swapchain that owns their images
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
                self.handle = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.release();
    }
}

/// The presentation surface manager
///
/// Owns the live swapchain and tracks whether it still matches the surface.
pub struct PresentTarget {
    device: Device,
    physical_device: vk::PhysicalDevice,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    swapchain_loader: khr::Swapchain,
    present_queue: vk::Queue,
    families: QueueFamilies,
    desc: SwapchainDesc,
    swapchain: Swapchain,
    invalid: bool,
}

impl PresentTarget {
    /// Build the initial swapchain for a window surface
    pub fn new(
        instance: &crate::instance::VulkanInstance,
        context: &DeviceContext,
        surface: &WindowSurface,
        desc: SwapchainDesc,
        preferred_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let swapchain_loader = khr::Swapchain::new(instance.handle(), context.device());
        let properties = SurfaceProperties::query(
            surface.loader(),
            surface.handle(),
            context.adapter().physical_device,
        )?;
        let swapchain = Swapchain::create(
            context.device().clone(),
            swapchain_loader.clone(),
            surface.handle(),
            &properties,
            &desc,
            context.families(),
            preferred_extent,
        )?;

        Ok(Self {
            device: context.device().clone(),
            physical_device: context.adapter().physical_device,
            surface_loader: surface.loader().clone(),
            surface: surface.handle(),
            swapchain_loader,
            present_queue: context.present_queue(),
            families: context.families(),
            desc,
            swapchain,
            invalid: false,
        })
    }

    /// Chosen surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.swapchain.format
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Number of images in the current swapchain
    pub fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }

    /// Image view for a given swapchain image index
    pub fn view(&self, image_index: u32) -> vk::ImageView {
        self.swapchain.views[image_index as usize]
    }

    /// The window changed size; the swapchain no longer matches
    pub fn notify_resize(&mut self) {
        if !self.invalid {
            log::debug!("Resize notification, swapchain marked invalid");
        }
        self.invalid = true;
    }

    /// Whether a rebuild is required before rendering
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Acquire the next image, signaling `semaphore` when it is ready
    ///
    /// Returns `None` when the swapchain is (or just became) invalid; the
    /// caller skips the frame and rebuilds. A suboptimal acquire still
    /// yields the image but flags the rebuild for afterwards.
    pub fn acquire(&mut self, semaphore: vk::Semaphore) -> VulkanResult<Option<u32>> {
        if self.invalid {
            return Ok(None);
        }
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    self.invalid = true;
                }
                Ok(Some(image_index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.invalid = true;
                Ok(None)
            }
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    /// Queue the image for presentation after `wait` signals
    ///
    /// Out-of-date and suboptimal results mark the target invalid instead of
    /// failing; everything else is fatal.
    pub fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<()> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
        };
        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    self.invalid = true;
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.invalid = true;
                Ok(())
            }
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    /// Synchronously rebuild the swapchain
    ///
    /// Blocks while the window reports a zero extent. The hooks bracket the
    /// destroy/recreate so derived resources never dangle.
    pub fn rebuild(
        &mut self,
        window: &mut Window,
        hooks: &mut dyn RebuildHooks,
    ) -> VulkanResult<()> {
        let preferred_extent = window.wait_for_valid_extent();

        hooks.on_pre_rebuild()?;
        unsafe {
            self.device.device_wait_idle().map_err(VulkanError::Api)?;
        }

        // Old views and swapchain go first; the surface rejects a second
        // live swapchain. If creation fails below, the target stays invalid
        // and acquire keeps returning None.
        self.swapchain.release();

        let properties =
            SurfaceProperties::query(&self.surface_loader, self.surface, self.physical_device)?;

        self.swapchain = Swapchain::create(
            self.device.clone(),
            self.swapchain_loader.clone(),
            self.surface,
            &properties,
            &self.desc,
            self.families,
            preferred_extent,
        )?;
        self.invalid = false;

        hooks.on_post_rebuild(self.swapchain.extent)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_desc_prefers_srgb_and_mailbox() {
        let desc = SwapchainDesc::default();
        assert_eq!(desc.preferred_formats[0].format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(desc.preferred_present_modes[0], vk::PresentModeKHR::MAILBOX);
        assert!(desc.clipped);
    }
}
