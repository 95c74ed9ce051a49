//! Physical device selection and logical device creation
//!
//! Adapters are filtered in enumeration order and the first one satisfying
//! every requirement wins. The logical device exposes one queue per distinct
//! family for the graphics, transfer, and present roles; on most hardware
//! these collapse onto a single family and a single queue.

use std::collections::HashSet;
use std::ffi::CStr;

use ash::extensions::khr::{Surface, Swapchain};
use ash::vk;

use crate::error::{VulkanError, VulkanResult};
use crate::instance::VulkanInstance;

/// Queue family indices for the three queue roles
///
/// Indices may alias when one family covers several roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Family used for rendering and one-shot uploads
    pub graphics: u32,
    /// Family with explicit transfer capability
    pub transfer: u32,
    /// Family that can present to the target surface
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, for queue creation and sharing decisions
    pub fn unique(&self) -> HashSet<u32> {
        HashSet::from([self.graphics, self.transfer, self.present])
    }

    /// Whether presentation runs on a different family than graphics
    pub fn split_presentation(&self) -> bool {
        self.graphics != self.present
    }
}

/// A physical device that passed adapter filtering
pub struct AdapterInfo {
    /// Raw physical device handle
    pub physical_device: vk::PhysicalDevice,
    /// Device properties captured at selection time
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue family assignment for this adapter
    pub families: QueueFamilies,
}

impl AdapterInfo {
    /// Human-readable device name from the driver
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
) -> VulkanResult<Option<QueueFamilies>> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics = None;
    let mut transfer = None;
    let mut present = None;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        if transfer.is_none() && family.queue_flags.contains(vk::QueueFlags::TRANSFER) {
            transfer = Some(index);
        }
        if present.is_none() {
            let supported = unsafe {
                surface_loader
                    .get_physical_device_surface_support(physical_device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            if supported {
                present = Some(index);
            }
        }
    }

    // Graphics families support transfer even when the flag is absent
    let transfer = transfer.or(graphics);

    Ok(match (graphics, transfer, present) {
        (Some(graphics), Some(transfer), Some(present)) => Some(QueueFamilies {
            graphics,
            transfer,
            present,
        }),
        _ => None,
    })
}

fn supports_device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> VulkanResult<bool> {
    let available = unsafe {
        instance
            .enumerate_device_extension_properties(physical_device)
            .map_err(VulkanError::Api)?
    };
    let swapchain_name = Swapchain::name();
    Ok(available.iter().any(|ext| {
        (unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }) == swapchain_name
    }))
}

fn has_surface_support(
    physical_device: vk::PhysicalDevice,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
) -> VulkanResult<bool> {
    let formats = unsafe {
        surface_loader
            .get_physical_device_surface_formats(physical_device, surface)
            .map_err(VulkanError::Api)?
    };
    let present_modes = unsafe {
        surface_loader
            .get_physical_device_surface_present_modes(physical_device, surface)
            .map_err(VulkanError::Api)?
    };
    Ok(!formats.is_empty() && !present_modes.is_empty())
}

/// Select the first adapter satisfying all requirements
///
/// Requirements: a graphics-capable family, a family that can present to
/// `surface`, the swapchain device extension, and at least one surface
/// format and present mode. Enumeration order is preserved, so the driver's
/// preferred device wins ties.
pub fn select_adapter(
    instance: &VulkanInstance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
) -> VulkanResult<AdapterInfo> {
    let handle = instance.handle();
    let devices = unsafe {
        handle
            .enumerate_physical_devices()
            .map_err(VulkanError::Api)?
    };

    for physical_device in devices {
        let properties = unsafe { handle.get_physical_device_properties(physical_device) };

        let Some(families) = find_queue_families(handle, physical_device, surface_loader, surface)?
        else {
            continue;
        };
        if !supports_device_extensions(handle, physical_device)? {
            continue;
        }
        if !has_surface_support(physical_device, surface_loader, surface)? {
            continue;
        }

        let info = AdapterInfo {
            physical_device,
            properties,
            families,
        };
        log::info!(
            "Selected adapter: {} ({:?}), queue families {:?}",
            info.name(),
            info.properties.device_type,
            info.families
        );
        return Ok(info);
    }

    Err(VulkanError::NoSuitableAdapter)
}

/// Logical device with its three role queues
pub struct DeviceContext {
    device: ash::Device,
    adapter: AdapterInfo,
    graphics_queue: vk::Queue,
    transfer_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl DeviceContext {
    /// Create the logical device with one queue per distinct family
    pub fn new(instance: &VulkanInstance, adapter: AdapterInfo) -> VulkanResult<Self> {
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = adapter
            .families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_ptrs = [Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(adapter.physical_device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let families = adapter.families;
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let transfer_queue = unsafe { device.get_device_queue(families.transfer, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        log::debug!("Logical device created on {}", adapter.name());

        Ok(Self {
            device,
            adapter,
            graphics_queue,
            transfer_queue,
            present_queue,
        })
    }

    /// Device handle, cheap to clone into RAII wrappers
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// The adapter this device was created on
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Queue family assignment
    pub fn families(&self) -> QueueFamilies {
        self.adapter.families
    }

    /// Graphics queue handle
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Transfer queue handle (may alias the graphics queue)
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    /// Present queue handle (may alias the graphics queue)
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Block until all queues on the device are idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliased_families_collapse_to_one_queue_info() {
        let families = QueueFamilies {
            graphics: 0,
            transfer: 0,
            present: 0,
        };
        assert_eq!(families.unique().len(), 1);
        assert!(!families.split_presentation());
    }

    #[test]
    fn distinct_families_are_all_created() {
        let families = QueueFamilies {
            graphics: 0,
            transfer: 1,
            present: 2,
        };
        assert_eq!(families.unique().len(), 3);
        assert!(families.split_presentation());
    }

    #[test]
    fn split_presentation_detected() {
        let families = QueueFamilies {
            graphics: 0,
            transfer: 0,
            present: 1,
        };
        assert!(families.split_presentation());
        assert_eq!(families.unique().len(), 2);
    }
}
