//! GPU memory allocation and synchronous uploads
//!
//! Buffers and images come out of a VMA pool. Host-visible allocations use
//! the `Upload` class and are written through a map/flush cycle; device-local
//! data goes through a staging buffer and a one-shot transfer on the graphics
//! queue, with barriers handing the data off to its consumer stage. The
//! staging buffer is only released after the queue has drained.

use std::sync::Arc;

use ash::{vk, Device};
use vk_mem::Alloc;

use crate::commands::CommandPool;
use crate::device::DeviceContext;
use crate::error::{VulkanError, VulkanResult};
use crate::instance::VulkanInstance;

/// Where an allocation should live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryClass {
    /// Host-visible, for staging and per-frame uniform data
    Upload,
    /// Device-local, filled once through the upload path
    DeviceLocal,
}

impl MemoryClass {
    fn to_vma_create_info(self) -> vk_mem::AllocationCreateInfo {
        match self {
            // Host access must be declared up front for mapping to be legal
            Self::Upload => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
            Self::DeviceLocal => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
        }
    }
}

/// A buffer with its backing allocation
pub struct DeviceBuffer {
    allocator: Arc<vk_mem::Allocator>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
}

impl DeviceBuffer {
    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Allocation size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Write host data into an `Upload`-class buffer
    ///
    /// Maps, copies, flushes, and unmaps. The flush covers non-coherent
    /// memory types; it is a no-op on coherent ones.
    pub fn write(&mut self, data: &[u8]) -> VulkanResult<()> {
        debug_assert!(data.len() as vk::DeviceSize <= self.size);
        unsafe {
            let mapped = self
                .allocator
                .map_memory(&mut self.allocation)
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            self.allocator
                .flush_allocation(&self.allocation, 0, data.len() as _)
                .map_err(VulkanError::Api)?;
            self.allocator.unmap_memory(&mut self.allocation);
        }
        Ok(())
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        unsafe {
            self.allocator
                .destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}

/// A sampled 2D image with its backing allocation
pub struct DeviceImage {
    allocator: Arc<vk_mem::Allocator>,
    image: vk::Image,
    allocation: vk_mem::Allocation,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl DeviceImage {
    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for DeviceImage {
    fn drop(&mut self) {
        unsafe {
            self.allocator
                .destroy_image(self.image, &mut self.allocation);
        }
    }
}

/// Pooled allocator with a synchronous upload path
///
/// Uploads run on the graphics queue; every consumer of uploaded data also
/// lives there, so no cross-family ownership transfer is needed.
pub struct GpuAllocator {
    allocator: Arc<vk_mem::Allocator>,
    device: Device,
    upload_queue: vk::Queue,
    upload_pool: CommandPool,
}

impl GpuAllocator {
    /// Create the allocator for a device
    pub fn new(instance: &VulkanInstance, context: &DeviceContext) -> VulkanResult<Self> {
        let create_info = vk_mem::AllocatorCreateInfo::new(
            instance.handle(),
            context.device(),
            context.adapter().physical_device,
        );
        let allocator = vk_mem::Allocator::new(create_info).map_err(VulkanError::Api)?;
        let upload_pool =
            CommandPool::new(context.device().clone(), context.families().graphics)?;
        Ok(Self {
            allocator: Arc::new(allocator),
            device: context.device().clone(),
            upload_queue: context.graphics_queue(),
            upload_pool,
        })
    }

    /// Create a buffer in the given memory class
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        class: MemoryClass,
    ) -> VulkanResult<DeviceBuffer> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_info = class.to_vma_create_info();
        let (buffer, allocation) = unsafe {
            self.allocator
                .create_buffer(&buffer_info, &alloc_info)
                .map_err(VulkanError::Api)?
        };
        Ok(DeviceBuffer {
            allocator: Arc::clone(&self.allocator),
            buffer,
            allocation,
            size,
        })
    }

    /// Create a host-visible staging buffer already filled with `data`
    pub fn create_staging_buffer(&self, data: &[u8]) -> VulkanResult<DeviceBuffer> {
        let mut staging = self.create_buffer(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryClass::Upload,
        )?;
        staging.write(data)?;
        Ok(staging)
    }

    /// Upload `data` into a new device-local buffer
    ///
    /// `dst_access` and `dst_stage` name the first consumer, so the release
    /// barrier covers exactly the handoff (vertex reads, index reads, ...).
    pub fn upload_buffer(
        &self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
        dst_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
    ) -> VulkanResult<DeviceBuffer> {
        let staging = self.create_staging_buffer(data)?;
        let dst = self.create_buffer(
            data.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryClass::DeviceLocal,
        )?;

        let one_shot = self.upload_pool.begin_one_shot()?;
        let cmd = one_shot.buffer();
        unsafe {
            let region = vk::BufferCopy::builder()
                .size(data.len() as vk::DeviceSize)
                .build();
            self.device
                .cmd_copy_buffer(cmd, staging.handle(), dst.handle(), &[region]);

            let barrier = vk::BufferMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(dst_access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(dst.handle())
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .build();
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
        one_shot.submit_and_wait(self.upload_queue)?;
        // Queue is idle, safe to drop the staging buffer now
        drop(staging);

        log::debug!("Uploaded {} bytes to device-local buffer", data.len());
        Ok(dst)
    }

    /// Upload RGBA8 pixel data into a new sampled image
    ///
    /// Transitions undefined -> transfer-dst for the copy, then
    /// transfer-dst -> shader-read-only for fragment sampling.
    pub fn upload_image(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        pixels: &[u8],
    ) -> VulkanResult<DeviceImage> {
        let staging = self.create_staging_buffer(pixels)?;

        let extent = vk::Extent2D { width, height };
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_info = MemoryClass::DeviceLocal.to_vma_create_info();
        let (image, allocation) = unsafe {
            self.allocator
                .create_image(&image_info, &alloc_info)
                .map_err(VulkanError::Api)?
        };
        let device_image = DeviceImage {
            allocator: Arc::clone(&self.allocator),
            image,
            allocation,
            extent,
            format,
        };

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        let one_shot = self.upload_pool.begin_one_shot()?;
        let cmd = one_shot.buffer();
        unsafe {
            let to_transfer = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource_range)
                .build();
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                })
                .build();
            self.device.cmd_copy_buffer_to_image(
                cmd,
                staging.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            let to_sampled = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource_range)
                .build();
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_sampled],
            );
        }
        one_shot.submit_and_wait(self.upload_queue)?;
        drop(staging);

        log::debug!("Uploaded {width}x{height} image ({} bytes)", pixels.len());
        Ok(device_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_class_requests_host_access() {
        let info = MemoryClass::Upload.to_vma_create_info();
        assert!(matches!(info.usage, vk_mem::MemoryUsage::AutoPreferHost));
        assert!(info
            .flags
            .contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE));
    }

    #[test]
    fn device_local_class_prefers_device_memory() {
        let info = MemoryClass::DeviceLocal.to_vma_create_info();
        assert!(matches!(info.usage, vk_mem::MemoryUsage::AutoPreferDevice));
        assert!(info.flags.is_empty());
    }
}
