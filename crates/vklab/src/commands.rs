//! Command pool and one-shot submission helpers

use ash::{vk, Device};

use crate::error::{VulkanError, VulkanResult};

/// Command pool with resettable command buffers
pub struct CommandPool {
    device: Device,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool on the given queue family
    pub fn new(device: Device, queue_family: u32) -> VulkanResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let pool = unsafe {
            device
                .create_command_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, pool })
    }

    /// Allocate primary command buffers
    pub fn allocate(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Begin a one-shot command buffer for upload work
    pub fn begin_one_shot(&self) -> VulkanResult<OneShotCommands<'_>> {
        let buffer = self.allocate(1)?[0];
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }
        Ok(OneShotCommands { pool: self, buffer })
    }

    /// Pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// A recording one-shot command buffer
///
/// Record through `buffer()`, then `submit_and_wait` to run it synchronously.
/// The buffer is freed back to the pool either way.
pub struct OneShotCommands<'a> {
    pool: &'a CommandPool,
    buffer: vk::CommandBuffer,
}

impl OneShotCommands<'_> {
    /// The command buffer being recorded
    pub fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// End recording, submit to `queue`, and block until the queue drains
    pub fn submit_and_wait(self, queue: vk::Queue) -> VulkanResult<()> {
        let device = &self.pool.device;
        unsafe {
            device
                .end_command_buffer(self.buffer)
                .map_err(VulkanError::Api)?;
            let buffers = [self.buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
            device
                .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            device.queue_wait_idle(queue).map_err(VulkanError::Api)?;
        }
        Ok(())
    }
}

impl Drop for OneShotCommands<'_> {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device
                .free_command_buffers(self.pool.pool, &[self.buffer]);
        }
    }
}
