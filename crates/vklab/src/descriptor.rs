//! Descriptor set layouts, pools, and writes

use ash::{vk, Device};

use crate::error::{VulkanError, VulkanResult};

/// Builder for descriptor set layouts
///
/// Bindings are added in order; the binding index is the call order.
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Start an empty layout
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(mut self, stages: vk::ShaderStageFlags) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(self.bindings.len() as u32)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)
            .build();
        self.bindings.push(binding);
        self
    }

    /// Add a combined image sampler binding
    #[must_use]
    pub fn add_combined_image_sampler(mut self, stages: vk::ShaderStageFlags) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(self.bindings.len() as u32)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stages)
            .build();
        self.bindings.push(binding);
        self
    }

    /// Whether any bindings were added
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Build the layout
    pub fn build(self, device: Device) -> VulkanResult<DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(DescriptorSetLayout {
            device,
            layout,
            bindings: self.bindings,
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout with RAII cleanup
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// The bindings this layout was built from
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool sized for one set per frame slot
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool able to allocate `set_count` sets of `layout`
    pub fn new(device: Device, layout: &DescriptorSetLayout, set_count: u32) -> VulkanResult<Self> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = layout
            .bindings()
            .iter()
            .map(|binding| vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: binding.descriptor_count * set_count,
            })
            .collect();

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(set_count)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, pool })
    }

    /// Allocate `count` sets with the given layout
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Point a uniform buffer binding at a buffer
    pub fn write_uniform_buffer(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        let buffer_info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        };
        let buffer_infos = [buffer_info];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos)
            .build();
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }

    /// Point a combined image sampler binding at a texture
    pub fn write_combined_image_sampler(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) {
        let image_info = vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let image_infos = [image_info];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos)
            .build();
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_take_sequential_indices() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(vk::ShaderStageFlags::VERTEX)
            .add_combined_image_sampler(vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(builder.bindings[0].binding, 0);
        assert_eq!(
            builder.bindings[0].descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(builder.bindings[1].binding, 1);
        assert_eq!(
            builder.bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn empty_builder_reports_empty() {
        assert!(DescriptorSetLayoutBuilder::new().is_empty());
        assert!(!DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(vk::ShaderStageFlags::VERTEX)
            .is_empty());
    }
}
