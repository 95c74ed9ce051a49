//! Sampled 2D textures
//!
//! Decodes with the `image` crate, uploads through the allocator's staging
//! path, and owns the view and sampler for descriptor binding.

use std::path::Path;

use ash::{vk, Device};

use crate::alloc::{DeviceImage, GpuAllocator};
use crate::error::{VulkanError, VulkanResult};

/// A device-local texture ready for fragment sampling
pub struct Texture {
    device: Device,
    view: vk::ImageView,
    sampler: vk::Sampler,
    image: DeviceImage,
}

impl Texture {
    /// Load an image file and upload it
    pub fn from_file<P: AsRef<Path>>(
        device: Device,
        allocator: &GpuAllocator,
        path: P,
    ) -> VulkanResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|e| VulkanError::ImageLoad(format!("{}: {e}", path.display())))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Self::from_rgba8(device, allocator, width, height, decoded.as_raw())
    }

    /// Upload raw RGBA8 pixels as an sRGB texture
    pub fn from_rgba8(
        device: Device,
        allocator: &GpuAllocator,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> VulkanResult<Self> {
        if pixels.len() != (width as usize) * (height as usize) * 4 {
            return Err(VulkanError::ImageLoad(format!(
                "pixel data is {} bytes, expected {} for {width}x{height} RGBA8",
                pixels.len(),
                (width as usize) * (height as usize) * 4
            )));
        }
        let image =
            allocator.upload_image(width, height, vk::Format::R8G8B8A8_SRGB, pixels)?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format())
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

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);
        let sampler = unsafe {
            device
                .create_sampler(&sampler_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            view,
            sampler,
            image,
        })
    }

    /// Generate a two-tone checkerboard, `cells` squares per side
    ///
    /// Keeps the texture lab runnable without a bundled asset.
    pub fn checkerboard(
        device: Device,
        allocator: &GpuAllocator,
        size: u32,
        cells: u32,
    ) -> VulkanResult<Self> {
        let cell = (size / cells).max(1);
        let mut pixels = Vec::with_capacity((size as usize) * (size as usize) * 4);
        for y in 0..size {
            for x in 0..size {
                let dark = ((x / cell) + (y / cell)) % 2 == 0;
                if dark {
                    pixels.extend_from_slice(&[40, 40, 40, 255]);
                } else {
                    pixels.extend_from_slice(&[230, 230, 230, 255]);
                }
            }
        }
        Self::from_rgba8(device, allocator, size, size, &pixels)
    }

    /// Image view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Texture extent
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.view, None);
        }
        // The image itself is released by DeviceImage afterwards
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn checkerboard_pattern_alternates() {
        // Reproduce the generator's cell math for a 4x4, 2-cell board
        let size = 4u32;
        let cell = size / 2;
        let dark_at = |x: u32, y: u32| ((x / cell) + (y / cell)) % 2 == 0;
        assert!(dark_at(0, 0));
        assert!(!dark_at(2, 0));
        assert!(!dark_at(0, 2));
        assert!(dark_at(2, 2));
    }
}
