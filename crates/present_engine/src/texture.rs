//! Device-local images and their views

use crate::error::{VulkanError, VulkanResult};
use crate::memory;
use ash::{vk, Device};

/// 2D device-local image with bound memory and a color view.
///
/// Created in `UNDEFINED` layout; the transfer engine transitions it as part
/// of the upload, so a freshly created image is not yet sampleable.
pub struct TextureImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
}

impl TextureImage {
    /// Create an optimal-tiling image in device-local memory
    pub fn new_device_local(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Self> {
        if width == 0 || height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Image extent {}x{} must be nonzero", width, height),
            });
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory = match memory::allocate_image_memory(
            &device,
            memory_properties,
            image,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            extent: vk::Extent2D { width, height },
            format,
            usage,
        })
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the color view
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Get the image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Get the usage flags the image was created with
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }
}

impl Drop for TextureImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
