//! Descriptor layout, pool, and per-image set management

use crate::buffer::UniformBuffer;
use crate::error::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Descriptor state tied to the current swapchain image count.
///
/// One uniform-buffer set per swapchain image, so updating frame data for
/// an acquired image never races a set still referenced by an in-flight
/// command buffer. The whole bundle is rebuilt when the image count can
/// change on swapchain recreation.
pub struct DescriptorResources {
    device: Device,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorResources {
    /// Create a layout, pool, and one set per uniform buffer, each set
    /// pointing at its buffer
    pub fn new(device: Device, uniforms: &[UniformBuffer]) -> VulkanResult<Self> {
        if uniforms.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Descriptor resources need at least one uniform buffer".to_string(),
            });
        }
        let count = uniforms.len() as u32;

        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build()];

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(count);

        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let layouts = vec![layout; uniforms.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(layout, None);
                }
                return Err(VulkanError::Api(e));
            }
        };

        for (set, uniform) in sets.iter().zip(uniforms) {
            let buffer_info = [uniform.descriptor_info()];
            let write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info);

            unsafe {
                device.update_descriptor_sets(&[write.build()], &[]);
            }
        }

        log::debug!("Allocated {} uniform descriptor sets", sets.len());

        Ok(Self {
            device,
            layout,
            pool,
            sets,
        })
    }

    /// Get the set layout
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the per-image descriptor sets, indexed by swapchain image
    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }
}

impl Drop for DescriptorResources {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its sets.
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
