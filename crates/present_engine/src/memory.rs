//! Device memory allocation
//!
//! Deliberately simple: every buffer and image gets its own allocation,
//! sized and aligned by the driver-reported requirements and bound at
//! offset 0. Sub-allocating from larger blocks is a non-goal at this scale.

use crate::error::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Find the first memory type within `type_bits` whose property flags are a
/// superset of `required`.
///
/// Fails with [`VulkanError::NoSuitableMemoryType`]; the caller has no
/// fallback tier, so that failure is fatal.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for i in 0..memory_properties.memory_type_count {
        if (type_bits & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(required)
        {
            return Ok(i);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}

/// Distinguish exhaustion from other allocation failures, keeping the
/// requested size for the error report
fn map_allocation_error(e: vk::Result, requested: vk::DeviceSize) -> VulkanError {
    match e {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            VulkanError::OutOfMemory {
                requested: requested as usize,
            }
        }
        other => VulkanError::Api(other),
    }
}

/// Allocate memory for a buffer and bind it at offset 0.
///
/// The allocation size comes from the driver's requirements, not the
/// caller's requested size; the two differ under alignment padding.
pub fn allocate_buffer_memory(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    buffer: vk::Buffer,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let memory_type_index =
        find_memory_type(memory_properties, requirements.memory_type_bits, required)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device
            .allocate_memory(&alloc_info, None)
            .map_err(|e| map_allocation_error(e, requirements.size))?
    };

    unsafe {
        if let Err(e) = device.bind_buffer_memory(buffer, memory, 0) {
            device.free_memory(memory, None);
            return Err(VulkanError::Api(e));
        }
    }

    Ok(memory)
}

/// Allocate memory for an image and bind it at offset 0
pub fn allocate_image_memory(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    image: vk::Image,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory_type_index =
        find_memory_type(memory_properties, requirements.memory_type_bits, required)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device
            .allocate_memory(&alloc_info, None)
            .map_err(|e| map_allocation_error(e, requirements.size))?
    };

    unsafe {
        if let Err(e) = device.bind_image_memory(image, memory, 0) {
            device.free_memory(memory, None);
            return Err(VulkanError::Api(e));
        }
    }

    Ok(memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            properties.memory_types[i].property_flags = *flags;
        }
        properties
    }

    #[test]
    fn finds_first_matching_type() {
        let properties = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &properties,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        // Types 1 and 2 both match; the scan takes the first
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_type_bits_filter() {
        let properties = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 matches the properties but the resource only allows type 1
        let index =
            find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn requires_property_superset() {
        // HOST_VISIBLE alone must not satisfy HOST_VISIBLE | HOST_COHERENT
        let properties = props(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);

        let result = find_memory_type(
            &properties,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }

    #[test]
    fn extra_properties_still_match() {
        let properties = props(&[vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT
            | vk::MemoryPropertyFlags::HOST_CACHED]);

        let index =
            find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn allocation_exhaustion_carries_the_requested_size() {
        match map_allocation_error(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY, 4096) {
            VulkanError::OutOfMemory { requested } => assert_eq!(requested, 4096),
            other => panic!("unexpected error: {other:?}"),
        }
        match map_allocation_error(vk::Result::ERROR_OUT_OF_HOST_MEMORY, 16) {
            VulkanError::OutOfMemory { requested } => assert_eq!(requested, 16),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_DEVICE_LOST, 16),
            VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn fails_when_nothing_matches() {
        let properties = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        let result = find_memory_type(
            &properties,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }
}
