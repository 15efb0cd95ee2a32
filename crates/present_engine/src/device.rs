//! Physical and logical device selection
//!
//! Device selection is the "first suitable" policy: the first enumerated
//! adapter with complete queue families, the swapchain extension, and an
//! adequate surface wins. Suitability is a startup contract; a machine with
//! no suitable adapter fails fatally rather than degrading.

use crate::error::{VulkanError, VulkanResult};
use crate::swapchain::SwapchainSupport;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use std::collections::HashSet;
use std::ffi::CStr;

/// Queue family indices discovered for a physical device
///
/// Both indices are optional until discovery finishes; `is_complete` is a
/// pure predicate over the struct. Graphics and present may resolve to the
/// same family; the swapchain sharing mode accounts for either case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics operations
    pub graphics_family: Option<u32>,
    /// Family supporting presentation to the target surface
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan a device's queue families for graphics and present support
    pub fn find(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut indices = Self::default();

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && indices.graphics_family.is_none()
            {
                indices.graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };

            if present_support && indices.present_family.is_none() {
                indices.present_family = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    /// Whether both required families were found
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }
}

/// Selected physical device and its capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory types and heaps, queried once at selection time
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first suitable physical device for rendering
    pub fn select_suitable(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            if let Ok(device_info) = Self::evaluate(instance, device, surface, surface_loader) {
                log::info!("Selected GPU: {}", unsafe {
                    CStr::from_ptr(device_info.properties.device_name.as_ptr()).to_string_lossy()
                });
                return Ok(device_info);
            }
        }

        Err(VulkanError::InitializationFailed(
            "No suitable GPU found".to_string(),
        ))
    }

    fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(device) };

        let indices = QueueFamilyIndices::find(instance, device, surface, surface_loader)?;
        let (graphics_family, present_family) =
            match (indices.graphics_family, indices.present_family) {
                (Some(graphics), Some(present)) => (graphics, present),
                _ => {
                    return Err(VulkanError::InitializationFailed(
                        "Required queue families not found".to_string(),
                    ))
                }
            };

        // Swapchain extension support
        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        let required_extensions = [SwapchainLoader::name()];
        let has_required_extensions = required_extensions.iter().all(|required| {
            extensions.iter().any(|available| {
                let extension_name =
                    unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                extension_name == *required
            })
        });

        if !has_required_extensions {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        // The surface must offer at least one format and one present mode
        let support = SwapchainSupport::query(surface_loader, device, surface)?;
        if !support.is_adequate() {
            return Err(VulkanError::InitializationFailed(
                "Surface offers no formats or present modes".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            features,
            memory_properties,
            graphics_family,
            present_family,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with graphics and present queues
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [
            physical_device.graphics_family,
            physical_device.present_family,
        ]
        .iter()
        .copied()
        .collect();

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&[1.0])
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device.present_family, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_family: physical_device.graphics_family,
            present_family: physical_device.present_family,
            swapchain_loader,
        })
    }

    /// Submit work to the graphics queue.
    ///
    /// Submission failure indicates device loss or malformed submit
    /// structures; neither is retried.
    pub fn submit(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> VulkanResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submits, fence)
                .map_err(VulkanError::Api)
        }
    }

    /// Block until the device has finished all in-flight work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Device must be idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_family_indices_complete_only_with_both() {
        let none = QueueFamilyIndices::default();
        assert!(!none.is_complete());

        let graphics_only = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(!graphics_only.is_complete());

        let present_only = QueueFamilyIndices {
            graphics_family: None,
            present_family: Some(1),
        };
        assert!(!present_only.is_complete());

        let both = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(both.is_complete());
    }
}
