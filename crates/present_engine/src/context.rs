//! Device context: the core Vulkan objects everything else borrows
//!
//! Created once at startup and immutable afterwards. The swapchain and all
//! per-frame state live above this layer so that a resize never touches the
//! instance, surface, or device.

use crate::config::RendererConfig;
use crate::device::{LogicalDevice, PhysicalDeviceInfo};
use crate::error::{VulkanError, VulkanResult};
use crate::instance::VulkanInstance;
use crate::window::Window;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device};

/// Owns the instance, surface, selected adapter, and logical device
pub struct DeviceContext {
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    // Declaration order doubles as destruction order: the logical device
    // drops before the instance, and the explicit Drop below removes the
    // surface first of all.
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl DeviceContext {
    /// Bring up instance, surface, and device for the given window
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(
            window,
            &config.application_name,
            config.application_version,
            config.validation_enabled(),
        )?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let physical_device =
            PhysicalDeviceInfo::select_suitable(&instance.instance, surface, &surface_loader)?;

        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        log::info!(
            "Device context ready (graphics family {}, present family {})",
            device.graphics_family,
            device.present_family
        );

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Get the surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the memory types and heaps of the selected adapter
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Get the logical device wrapper
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get an owned handle to the raw device
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Block until the device has finished all in-flight work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            // Surface before device and instance; the remaining fields drop
            // in declaration order.
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
