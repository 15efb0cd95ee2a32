//! Swapchain creation, capability negotiation, and recreation
//!
//! Negotiation policy lives in small pure functions over the queried
//! surface data so it can be tested without a device. [`Swapchain`] owns
//! the handle plus one color view per image; recreation threads the old
//! handle through `old_swapchain` and lets RAII retire it afterwards.

use crate::context::DeviceContext;
use crate::error::{VulkanError, VulkanResult};
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device};

/// Surface capabilities, formats, and present modes for one device/surface pair
pub struct SwapchainSupport {
    /// Image count and extent limits reported by the surface
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query what the surface supports on `device`
    pub fn query(
        surface_loader: &Surface,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        unsafe {
            let capabilities = surface_loader
                .get_physical_device_surface_capabilities(device, surface)
                .map_err(VulkanError::Api)?;
            let formats = surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?;
            let present_modes = surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?;

            Ok(Self {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// A device is only usable for presentation if it reports at least one
    /// format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Pick the surface format, preferring BGRA8 unorm in the sRGB color
/// space.
///
/// A single `UNDEFINED` entry means the surface imposes no preference and
/// any format may be chosen.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
        return preferred;
    }

    formats
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| formats.first())
        .copied()
        .unwrap_or(preferred)
}

/// Pick a present mode: the caller's preference if available, then mailbox,
/// then immediate, then FIFO. FIFO support is mandated, so the fallback
/// always exists.
fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    let ranked = [
        preferred,
        vk::PresentModeKHR::MAILBOX,
        vk::PresentModeKHR::IMMEDIATE,
        vk::PresentModeKHR::FIFO,
    ];

    for mode in ranked {
        if available.contains(&mode) {
            return mode;
        }
    }
    vk::PresentModeKHR::FIFO
}

/// Resolve the image extent. A `current_extent` width of `u32::MAX` is the
/// sentinel for "window manager leaves it to us"; anything else must be
/// used verbatim.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Request one image over the minimum so acquire rarely blocks on the
/// presentation engine. A `max_image_count` of zero means unbounded.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

/// Exclusive ownership when one queue family does both graphics and
/// present, concurrent sharing across both families otherwise
fn select_sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    }
}

/// Swapchain with its images and per-image color views
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create the initial swapchain for the context's surface
    pub fn new(
        context: &DeviceContext,
        desired_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> VulkanResult<Self> {
        Self::create(
            context,
            desired_extent,
            preferred_present_mode,
            vk::SwapchainKHR::null(),
        )
    }

    /// Create a replacement swapchain chained to `old_swapchain`.
    ///
    /// The old [`Swapchain`] must stay alive until this returns; dropping
    /// it afterwards releases the retired handle.
    pub fn recreate(
        context: &DeviceContext,
        desired_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        Self::create(context, desired_extent, preferred_present_mode, old_swapchain)
    }

    fn create(
        context: &DeviceContext,
        desired_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let support = SwapchainSupport::query(
            context.surface_loader(),
            context.physical_device().device,
            context.surface(),
        )?;

        let format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(&support.capabilities, desired_extent);
        let image_count = choose_image_count(&support.capabilities);

        let logical = context.device();
        let (sharing_mode, queue_families) =
            select_sharing_mode(logical.graphics_family, logical.present_family);

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&queue_families);
        }

        let loader = context.swapchain_loader().clone();
        let device = context.raw_device();

        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    unsafe {
                        for view in image_views.drain(..) {
                            device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(VulkanError::Api(e));
                }
            }
        }

        log::info!(
            "Swapchain created: {}x{}, {} images, format {:?}, present mode {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            device,
            loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
            present_mode,
        })
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get the swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Get the per-image color views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get the negotiated surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of images actually created, which may exceed the requested
    /// minimum
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Get the negotiated present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn image_count_is_min_plus_one_clamped_to_max() {
        assert_eq!(choose_image_count(&caps(2, 3)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn image_count_unbounded_when_max_is_zero() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(8, 0)), 9);
    }

    #[test]
    fn format_sentinel_yields_preferred_pair() {
        let formats = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_prefers_bgra8_unorm_when_listed() {
        // Both BGRA8 variants on offer, the sRGB one first: the unorm
        // variant still wins.
        let formats = [
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn format_falls_back_to_first_entry() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R5G6B5_UNORM_PACK16, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn single_supported_format_is_used() {
        // Not the preferred pair, but it is all the surface offers.
        let formats = [format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn present_mode_honors_caller_preference() {
        let available = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::FIFO),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn present_mode_falls_back_mailbox_then_immediate_then_fifo() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        // Preference not available: take the best of what is.
        assert_eq!(
            choose_present_mode(&all[..2], vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
                vk::PresentModeKHR::MAILBOX
            ),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_when_fixed_by_surface() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let desired = vk::Extent2D {
            width: 640,
            height: 480,
        };
        assert_eq!(choose_extent(&capabilities, desired), capabilities.current_extent);
    }

    #[test]
    fn extent_clamps_desired_when_surface_defers() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 1000,
            },
            ..Default::default()
        };
        let chosen = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 4096,
                height: 50,
            },
        );
        assert_eq!(chosen.width, 2000);
        assert_eq!(chosen.height, 100);
    }

    #[test]
    fn repeated_negotiation_over_equal_support_is_identical() {
        // Rebuilding against an unchanged surface must land on the same
        // configuration every time.
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let desired = vk::Extent2D {
            width: 1280,
            height: 720,
        };

        let negotiate = || {
            let chosen = choose_surface_format(&formats);
            (
                chosen.format,
                chosen.color_space,
                choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
                choose_extent(&capabilities, desired),
                choose_image_count(&capabilities),
            )
        };

        assert_eq!(negotiate(), negotiate());
    }

    #[test]
    fn sharing_exclusive_for_unified_family() {
        let (mode, families) = select_sharing_mode(0, 0);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(families.is_empty());
    }

    #[test]
    fn sharing_concurrent_across_distinct_families() {
        let (mode, families) = select_sharing_mode(0, 2);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(families, vec![0, 2]);
    }
}
