//! Error types for the presentation engine
//!
//! One enum covers the whole engine. Recoverable presentation conditions
//! (surface out of date, suboptimal, minimized window) are deliberately not
//! represented here: they are reported as ordinary outcome values by the
//! frame executor and consumed by the resize path, never surfaced as errors.

use ash::vk;
use thiserror::Error;

/// Errors produced by engine operations
#[derive(Error, Debug)]
pub enum VulkanError {
    /// Raw Vulkan API error
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Instance, device, or surface bring-up failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No device memory type satisfies the requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// An image layout transition outside the supported transfer paths
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Layout the image is currently in
        old: vk::ImageLayout,
        /// Layout that was requested
        new: vk::ImageLayout,
    },

    /// Operation invalid in the current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of the violated precondition
        reason: String,
    },

    /// Host-side allocation failure
    #[error("Out of memory: requested {requested} bytes")]
    OutOfMemory {
        /// Size of the failed request in bytes
        requested: usize,
    },
}

/// Result type for engine operations
pub type VulkanResult<T> = Result<T, VulkanError>;
