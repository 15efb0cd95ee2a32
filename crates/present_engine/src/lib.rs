//! # Present Engine
//!
//! A Vulkan frame presentation and GPU resource lifecycle library.
//!
//! ## Features
//!
//! - **Device Bring-Up**: Instance, surface, and device selection with
//!   optional validation layers
//! - **Frame Pacing**: Bounded frames-in-flight with per-slot fences and
//!   semaphores
//! - **Swapchain Lifecycle**: Capability negotiation and seamless
//!   recreation on resize and out-of-date reports
//! - **Transfers**: Staged uploads into device-local buffers and images
//! - **Resource Safety**: RAII wrappers for every owned Vulkan object
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use present_engine::{Renderer, RendererConfig, Window};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::new("demo").with_window("demo", 800, 600);
//!     let mut window = Window::new(
//!         &config.window_title,
//!         config.window_width,
//!         config.window_height,
//!     )?;
//!     let mut renderer = Renderer::new(&mut window, &config, 16)?;
//!
//!     let uniforms = [0u8; 16];
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.draw_frame(&mut window, &uniforms)?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::missing_errors_doc
)]

pub mod buffer;
pub mod commands;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod framebuffer;
pub mod instance;
pub mod memory;
pub mod render_pass;
pub mod renderer;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod transfer;
pub mod window;

pub use buffer::{Buffer, StagingBuffer, UniformBuffer};
pub use config::{ConfigError, PresentModePreference, RendererConfig};
pub use context::DeviceContext;
pub use error::{VulkanError, VulkanResult};
pub use frame::{AcquireResult, FrameContext, FrameLoop, FrameOutcome, PresentResult};
pub use renderer::Renderer;
pub use texture::TextureImage;
pub use transfer::TransferEngine;
pub use window::{Window, WindowError, WindowResult};

// Applications need `vk` types for usage flags and formats.
pub use ash;

/// Common imports for library users
pub mod prelude {
    pub use crate::{
        config::{PresentModePreference, RendererConfig},
        error::{VulkanError, VulkanResult},
        frame::FrameOutcome,
        renderer::Renderer,
        window::Window,
    };
    pub use ash::vk;
}
