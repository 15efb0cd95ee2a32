//! Window management using GLFW
//!
//! The windowing collaborator: supplies the native presentation surface,
//! framebuffer pixel size queries, and the event pump. The renderer only
//! ever sees this wrapper, never GLFW types directly.

use thiserror::Error;

/// Window and surface errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW itself failed to initialize
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW reports no Vulkan loader or no required surface extensions
    #[error("GLFW reports no Vulkan support")]
    MissingVulkanSupport,

    /// The platform refused to create a presentation surface
    #[error("Surface creation failed: {0:?}")]
    SurfaceCreation(ash::vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window configured for Vulkan rendering
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a resizable window with no client API attached
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw =
            glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        // Vulkan presents through a surface, not an OpenGL context.
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    /// Whether the user asked the window to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request or cancel window close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the platform event queue without blocking
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Drain events collected since the last pump
    pub fn flush_events(&self) -> glfw::FlushedMessages<(f64, glfw::WindowEvent)> {
        glfw::flush_messages(&self.events)
    }

    /// Framebuffer size in pixels, which differs from the window size on
    /// scaled displays
    pub fn get_framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width as u32, height as u32)
    }

    /// Block until the framebuffer has a non-degenerate size.
    ///
    /// A minimized window reports a zero-sized framebuffer, which is not a
    /// valid swapchain extent. This parks the thread on the event queue and
    /// re-checks after each wakeup, so swapchain rebuilds only ever observe
    /// usable extents. Frame production is suspended for the duration.
    pub fn wait_for_valid_extent(&mut self) -> (u32, u32) {
        let (mut width, mut height) = self.get_framebuffer_size();
        while width == 0 || height == 0 {
            log::debug!(
                "Framebuffer degenerate ({}x{}), waiting for resize",
                width,
                height
            );
            self.glfw.wait_events();
            let size = self.get_framebuffer_size();
            width = size.0;
            height = size.1;
        }
        (width, height)
    }

    /// Instance extensions the platform needs for surface creation
    pub fn get_required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::MissingVulkanSupport)
    }

    /// Create a presentation surface for this window on `instance`
    pub fn create_vulkan_surface(
        &mut self,
        instance: ash::vk::Instance,
    ) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}
