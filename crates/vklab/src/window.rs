//! Window management using GLFW
//!
//! Provides a no-API window for Vulkan rendering, resize tracking for the
//! presentation layer, and the blocking wait used while the window is
//! minimized to a zero-sized framebuffer.

use ash::vk;

use crate::config::WindowConfig;
use crate::error::{VulkanError, VulkanResult};

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resize_pending: bool,
}

impl Window {
    /// Create a window configured for Vulkan (no client API context)
    pub fn new(config: &WindowConfig) -> VulkanResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| VulkanError::Window(format!("GLFW initialization failed: {e}")))?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(
                config.width,
                config.height,
                &config.title,
                glfw::WindowMode::Windowed,
            )
            .ok_or_else(|| VulkanError::Window("window creation failed".to_string()))?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
            resize_pending: false,
        })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Pump the event queue and latch any framebuffer resize
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        self.drain_events();
    }

    fn drain_events(&mut self) {
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(_, _) => {
                    self.resize_pending = true;
                }
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    self.window.set_should_close(true);
                }
                _ => {}
            }
        }
    }

    /// Take the resize latch, clearing it
    ///
    /// Returns true at most once per resize burst; the caller forwards the
    /// notification to the presentation layer.
    pub fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.resize_pending)
    }

    /// Current framebuffer size in pixels
    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.window.get_framebuffer_size();
        vk::Extent2D {
            width: width as u32,
            height: height as u32,
        }
    }

    /// Block until the framebuffer has a non-zero area
    ///
    /// A minimized window reports a zero extent, which is not a legal
    /// swapchain size. Waiting on events here parks the thread until the
    /// window is restored.
    pub fn wait_for_valid_extent(&mut self) -> vk::Extent2D {
        let mut extent = self.framebuffer_extent();
        while extent.width == 0 || extent.height == 0 {
            self.glfw.wait_events();
            self.drain_events();
            extent = self.framebuffer_extent();
        }
        extent
    }

    /// Instance extensions GLFW needs for surface creation
    pub fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw.get_required_instance_extensions().ok_or_else(|| {
            VulkanError::Window("no instance extensions for surface creation".to_string())
        })
    }

    /// Create a Vulkan surface for this window
    pub fn create_surface(&self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);
        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::Api(result))
        }
    }
}
