//! # vklab
//!
//! Vulkan bring-up library behind a set of progressive rendering labs.
//!
//! ## Layers
//!
//! - **Capability negotiation**: layer/extension checks, adapter selection
//! - **Device context**: one logical device with graphics, transfer, and
//!   present queues
//! - **Presentation**: swapchain lifecycle with synchronous rebuild on
//!   resize, minimize, and out-of-date results
//! - **Frame pipeline**: N frames in flight over a single graphics pipeline,
//!   parametrized per lab
//! - **Memory**: VMA-backed buffers and images with a staging upload path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vklab::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LabConfig::default().with_title("triangle");
//!     let mut window = Window::new(&config.window)?;
//!     let instance = VulkanInstance::new(
//!         "triangle",
//!         &window.required_instance_extensions()?,
//!         config.renderer.enable_validation,
//!         config.renderer.debug_severity,
//!     )?;
//!     let surface = WindowSurface::new(&instance, &window)?;
//!     let adapter = select_adapter(&instance, surface.loader(), surface.handle())?;
//!     let context = DeviceContext::new(&instance, adapter)?;
//!     // ... build a PresentTarget and FramePipeline, then loop
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod alloc;
pub mod commands;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod texture;
pub mod window;

/// Common imports for lab programs
pub mod prelude {
    pub use crate::{
        alloc::{GpuAllocator, MemoryClass},
        config::{LabConfig, MessageSeverity},
        device::{select_adapter, DeviceContext},
        error::{VulkanError, VulkanResult},
        frame::{FramePipeline, FramePipelineDesc, FrameStatus, Geometry, UniformSpec},
        instance::VulkanInstance,
        pipeline::{VertexAttribute, VertexLayout},
        shader::ShaderCompiler,
        surface::WindowSurface,
        swapchain::{PresentTarget, SwapchainDesc},
        texture::Texture,
        window::Window,
    };
}
