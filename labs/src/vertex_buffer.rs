//! Lab 2: indexed quad from host-visible buffers
//!
//! Vertex and index data live in host-visible memory, written once through
//! the map/flush path. The draw is indexed with 16-bit indices.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use vklab::alloc::DeviceBuffer;
use vklab::prelude::*;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    pos: [f32; 2],
    color: [f32; 3],
}

const VERTICES: [Vertex; 4] = [
    Vertex { pos: [-0.5, -0.5], color: [1.0, 0.0, 0.0] },
    Vertex { pos: [ 0.5, -0.5], color: [0.0, 1.0, 0.0] },
    Vertex { pos: [ 0.5,  0.5], color: [0.0, 0.0, 1.0] },
    Vertex { pos: [-0.5,  0.5], color: [1.0, 1.0, 1.0] },
];

const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

const VERT: &str = r"
#version 450

layout(location = 0) in vec2 inPos;
layout(location = 1) in vec3 inColor;
layout(location = 0) out vec3 fragColor;

void main() {
    gl_Position = vec4(inPos, 0.0, 1.0);
    fragColor = inColor;
}
";

const FRAG: &str = r"
#version 450

layout(location = 0) in vec3 fragColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(fragColor, 1.0);
}
";

fn vertex_layout() -> VertexLayout {
    VertexLayout {
        stride: std::mem::size_of::<Vertex>() as u32,
        attributes: vec![
            VertexAttribute {
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 8,
            },
        ],
    }
}

fn host_visible_geometry(allocator: &GpuAllocator) -> VulkanResult<Geometry> {
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&VERTICES);
    let mut vertex_buffer = allocator.create_buffer(
        vertex_bytes.len() as vk::DeviceSize,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        MemoryClass::Upload,
    )?;
    vertex_buffer.write(vertex_bytes)?;

    let index_bytes: &[u8] = bytemuck::cast_slice(&INDICES);
    let mut index_buffer: DeviceBuffer = allocator.create_buffer(
        index_bytes.len() as vk::DeviceSize,
        vk::BufferUsageFlags::INDEX_BUFFER,
        MemoryClass::Upload,
    )?;
    index_buffer.write(index_bytes)?;

    Ok(Geometry {
        vertex_buffer: Some(vertex_buffer),
        index_buffer: Some((index_buffer, INDICES.len() as u32, vk::IndexType::UINT16)),
        vertex_count: VERTICES.len() as u32,
    })
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("fatal: {err}");
        std::process::exit(1);
    }
}

fn run() -> VulkanResult<()> {
    let config = LabConfig::load_or_default("labs.toml")?.with_title("02 vertex buffer");
    config.validate()?;

    let mut window = Window::new(&config.window)?;
    let instance = VulkanInstance::new(
        "vertex_buffer",
        &window.required_instance_extensions()?,
        config.renderer.enable_validation,
        config.renderer.debug_severity,
    )?;
    let surface = WindowSurface::new(&instance, &window)?;
    let adapter = select_adapter(&instance, surface.loader(), surface.handle())?;
    let context = DeviceContext::new(&instance, adapter)?;
    let allocator = GpuAllocator::new(&instance, &context)?;
    let compiler = ShaderCompiler::new()?;

    let mut target = PresentTarget::new(
        &instance,
        &context,
        &surface,
        SwapchainDesc {
            requested_image_count: config.renderer.requested_image_count,
            clipped: config.renderer.clip_obscured_pixels,
            ..SwapchainDesc::default()
        },
        window.framebuffer_extent(),
    )?;

    let geometry = host_visible_geometry(&allocator)?;
    let mut pipeline = FramePipeline::new(
        &context,
        &allocator,
        &target,
        &compiler,
        FramePipelineDesc {
            vertex_shader: VERT,
            fragment_shader: FRAG,
            vertex_layout: Some(vertex_layout()),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frames_in_flight: config.renderer.frames_in_flight,
            uniform: None,
            texture: None,
            geometry,
        },
    )?;

    while !window.should_close() {
        window.poll_events();
        if window.take_resize_request() {
            target.notify_resize();
        }
        match pipeline.render_frame(&mut target)? {
            FrameStatus::Rendered => {}
            FrameStatus::NeedsRebuild => target.rebuild(&mut window, &mut pipeline)?,
        }
    }

    context.wait_idle()?;
    Ok(())
}
