//! Lab 4: rotating quad driven by a per-frame uniform buffer
//!
//! Each frame slot owns a host-visible uniform buffer and a descriptor set;
//! the update callback recomputes the MVP matrix every frame from elapsed
//! time and the current aspect ratio.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Perspective3, Point3, Rotation3, Vector3};
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

layout(binding = 0) uniform SceneUbo {
    mat4 mvp;
} ubo;

layout(location = 0) in vec2 inPos;
layout(location = 1) in vec3 inColor;
layout(location = 0) out vec3 fragColor;

void main() {
    gl_Position = ubo.mvp * vec4(inPos, 0.0, 1.0);
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

/// Spinning-quad MVP: perspective camera 1.5 units back, yaw from elapsed time
fn mvp_matrix(elapsed: f32, extent: vk::Extent2D) -> Matrix4<f32> {
    let aspect = extent.width as f32 / extent.height.max(1) as f32;
    let mut projection =
        Perspective3::new(aspect, 60f32.to_radians(), 0.1, 10.0).to_homogeneous();
    // Vulkan clip space has Y pointing down
    projection[(1, 1)] *= -1.0;

    let view = Matrix4::look_at_rh(
        &Point3::new(0.0, 0.0, -1.5),
        &Point3::origin(),
        &Vector3::y(),
    );
    let model = Rotation3::from_axis_angle(&Vector3::y_axis(), elapsed).to_homogeneous();

    projection * view * model
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("fatal: {err}");
        std::process::exit(1);
    }
}

fn run() -> VulkanResult<()> {
    let config = LabConfig::load_or_default("labs.toml")?.with_title("04 uniform buffer");
    config.validate()?;

    let mut window = Window::new(&config.window)?;
    let instance = VulkanInstance::new(
        "uniform_buffer",
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

    let vertex_buffer = allocator.upload_buffer(
        bytemuck::cast_slice(&VERTICES),
        vk::BufferUsageFlags::VERTEX_BUFFER,
        vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
        vk::PipelineStageFlags::VERTEX_INPUT,
    )?;
    let index_buffer = allocator.upload_buffer(
        bytemuck::cast_slice(&INDICES),
        vk::BufferUsageFlags::INDEX_BUFFER,
        vk::AccessFlags::INDEX_READ,
        vk::PipelineStageFlags::VERTEX_INPUT,
    )?;

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
            uniform: Some(UniformSpec {
                size: std::mem::size_of::<Matrix4<f32>>() as vk::DeviceSize,
                update: Box::new(|elapsed, extent, out| {
                    let mvp = mvp_matrix(elapsed, extent);
                    out.copy_from_slice(bytemuck::cast_slice(mvp.as_slice()));
                }),
            }),
            texture: None,
            geometry: Geometry {
                vertex_buffer: Some(vertex_buffer),
                index_buffer: Some((index_buffer, INDICES.len() as u32, vk::IndexType::UINT16)),
                vertex_count: VERTICES.len() as u32,
            },
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
