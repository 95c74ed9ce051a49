//! Lab 1: cleared triangle
//!
//! No buffers at all; the vertex shader synthesizes the triangle from
//! `gl_VertexIndex`. Mostly an excuse to exercise the full frame loop and
//! the resize/rebuild path.

use vklab::prelude::*;

const VERT: &str = r"
#version 450

layout(location = 0) out vec3 fragColor;

vec2 positions[3] = vec2[](
    vec2( 0.0, -0.5),
    vec2( 0.5,  0.5),
    vec2(-0.5,  0.5)
);

vec3 colors[3] = vec3[](
    vec3(1.0, 0.0, 0.0),
    vec3(0.0, 1.0, 0.0),
    vec3(0.0, 0.0, 1.0)
);

void main() {
    gl_Position = vec4(positions[gl_VertexIndex], 0.0, 1.0);
    fragColor = colors[gl_VertexIndex];
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

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("fatal: {err}");
        std::process::exit(1);
    }
}

fn run() -> VulkanResult<()> {
    let config = LabConfig::load_or_default("labs.toml")?.with_title("01 triangle");
    config.validate()?;

    let mut window = Window::new(&config.window)?;
    let instance = VulkanInstance::new(
        "triangle",
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

    let mut pipeline = FramePipeline::new(
        &context,
        &allocator,
        &target,
        &compiler,
        FramePipelineDesc {
            vertex_shader: VERT,
            fragment_shader: FRAG,
            vertex_layout: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frames_in_flight: config.renderer.frames_in_flight,
            uniform: None,
            texture: None,
            geometry: Geometry::shader_generated(3),
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
