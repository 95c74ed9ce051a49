//! Lab 0: instance, device, and swapchain bring-up
//!
//! Negotiates capabilities, selects an adapter, builds the logical device
//! and an initial swapchain, logs what was chosen, and exits.

use vklab::prelude::*;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("fatal: {err}");
        std::process::exit(1);
    }
}

fn run() -> VulkanResult<()> {
    let config = LabConfig::load_or_default("labs.toml")?.with_title("00 init");
    config.validate()?;

    let window = Window::new(&config.window)?;
    let instance = VulkanInstance::new(
        "init",
        &window.required_instance_extensions()?,
        config.renderer.enable_validation,
        config.renderer.debug_severity,
    )?;
    let surface = WindowSurface::new(&instance, &window)?;
    let adapter = select_adapter(&instance, surface.loader(), surface.handle())?;
    let context = DeviceContext::new(&instance, adapter)?;

    let desc = SwapchainDesc {
        requested_image_count: config.renderer.requested_image_count,
        clipped: config.renderer.clip_obscured_pixels,
        ..SwapchainDesc::default()
    };
    let target = PresentTarget::new(
        &instance,
        &context,
        &surface,
        desc,
        window.framebuffer_extent(),
    )?;

    log::info!(
        "Device ready: {} | queues {:?} | swapchain {}x{} x{} {:?}",
        context.adapter().name(),
        context.families(),
        target.extent().width,
        target.extent().height,
        target.image_count(),
        target.format().format,
    );

    context.wait_idle()?;
    Ok(())
}
