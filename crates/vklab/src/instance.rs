//! Instance creation and capability negotiation
//!
//! Checks requested layers and instance extensions against what the loader
//! actually offers before creating anything, so a missing validation layer
//! fails with a named capability instead of a raw Vulkan error. The debug
//! messenger forwards validation output into the `log` facade.

use std::ffi::{c_void, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::vk;

use crate::config::MessageSeverity;
use crate::error::{VulkanError, VulkanResult};

/// Name of the Khronos validation layer
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

fn vk_string(raw: &[std::os::raw::c_char]) -> String {
    // Vulkan property strings are fixed-size NUL-terminated arrays
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Verify every requested layer is offered by the loader
pub fn check_layer_support(entry: &ash::Entry, layers: &[&str]) -> VulkanResult<()> {
    let available = entry
        .enumerate_instance_layer_properties()
        .map_err(VulkanError::Api)?;
    let names: Vec<String> = available.iter().map(|l| vk_string(&l.layer_name)).collect();

    for layer in layers {
        if !names.iter().any(|n| n == layer) {
            return Err(VulkanError::UnsupportedCapability(format!("layer {layer}")));
        }
    }
    Ok(())
}

/// Verify every requested instance extension is offered by the loader
pub fn check_extension_support(entry: &ash::Entry, extensions: &[String]) -> VulkanResult<()> {
    let available = entry
        .enumerate_instance_extension_properties(None)
        .map_err(VulkanError::Api)?;
    let names: Vec<String> = available
        .iter()
        .map(|e| vk_string(&e.extension_name))
        .collect();

    for ext in extensions {
        if !names.iter().any(|n| n == ext) {
            return Err(VulkanError::UnsupportedCapability(format!("extension {ext}")));
        }
    }
    Ok(())
}

impl MessageSeverity {
    fn to_vk_flags(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as F;
        match self {
            Self::Verbose => F::VERBOSE | F::INFO | F::WARNING | F::ERROR,
            Self::Info => F::INFO | F::WARNING | F::ERROR,
            Self::Warning => F::WARNING | F::ERROR,
            Self::Error => F::ERROR,
        }
    }
}

/// Debug callback routing validation messages to the log facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[{message_type:?}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[{message_type:?}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[{message_type:?}] {message}");
        }
        _ => {
            log::debug!("[{message_type:?}] {message}");
        }
    }

    vk::FALSE
}

/// Vulkan instance with optional debug messenger, cleaned up in drop order
pub struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance for the given application
    ///
    /// `surface_extensions` comes from the window layer; validation adds the
    /// Khronos layer and the debug-utils extension when enabled.
    pub fn new(
        app_name: &str,
        surface_extensions: &[String],
        enable_validation: bool,
        debug_severity: MessageSeverity,
    ) -> VulkanResult<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Vulkan loader: {e}")))?;

        let mut layers: Vec<&str> = Vec::new();
        let mut extensions: Vec<String> = surface_extensions.to_vec();
        if enable_validation {
            layers.push(VALIDATION_LAYER);
            extensions.push(
                DebugUtils::name()
                    .to_str()
                    .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?
                    .to_string(),
            );
        }

        check_layer_support(&entry, &layers)?;
        check_extension_support(&entry, &extensions)?;

        let app_name_c = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let engine_name_c = CString::new("vklab")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_c)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name_c)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let layers_c: Vec<CString> = layers
            .iter()
            .map(|l| CString::new(*l))
            .collect::<Result<_, _>>()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let layer_ptrs: Vec<*const std::os::raw::c_char> =
            layers_c.iter().map(|l| l.as_ptr()).collect();

        let extensions_c: Vec<CString> = extensions
            .iter()
            .map(|e| CString::new(e.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let extension_ptrs: Vec<*const std::os::raw::c_char> =
            extensions_c.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        log::info!("Vulkan instance created (validation: {enable_validation})");

        let debug = if enable_validation {
            let loader = DebugUtils::new(&entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(debug_severity.to_vk_flags())
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));
            let messenger = unsafe {
                loader
                    .create_debug_utils_messenger(&messenger_info, None)
                    .map_err(VulkanError::Api)?
            };
            Some((loader, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    /// Loader entry point
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Instance handle
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_thresholds_nest() {
        // Each threshold must be a superset of the stricter one below it
        let error = MessageSeverity::Error.to_vk_flags();
        let warning = MessageSeverity::Warning.to_vk_flags();
        let info = MessageSeverity::Info.to_vk_flags();
        let verbose = MessageSeverity::Verbose.to_vk_flags();
        assert_eq!(warning & error, error);
        assert_eq!(info & warning, warning);
        assert_eq!(verbose & info, info);
    }

    #[test]
    fn error_threshold_excludes_warnings() {
        let flags = MessageSeverity::Error.to_vk_flags();
        assert!(!flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
    }
}
