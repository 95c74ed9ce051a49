//! Error types shared across the library
//!
//! One error enum covers the whole bring-up path; callers propagate with `?`
//! and the lab binaries print the chain at the process boundary.

use ash::vk;
use thiserror::Error;

/// Errors produced while negotiating, building, or driving the Vulkan stack
#[derive(Error, Debug)]
pub enum VulkanError {
    /// Raw Vulkan API error code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A requested layer or instance extension is not available
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// No physical device satisfied the adapter requirements
    #[error("no suitable adapter found")]
    NoSuitableAdapter,

    /// GLSL compilation produced error diagnostics
    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Image file missing or malformed
    #[error("image load failed: {0}")]
    ImageLoad(String),

    /// Windowing or GLFW failure
    #[error("window error: {0}")]
    Window(String),

    /// Setup failure outside the Vulkan API proper
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Convenience result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_carry_the_vulkan_code() {
        let err = VulkanError::from(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(matches!(err, VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR)));
    }

    #[test]
    fn display_names_the_missing_capability() {
        let err = VulkanError::UnsupportedCapability("VK_LAYER_KHRONOS_validation".to_string());
        assert_eq!(
            err.to_string(),
            "unsupported capability: VK_LAYER_KHRONOS_validation"
        );
    }

    #[test]
    fn no_suitable_adapter_is_a_plain_message() {
        assert_eq!(VulkanError::NoSuitableAdapter.to_string(), "no suitable adapter found");
    }
}
