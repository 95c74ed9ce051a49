//! GLSL compilation and shader module wrappers
//!
//! Labs carry their shaders as GLSL source and compile at startup. Any error
//! diagnostic aborts the build with the compiler's message attached.

use std::ffi::CStr;

use ash::{vk, Device};

use crate::error::{VulkanError, VulkanResult};

/// Shader stage kinds the labs use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    fn to_shaderc_kind(self) -> shaderc::ShaderKind {
        match self {
            Self::Vertex => shaderc::ShaderKind::Vertex,
            Self::Fragment => shaderc::ShaderKind::Fragment,
        }
    }

    /// The matching pipeline stage flag
    pub fn to_vk_flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// GLSL to SPIR-V compiler
pub struct ShaderCompiler {
    compiler: shaderc::Compiler,
}

impl ShaderCompiler {
    /// Initialize the compiler backend
    pub fn new() -> VulkanResult<Self> {
        let compiler = shaderc::Compiler::new().ok_or_else(|| {
            VulkanError::ShaderCompilation("shaderc initialization failed".to_string())
        })?;
        Ok(Self { compiler })
    }

    /// Compile GLSL source to SPIR-V words
    ///
    /// `name` labels the source in diagnostics. `macros` become `#define`s;
    /// a `None` value defines the macro without a value.
    pub fn compile(
        &self,
        source: &str,
        stage: ShaderStage,
        name: &str,
        macros: &[(&str, Option<&str>)],
        optimize: bool,
    ) -> VulkanResult<Vec<u32>> {
        let mut options = shaderc::CompileOptions::new().ok_or_else(|| {
            VulkanError::ShaderCompilation("shaderc options initialization failed".to_string())
        })?;
        for (macro_name, value) in macros {
            options.add_macro_definition(macro_name, *value);
        }
        options.set_optimization_level(if optimize {
            shaderc::OptimizationLevel::Performance
        } else {
            shaderc::OptimizationLevel::Zero
        });

        let artifact = self
            .compiler
            .compile_into_spirv(source, stage.to_shaderc_kind(), name, "main", Some(&options))
            .map_err(|e| VulkanError::ShaderCompilation(e.to_string()))?;
        if artifact.get_num_warnings() > 0 {
            log::warn!("{name}: {}", artifact.get_warning_messages());
        }
        Ok(artifact.as_binary().to_vec())
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    /// Create a module from SPIR-V words
    pub fn from_spirv(device: Device, words: &[u32], stage: ShaderStage) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            device,
            module,
            stage,
        })
    }

    /// Compile GLSL source and wrap the resulting module
    pub fn from_glsl(
        device: Device,
        compiler: &ShaderCompiler,
        source: &str,
        stage: ShaderStage,
        name: &str,
    ) -> VulkanResult<Self> {
        let words = compiler.compile(source, stage, name, &[], false)?;
        Self::from_spirv(device, &words, stage)
    }

    /// Module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage create info for pipeline construction
    pub fn stage_info(&self, entry_point: &CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage.to_vk_flags())
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_map_to_pipeline_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk_flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk_flags(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn valid_glsl_compiles_to_spirv() {
        let compiler = ShaderCompiler::new().unwrap();
        let words = compiler
            .compile(
                "#version 450\nvoid main() { gl_Position = vec4(0.0); }",
                ShaderStage::Vertex,
                "test.vert",
                &[],
                false,
            )
            .unwrap();
        // SPIR-V modules open with the magic number
        assert_eq!(words[0], 0x0723_0203);
    }

    #[test]
    fn broken_glsl_reports_compilation_error() {
        let compiler = ShaderCompiler::new().unwrap();
        let result = compiler.compile(
            "#version 450\nvoid main() { this is not glsl }",
            ShaderStage::Fragment,
            "bad.frag",
            &[],
            false,
        );
        assert!(matches!(result, Err(VulkanError::ShaderCompilation(_))));
    }

    #[test]
    fn macros_reach_the_preprocessor() {
        let compiler = ShaderCompiler::new().unwrap();
        let source = "#version 450\nvoid main() { gl_Position = vec4(SCALE); }";
        let result = compiler.compile(
            source,
            ShaderStage::Vertex,
            "macro.vert",
            &[("SCALE", Some("1.0"))],
            false,
        );
        assert!(result.is_ok());
        // Without the macro the same source must fail
        let missing = compiler.compile(source, ShaderStage::Vertex, "macro.vert", &[], false);
        assert!(missing.is_err());
    }
}
