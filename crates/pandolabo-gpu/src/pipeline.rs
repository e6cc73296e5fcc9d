//! Pipeline handle consumed by command recorders.

use crate::error::{GpuError, Result};
use crate::types::PipelineBind;
use ash::vk;

/// A pipeline, its layout, and the bind point it is used at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    bind: PipelineBind,
}

impl Pipeline {
    /// Wrap handles created elsewhere. Ownership passes to the returned value.
    pub const fn from_raw(
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        bind: PipelineBind,
    ) -> Self {
        Self {
            pipeline,
            layout,
            bind,
        }
    }

    /// Create a compute pipeline with entry point `main`.
    ///
    /// `push_constant_size` bytes of push constants are made visible to the
    /// compute stage; zero means none.
    ///
    /// # Safety
    /// The device must be valid and `spirv` must be valid SPIR-V.
    pub unsafe fn compute(
        device: &ash::Device,
        spirv: &[u32],
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_size: u32,
    ) -> Result<Self> {
        let shader_info = vk::ShaderModuleCreateInfo::default().code(spirv);
        let shader_module = unsafe { device.create_shader_module(&shader_info, None) }
            .map_err(|e| GpuError::PipelineCreation(format!("Shader module: {e}")))?;

        let push_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(push_constant_size)];
        let push_ranges: &[vk::PushConstantRange] = if push_constant_size == 0 {
            &[]
        } else {
            &push_ranges
        };

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_ranges);

        let layout = match unsafe { device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.destroy_shader_module(shader_module, None) };
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(c"main");

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        let result = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        unsafe { device.destroy_shader_module(shader_module, None) };

        let pipeline = match result {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        }
        .ok_or_else(|| GpuError::PipelineCreation("No pipeline returned".to_string()))?;

        Ok(Self {
            pipeline,
            layout,
            bind: PipelineBind::Compute,
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn bind_point(&self) -> PipelineBind {
        self.bind
    }

    /// Destroy the pipeline and its layout.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
