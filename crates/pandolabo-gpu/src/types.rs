//! Vocabulary types and their Vulkan flag conversions.
//!
//! Application code names stages, access types, and layouts with these enums.
//! Sets are passed as slices and folded with bitwise OR at the point where a
//! Vulkan struct is filled in.

use ash::vk;
use gpu_allocator::MemoryLocation;

/// Queue role a driver is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueFamilyType {
    Graphics,
    Compute,
    Transfer,
}

/// Where a resource's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    GpuOnly,
    CpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl From<MemoryUsage> for MemoryLocation {
    fn from(usage: MemoryUsage) -> Self {
        match usage {
            MemoryUsage::GpuOnly => Self::GpuOnly,
            MemoryUsage::CpuOnly | MemoryUsage::CpuToGpu => Self::CpuToGpu,
            MemoryUsage::GpuToCpu => Self::GpuToCpu,
        }
    }
}

/// Whether a resource takes part in transfer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferType {
    None,
    TransferSrc,
    TransferDst,
    TransferSrcDst,
}

impl From<TransferType> for vk::BufferUsageFlags {
    fn from(transfer: TransferType) -> Self {
        match transfer {
            TransferType::None => Self::empty(),
            TransferType::TransferSrc => Self::TRANSFER_SRC,
            TransferType::TransferDst => Self::TRANSFER_DST,
            TransferType::TransferSrcDst => Self::TRANSFER_SRC | Self::TRANSFER_DST,
        }
    }
}

impl From<TransferType> for vk::ImageUsageFlags {
    fn from(transfer: TransferType) -> Self {
        match transfer {
            TransferType::None => Self::empty(),
            TransferType::TransferSrc => Self::TRANSFER_SRC,
            TransferType::TransferDst => Self::TRANSFER_DST,
            TransferType::TransferSrcDst => Self::TRANSFER_SRC | Self::TRANSFER_DST,
        }
    }
}

/// Primary role of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Storage,
    Staging,
}

impl From<BufferUsage> for vk::BufferUsageFlags {
    fn from(usage: BufferUsage) -> Self {
        match usage {
            BufferUsage::Vertex => Self::VERTEX_BUFFER,
            BufferUsage::Index => Self::INDEX_BUFFER,
            BufferUsage::Uniform => Self::UNIFORM_BUFFER,
            BufferUsage::Storage => Self::STORAGE_BUFFER,
            BufferUsage::Staging => Self::empty(),
        }
    }
}

/// Image layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    Preinitialized,
    PresentSrc,
    SharedPresent,
    DepthReadOnlyStencilAttachmentOptimal,
    DepthAttachmentStencilReadOnlyOptimal,
}

impl From<ImageLayout> for vk::ImageLayout {
    fn from(layout: ImageLayout) -> Self {
        match layout {
            ImageLayout::Undefined => Self::UNDEFINED,
            ImageLayout::General => Self::GENERAL,
            ImageLayout::ColorAttachmentOptimal => Self::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachmentOptimal => Self::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilReadOnlyOptimal => Self::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ImageLayout::ShaderReadOnlyOptimal => Self::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrcOptimal => Self::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDstOptimal => Self::TRANSFER_DST_OPTIMAL,
            ImageLayout::Preinitialized => Self::PREINITIALIZED,
            ImageLayout::PresentSrc => Self::PRESENT_SRC_KHR,
            ImageLayout::SharedPresent => Self::SHARED_PRESENT_KHR,
            ImageLayout::DepthReadOnlyStencilAttachmentOptimal => {
                Self::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL
            }
            ImageLayout::DepthAttachmentStencilReadOnlyOptimal => {
                Self::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL
            }
        }
    }
}

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    TopOfPipe,
    DrawIndirect,
    VertexInput,
    VertexShader,
    TessellationControlShader,
    TessellationEvaluationShader,
    GeometryShader,
    FragmentShader,
    EarlyFragmentTests,
    LateFragmentTests,
    ColorAttachmentOutput,
    ComputeShader,
    Transfer,
    BottomOfPipe,
    Host,
    AllGraphics,
    AllCommands,
}

impl From<PipelineStage> for vk::PipelineStageFlags {
    fn from(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::TopOfPipe => Self::TOP_OF_PIPE,
            PipelineStage::DrawIndirect => Self::DRAW_INDIRECT,
            PipelineStage::VertexInput => Self::VERTEX_INPUT,
            PipelineStage::VertexShader => Self::VERTEX_SHADER,
            PipelineStage::TessellationControlShader => Self::TESSELLATION_CONTROL_SHADER,
            PipelineStage::TessellationEvaluationShader => Self::TESSELLATION_EVALUATION_SHADER,
            PipelineStage::GeometryShader => Self::GEOMETRY_SHADER,
            PipelineStage::FragmentShader => Self::FRAGMENT_SHADER,
            PipelineStage::EarlyFragmentTests => Self::EARLY_FRAGMENT_TESTS,
            PipelineStage::LateFragmentTests => Self::LATE_FRAGMENT_TESTS,
            PipelineStage::ColorAttachmentOutput => Self::COLOR_ATTACHMENT_OUTPUT,
            PipelineStage::ComputeShader => Self::COMPUTE_SHADER,
            PipelineStage::Transfer => Self::TRANSFER,
            PipelineStage::BottomOfPipe => Self::BOTTOM_OF_PIPE,
            PipelineStage::Host => Self::HOST,
            PipelineStage::AllGraphics => Self::ALL_GRAPHICS,
            PipelineStage::AllCommands => Self::ALL_COMMANDS,
        }
    }
}

/// Memory access type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessFlag {
    IndirectCommandRead,
    IndexRead,
    VertexAttributeRead,
    UniformRead,
    InputAttachmentRead,
    ShaderRead,
    ShaderWrite,
    ColorAttachmentRead,
    ColorAttachmentWrite,
    DepthStencilAttachmentRead,
    DepthStencilAttachmentWrite,
    TransferRead,
    TransferWrite,
    HostRead,
    HostWrite,
    MemoryRead,
    MemoryWrite,
}

impl From<AccessFlag> for vk::AccessFlags {
    fn from(access: AccessFlag) -> Self {
        match access {
            AccessFlag::IndirectCommandRead => Self::INDIRECT_COMMAND_READ,
            AccessFlag::IndexRead => Self::INDEX_READ,
            AccessFlag::VertexAttributeRead => Self::VERTEX_ATTRIBUTE_READ,
            AccessFlag::UniformRead => Self::UNIFORM_READ,
            AccessFlag::InputAttachmentRead => Self::INPUT_ATTACHMENT_READ,
            AccessFlag::ShaderRead => Self::SHADER_READ,
            AccessFlag::ShaderWrite => Self::SHADER_WRITE,
            AccessFlag::ColorAttachmentRead => Self::COLOR_ATTACHMENT_READ,
            AccessFlag::ColorAttachmentWrite => Self::COLOR_ATTACHMENT_WRITE,
            AccessFlag::DepthStencilAttachmentRead => Self::DEPTH_STENCIL_ATTACHMENT_READ,
            AccessFlag::DepthStencilAttachmentWrite => Self::DEPTH_STENCIL_ATTACHMENT_WRITE,
            AccessFlag::TransferRead => Self::TRANSFER_READ,
            AccessFlag::TransferWrite => Self::TRANSFER_WRITE,
            AccessFlag::HostRead => Self::HOST_READ,
            AccessFlag::HostWrite => Self::HOST_WRITE,
            AccessFlag::MemoryRead => Self::MEMORY_READ,
            AccessFlag::MemoryWrite => Self::MEMORY_WRITE,
        }
    }
}

/// Shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl From<ShaderStage> for vk::ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::TessellationControl => Self::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => Self::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => Self::GEOMETRY,
            ShaderStage::Fragment => Self::FRAGMENT,
            ShaderStage::Compute => Self::COMPUTE,
        }
    }
}

/// Image aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    Color,
    Depth,
    Stencil,
    DepthStencil,
}

impl From<ImageAspect> for vk::ImageAspectFlags {
    fn from(aspect: ImageAspect) -> Self {
        match aspect {
            ImageAspect::Color => Self::COLOR,
            ImageAspect::Depth => Self::DEPTH,
            ImageAspect::Stencil => Self::STENCIL,
            ImageAspect::DepthStencil => Self::DEPTH | Self::STENCIL,
        }
    }
}

/// Pipeline bind point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBind {
    Graphics,
    Compute,
}

impl From<PipelineBind> for vk::PipelineBindPoint {
    fn from(bind: PipelineBind) -> Self {
        match bind {
            PipelineBind::Graphics => Self::GRAPHICS,
            PipelineBind::Compute => Self::COMPUTE,
        }
    }
}

/// How a command buffer will be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandBufferUsage {
    #[default]
    OneTimeSubmit,
    RenderPassContinue,
    SimultaneousUse,
}

impl From<CommandBufferUsage> for vk::CommandBufferUsageFlags {
    fn from(usage: CommandBufferUsage) -> Self {
        match usage {
            CommandBufferUsage::OneTimeSubmit => Self::ONE_TIME_SUBMIT,
            CommandBufferUsage::RenderPassContinue => Self::RENDER_PASS_CONTINUE,
            CommandBufferUsage::SimultaneousUse => Self::SIMULTANEOUS_USE,
        }
    }
}

/// Where subpass commands come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubpassContents {
    #[default]
    Inline,
    SecondaryCommandBuffers,
}

impl From<SubpassContents> for vk::SubpassContents {
    fn from(contents: SubpassContents) -> Self {
        match contents {
            SubpassContents::Inline => Self::INLINE,
            SubpassContents::SecondaryCommandBuffers => Self::SECONDARY_COMMAND_BUFFERS,
        }
    }
}

/// Subresource selection for copies and barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageViewInfo {
    pub base_mip_level: u32,
    pub mip_levels: u32,
    pub base_array_layer: u32,
    pub array_layers: u32,
    pub aspect: ImageAspect,
}

impl Default for ImageViewInfo {
    fn default() -> Self {
        Self {
            base_mip_level: 0,
            mip_levels: 1,
            base_array_layer: 0,
            array_layers: 1,
            aspect: ImageAspect::Color,
        }
    }
}

impl ImageViewInfo {
    /// Full subresource range described by this view.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect.into())
            .base_mip_level(self.base_mip_level)
            .level_count(self.mip_levels)
            .base_array_layer(self.base_array_layer)
            .layer_count(self.array_layers)
    }

    /// Single mip level of this view, used as a copy target.
    pub fn subresource_layers(&self) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers::default()
            .aspect_mask(self.aspect.into())
            .mip_level(self.base_mip_level)
            .base_array_layer(self.base_array_layer)
            .layer_count(self.array_layers)
    }
}

/// Compute dispatch group counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkGroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkGroupSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// OR a set of access types into one flag word.
pub fn fold_access(flags: &[AccessFlag]) -> vk::AccessFlags {
    flags
        .iter()
        .fold(vk::AccessFlags::NONE, |acc, &f| acc | vk::AccessFlags::from(f))
}

/// OR a set of pipeline stages into one flag word.
pub fn fold_stages(stages: &[PipelineStage]) -> vk::PipelineStageFlags {
    stages
        .iter()
        .fold(vk::PipelineStageFlags::NONE, |acc, &s| {
            acc | vk::PipelineStageFlags::from(s)
        })
}

/// OR a set of shader stages into one flag word.
pub fn fold_shader_stages(stages: &[ShaderStage]) -> vk::ShaderStageFlags {
    stages
        .iter()
        .fold(vk::ShaderStageFlags::empty(), |acc, &s| {
            acc | vk::ShaderStageFlags::from(s)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_sets_fold_with_or() {
        let folded = fold_access(&[AccessFlag::ShaderRead, AccessFlag::ShaderWrite]);
        assert_eq!(
            folded,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
        assert_eq!(fold_access(&[]), vk::AccessFlags::NONE);
    }

    #[test]
    fn stage_sets_fold_with_or() {
        let folded = fold_stages(&[PipelineStage::Transfer, PipelineStage::ComputeShader]);
        assert_eq!(
            folded,
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COMPUTE_SHADER
        );
    }

    #[test]
    fn shader_stages_fold_with_or() {
        let folded = fold_shader_stages(&[ShaderStage::Vertex, ShaderStage::Fragment]);
        assert_eq!(
            folded,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn transfer_type_usage_flags() {
        let flags: vk::BufferUsageFlags = TransferType::TransferSrcDst.into();
        assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert!(vk::BufferUsageFlags::from(TransferType::None).is_empty());
    }

    #[test]
    fn default_view_is_single_color_level() {
        let range = ImageViewInfo::default().subresource_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
    }
}
