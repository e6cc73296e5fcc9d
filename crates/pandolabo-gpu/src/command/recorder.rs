//! Tiered command recorders.

use crate::barrier::{AccessBarrier, BufferBarrier, ImageBarrier, MemoryBarrier};
use crate::error::Result;
use crate::memory::{Buffer, Image};
use crate::pipeline::Pipeline;
use crate::render_kit::RenderKit;
use crate::types::{
    fold_shader_stages, fold_stages, CommandBufferUsage, ImageLayout, ImageViewInfo,
    PipelineStage, ShaderStage, SubpassContents, WorkGroupSize,
};
use ash::vk;
use std::cell::Cell;
use std::ops::Deref;
use std::sync::Arc;

/// Recording lifecycle of one command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Initial,
    Recording,
    Ended,
}

/// Render pass a secondary buffer continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inheritance {
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub framebuffer: vk::Framebuffer,
}

impl Inheritance {
    /// Continue the kit's render pass at `subpass` into its current framebuffer.
    pub fn from_kit(kit: &dyn RenderKit, subpass: u32) -> Self {
        Self {
            render_pass: kit.render_pass(),
            subpass,
            framebuffer: kit.framebuffer(),
        }
    }
}

/// How a recording is begun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandBeginInfo {
    pub usage: CommandBufferUsage,
    pub inheritance: Option<Inheritance>,
}

impl CommandBeginInfo {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn usage(mut self, usage: CommandBufferUsage) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn inheritance(mut self, inheritance: Inheritance) -> Self {
        self.inheritance = Some(inheritance);
        self
    }
}

/// Layout a buffer-to-image copy writes with.
///
/// `General`, `SharedPresent`, and `TransferDstOptimal` pass through; any
/// other layout is replaced with `TransferDstOptimal`.
pub fn coerce_copy_dst_layout(layout: ImageLayout) -> ImageLayout {
    match layout {
        ImageLayout::General | ImageLayout::SharedPresent | ImageLayout::TransferDstOptimal => {
            layout
        }
        other => {
            tracing::warn!(?other, "Copy destination layout coerced to TransferDstOptimal");
            ImageLayout::TransferDstOptimal
        }
    }
}

/// Layout an image-to-buffer copy reads with.
///
/// `General`, `SharedPresent`, and `TransferSrcOptimal` pass through; any
/// other layout is replaced with `TransferSrcOptimal`.
pub fn coerce_copy_src_layout(layout: ImageLayout) -> ImageLayout {
    match layout {
        ImageLayout::General | ImageLayout::SharedPresent | ImageLayout::TransferSrcOptimal => {
            layout
        }
        other => {
            tracing::warn!(?other, "Copy source layout coerced to TransferSrcOptimal");
            ImageLayout::TransferSrcOptimal
        }
    }
}

/// One blit in a mip chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipStep {
    pub src_level: u32,
    pub dst_level: u32,
    pub src_extent: vk::Extent2D,
    pub dst_extent: vk::Extent2D,
}

/// Blit steps that fill levels `1..mip_levels` from their predecessors.
pub fn mip_chain_plan(extent: vk::Extent2D, mip_levels: u32) -> Vec<MipStep> {
    let mut width = extent.width.max(1);
    let mut height = extent.height.max(1);

    (1..mip_levels.max(1))
        .map(|level| {
            let src_extent = vk::Extent2D { width, height };
            width = (width / 2).max(1);
            height = (height / 2).max(1);
            MipStep {
                src_level: level - 1,
                dst_level: level,
                src_extent,
                dst_extent: vk::Extent2D { width, height },
            }
        })
        .collect()
}

fn assert_primary(secondary: bool, op: &str) {
    assert!(!secondary, "{op} is only valid on a primary command buffer");
}

fn stage_mask(
    stages: &[PipelineStage],
    fallback: vk::PipelineStageFlags,
) -> vk::PipelineStageFlags {
    if stages.is_empty() {
        fallback
    } else {
        fold_stages(stages)
    }
}

fn blit_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: i32::try_from(extent.width).unwrap_or(i32::MAX),
        y: i32::try_from(extent.height).unwrap_or(i32::MAX),
        z: 1,
    }
}

fn level_barrier(
    image: vk::Image,
    level: u32,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .image(image)
        .subresource_range(
            ImageViewInfo {
                base_mip_level: level,
                ..ImageViewInfo::default()
            }
            .subresource_range(),
        )
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout.into())
        .new_layout(new_layout.into())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
}

fn image_copy_region(image: &Image, view: &ImageViewInfo) -> vk::BufferImageCopy {
    let extent = image.extent();
    let level = view.base_mip_level;
    vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(view.subresource_layers())
        .image_offset(vk::Offset3D::default())
        .image_extent(vk::Extent3D {
            width: (extent.width >> level).max(1),
            height: (extent.height >> level).max(1),
            depth: (extent.depth >> level).max(1),
        })
}

/// A command buffer being recorded, with the operations every tier shares.
pub struct CommandRecorder {
    buffer: vk::CommandBuffer,
    secondary: bool,
    state: Cell<RecorderState>,
    device: Arc<ash::Device>,
}

impl CommandRecorder {
    pub(crate) fn new(
        device: Arc<ash::Device>,
        buffer: vk::CommandBuffer,
        secondary: bool,
    ) -> Self {
        Self {
            buffer,
            secondary,
            state: Cell::new(RecorderState::Initial),
            device,
        }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    pub fn is_secondary(&self) -> bool {
        self.secondary
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    pub(crate) fn device(&self) -> &ash::Device {
        &self.device
    }

    pub(crate) fn expect_recording(&self, op: &str) {
        debug_assert_eq!(
            self.state.get(),
            RecorderState::Recording,
            "{op} recorded outside begin/end"
        );
    }

    /// Begin recording.
    ///
    /// A secondary buffer always gets an inheritance info, with a null render
    /// pass when none was given.
    pub fn begin(&self, info: &CommandBeginInfo) -> Result<()> {
        let mut inheritance_info = vk::CommandBufferInheritanceInfo::default();
        if let Some(inheritance) = info.inheritance {
            inheritance_info = inheritance_info
                .render_pass(inheritance.render_pass)
                .subpass(inheritance.subpass)
                .framebuffer(inheritance.framebuffer);
        }

        let mut begin_info = vk::CommandBufferBeginInfo::default().flags(info.usage.into());
        if self.secondary {
            begin_info = begin_info.inheritance_info(&inheritance_info);
        }

        unsafe { self.device.begin_command_buffer(self.buffer, &begin_info)? };
        self.state.set(RecorderState::Recording);
        Ok(())
    }

    pub fn end(&self) -> Result<()> {
        self.expect_recording("end");
        unsafe { self.device.end_command_buffer(self.buffer)? };
        self.state.set(RecorderState::Ended);
        Ok(())
    }

    pub fn set_buffer_barrier(
        &self,
        barrier: &BufferBarrier,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
    ) {
        self.set_pipeline_barrier(&[(*barrier).into()], &[src_stage], &[dst_stage]);
    }

    pub fn set_image_barrier(
        &self,
        barrier: &ImageBarrier,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
    ) {
        self.set_pipeline_barrier(&[(*barrier).into()], &[src_stage], &[dst_stage]);
    }

    pub fn set_memory_barrier(
        &self,
        barrier: &MemoryBarrier,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
    ) {
        self.set_pipeline_barrier(&[(*barrier).into()], &[src_stage], &[dst_stage]);
    }

    /// Insert a batch of barriers in one call.
    ///
    /// An empty source stage set means `TOP_OF_PIPE`; an empty destination
    /// set means `BOTTOM_OF_PIPE`.
    pub fn set_pipeline_barrier(
        &self,
        barriers: &[AccessBarrier],
        src_stages: &[PipelineStage],
        dst_stages: &[PipelineStage],
    ) {
        self.expect_recording("set_pipeline_barrier");

        let mut memory = Vec::new();
        let mut buffers = Vec::new();
        let mut images = Vec::new();
        for barrier in barriers {
            match barrier {
                AccessBarrier::Memory(b) => memory.push(b.to_vk()),
                AccessBarrier::Buffer(b) => buffers.push(b.to_vk()),
                AccessBarrier::Image(b) => images.push(b.to_vk()),
            }
        }

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.buffer,
                stage_mask(src_stages, vk::PipelineStageFlags::TOP_OF_PIPE),
                stage_mask(dst_stages, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
                vk::DependencyFlags::empty(),
                &memory,
                &buffers,
                &images,
            );
        }
    }

    /// Bind at the pipeline's own bind point.
    pub fn bind_pipeline(&self, pipeline: &Pipeline) {
        self.expect_recording("bind_pipeline");
        unsafe {
            self.device.cmd_bind_pipeline(
                self.buffer,
                pipeline.bind_point().into(),
                pipeline.handle(),
            );
        }
    }

    /// Bind `set` as descriptor set 0.
    pub fn bind_descriptor_set(&self, pipeline: &Pipeline, set: vk::DescriptorSet) {
        self.expect_recording("bind_descriptor_set");
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.buffer,
                pipeline.bind_point().into(),
                pipeline.layout(),
                0,
                &[set],
                &[],
            );
        }
    }

    pub fn push_constants(
        &self,
        pipeline: &Pipeline,
        stages: &[ShaderStage],
        offset: u32,
        data: &[f32],
    ) {
        self.expect_recording("push_constants");
        unsafe {
            self.device.cmd_push_constants(
                self.buffer,
                pipeline.layout(),
                fold_shader_stages(stages),
                offset,
                bytemuck::cast_slice(data),
            );
        }
    }

    /// Reset this buffer alone, back to the initial state.
    pub fn reset_commands(&self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        self.state.set(RecorderState::Initial);
        Ok(())
    }
}

/// Copies, mip generation, and mip ownership transfer.
pub trait TransferOps {
    fn recorder(&self) -> &CommandRecorder;

    /// Copy all of `src` to the start of `dst`.
    fn copy_buffer(&self, src: &Buffer, dst: &Buffer) {
        debug_assert!(dst.size() >= src.size(), "copy_buffer destination too small");
        self.copy_buffer_region(src, dst, 0, 0, src.size());
    }

    fn copy_buffer_region(
        &self,
        src: &Buffer,
        dst: &Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let rec = self.recorder();
        rec.expect_recording("copy_buffer");
        let region = vk::BufferCopy::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe {
            rec.device()
                .cmd_copy_buffer(rec.handle(), src.handle(), dst.handle(), &[region]);
        }
    }

    /// Copy a tightly packed buffer into one level of `dst`.
    fn copy_buffer_to_image(
        &self,
        src: &Buffer,
        dst: &Image,
        layout: ImageLayout,
        view: &ImageViewInfo,
    ) {
        let rec = self.recorder();
        rec.expect_recording("copy_buffer_to_image");
        let layout = coerce_copy_dst_layout(layout);
        let region = image_copy_region(dst, view);
        unsafe {
            rec.device().cmd_copy_buffer_to_image(
                rec.handle(),
                src.handle(),
                dst.handle(),
                layout.into(),
                &[region],
            );
        }
    }

    /// Copy one level of `src` into a tightly packed buffer.
    fn copy_image_to_buffer(
        &self,
        src: &Image,
        dst: &Buffer,
        layout: ImageLayout,
        view: &ImageViewInfo,
    ) {
        let rec = self.recorder();
        rec.expect_recording("copy_image_to_buffer");
        let layout = coerce_copy_src_layout(layout);
        let region = image_copy_region(src, view);
        unsafe {
            rec.device().cmd_copy_image_to_buffer(
                rec.handle(),
                src.handle(),
                layout.into(),
                dst.handle(),
                &[region],
            );
        }
    }

    /// Fill the mip chain of `image` from level 0 by repeated blits.
    ///
    /// Every level must start in `TransferDstOptimal` with level 0 written.
    /// Each level is made a blit source before its blit and released to
    /// `dst_stage` after it. Levels end in `ShaderReadOnlyOptimal`, or in
    /// `TransferDstOptimal` when `dst_stage` is `Transfer` or `BottomOfPipe`.
    fn set_mipmaps(&self, image: &Image, dst_stage: PipelineStage) {
        let rec = self.recorder();
        rec.expect_recording("set_mipmaps");
        let device = rec.device();
        let cmd = rec.handle();
        let handle = image.handle();

        let (final_layout, final_access) = match dst_stage {
            PipelineStage::Transfer => {
                (ImageLayout::TransferDstOptimal, vk::AccessFlags::TRANSFER_WRITE)
            }
            PipelineStage::BottomOfPipe => {
                (ImageLayout::TransferDstOptimal, vk::AccessFlags::SHADER_READ)
            }
            _ => (ImageLayout::ShaderReadOnlyOptimal, vk::AccessFlags::SHADER_READ),
        };
        let dst_mask = vk::PipelineStageFlags::from(dst_stage);
        let extent = image.extent();

        for step in mip_chain_plan(
            vk::Extent2D {
                width: extent.width,
                height: extent.height,
            },
            image.mip_levels(),
        ) {
            let to_src = level_barrier(
                handle,
                step.src_level,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
                ImageLayout::TransferDstOptimal,
                ImageLayout::TransferSrcOptimal,
            );

            let subresource = |level| {
                ImageViewInfo {
                    base_mip_level: level,
                    ..ImageViewInfo::default()
                }
                .subresource_layers()
            };
            let blit = vk::ImageBlit::default()
                .src_subresource(subresource(step.src_level))
                .src_offsets([vk::Offset3D::default(), blit_corner(step.src_extent)])
                .dst_subresource(subresource(step.dst_level))
                .dst_offsets([vk::Offset3D::default(), blit_corner(step.dst_extent)]);

            let done = level_barrier(
                handle,
                step.src_level,
                vk::AccessFlags::TRANSFER_READ,
                final_access,
                ImageLayout::TransferSrcOptimal,
                final_layout,
            );

            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_src],
                );
                device.cmd_blit_image(
                    cmd,
                    handle,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    dst_mask,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[done],
                );
            }
        }

        let last = level_barrier(
            handle,
            image.mip_levels().max(1) - 1,
            vk::AccessFlags::TRANSFER_WRITE,
            final_access,
            ImageLayout::TransferDstOptimal,
            final_layout,
        );
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                dst_mask,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[last],
            );
        }
    }

    /// Release every mip level of `image` from `families.0` to `families.1`.
    ///
    /// Levels stay in `TransferDstOptimal`.
    fn transfer_mipmap_images(
        &self,
        image: &Image,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        families: (u32, u32),
    ) {
        record_mip_ownership(
            self.recorder(),
            image,
            src_stage,
            dst_stage,
            families,
            ImageLayout::TransferDstOptimal,
        );
    }

    /// Acquire every mip level of `image` released by
    /// [`TransferOps::transfer_mipmap_images`], transitioning to
    /// `ShaderReadOnlyOptimal`.
    fn acquire_mipmap_images(
        &self,
        image: &Image,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        families: (u32, u32),
    ) {
        record_mip_ownership(
            self.recorder(),
            image,
            src_stage,
            dst_stage,
            families,
            ImageLayout::ShaderReadOnlyOptimal,
        );
    }
}

fn record_mip_ownership(
    rec: &CommandRecorder,
    image: &Image,
    src_stage: PipelineStage,
    dst_stage: PipelineStage,
    families: (u32, u32),
    new_layout: ImageLayout,
) {
    rec.expect_recording("mip ownership transfer");
    let barriers: Vec<_> = (0..image.mip_levels())
        .map(|level| {
            level_barrier(
                image.handle(),
                level,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                ImageLayout::TransferDstOptimal,
                new_layout,
            )
            .src_queue_family_index(families.0)
            .dst_queue_family_index(families.1)
        })
        .collect();

    unsafe {
        rec.device().cmd_pipeline_barrier(
            rec.handle(),
            src_stage.into(),
            dst_stage.into(),
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &barriers,
        );
    }
}

/// Compute dispatch.
pub trait ComputeOps: TransferOps {
    fn dispatch(&self, groups: WorkGroupSize) {
        let rec = self.recorder();
        rec.expect_recording("dispatch");
        unsafe {
            rec.device()
                .cmd_dispatch(rec.handle(), groups.x, groups.y, groups.z);
        }
    }
}

/// Rasterization state, draws, and render pass control.
pub trait GraphicOps: ComputeOps {
    fn set_viewport(&self, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        let rec = self.recorder();
        rec.expect_recording("set_viewport");
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth,
            max_depth,
        };
        unsafe { rec.device().cmd_set_viewport(rec.handle(), 0, &[viewport]) };
    }

    fn set_scissor(&self, extent: vk::Extent2D) {
        let rec = self.recorder();
        rec.expect_recording("set_scissor");
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        unsafe { rec.device().cmd_set_scissor(rec.handle(), 0, &[scissor]) };
    }

    /// Bind at binding 0.
    fn bind_vertex_buffer(&self, buffer: &Buffer, offset: u64) {
        let rec = self.recorder();
        rec.expect_recording("bind_vertex_buffer");
        unsafe {
            rec.device()
                .cmd_bind_vertex_buffers(rec.handle(), 0, &[buffer.handle()], &[offset]);
        }
    }

    /// Bind with 32-bit indices.
    fn bind_index_buffer(&self, buffer: &Buffer, offset: u64) {
        let rec = self.recorder();
        rec.expect_recording("bind_index_buffer");
        unsafe {
            rec.device().cmd_bind_index_buffer(
                rec.handle(),
                buffer.handle(),
                offset,
                vk::IndexType::UINT32,
            );
        }
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        let rec = self.recorder();
        rec.expect_recording("draw");
        unsafe {
            rec.device().cmd_draw(
                rec.handle(),
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        let rec = self.recorder();
        rec.expect_recording("draw_indexed");
        unsafe {
            rec.device().cmd_draw_indexed(
                rec.handle(),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    /// Begin the kit's render pass over its current framebuffer.
    ///
    /// # Panics
    /// On a secondary command buffer.
    fn begin_renderpass(&self, kit: &dyn RenderKit, area: vk::Extent2D, contents: SubpassContents) {
        let rec = self.recorder();
        assert_primary(rec.is_secondary(), "begin_renderpass");
        rec.expect_recording("begin_renderpass");

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(kit.render_pass())
            .framebuffer(kit.framebuffer())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: area,
            })
            .clear_values(kit.clear_values());

        unsafe {
            rec.device()
                .cmd_begin_render_pass(rec.handle(), &begin_info, contents.into());
        }
    }

    /// # Panics
    /// On a secondary command buffer.
    fn end_renderpass(&self) {
        let rec = self.recorder();
        assert_primary(rec.is_secondary(), "end_renderpass");
        rec.expect_recording("end_renderpass");
        unsafe { rec.device().cmd_end_render_pass(rec.handle()) };
    }

    /// # Panics
    /// On a secondary command buffer.
    fn next_subpass(&self, contents: SubpassContents) {
        let rec = self.recorder();
        assert_primary(rec.is_secondary(), "next_subpass");
        rec.expect_recording("next_subpass");
        unsafe { rec.device().cmd_next_subpass(rec.handle(), contents.into()) };
    }
}

/// Recorder limited to transfer operations.
pub struct TransferCommandBuffer {
    recorder: CommandRecorder,
}

/// Recorder with transfer and compute operations.
pub struct ComputeCommandBuffer {
    recorder: CommandRecorder,
}

/// Recorder with every operation.
pub struct GraphicCommandBuffer {
    recorder: CommandRecorder,
}

impl TransferCommandBuffer {
    pub(crate) fn new(recorder: CommandRecorder) -> Self {
        Self { recorder }
    }
}

impl ComputeCommandBuffer {
    pub(crate) fn new(recorder: CommandRecorder) -> Self {
        Self { recorder }
    }
}

impl GraphicCommandBuffer {
    pub(crate) fn new(recorder: CommandRecorder) -> Self {
        Self { recorder }
    }
}

impl Deref for TransferCommandBuffer {
    type Target = CommandRecorder;

    fn deref(&self) -> &CommandRecorder {
        &self.recorder
    }
}

impl Deref for ComputeCommandBuffer {
    type Target = CommandRecorder;

    fn deref(&self) -> &CommandRecorder {
        &self.recorder
    }
}

impl Deref for GraphicCommandBuffer {
    type Target = CommandRecorder;

    fn deref(&self) -> &CommandRecorder {
        &self.recorder
    }
}

impl TransferOps for TransferCommandBuffer {
    fn recorder(&self) -> &CommandRecorder {
        &self.recorder
    }
}

impl TransferOps for ComputeCommandBuffer {
    fn recorder(&self) -> &CommandRecorder {
        &self.recorder
    }
}

impl ComputeOps for ComputeCommandBuffer {}

impl TransferOps for GraphicCommandBuffer {
    fn recorder(&self) -> &CommandRecorder {
        &self.recorder
    }
}

impl ComputeOps for GraphicCommandBuffer {}

impl GraphicOps for GraphicCommandBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn mip_chain_halves_and_clamps() {
        let plan = mip_chain_plan(extent(8, 2), 4);
        assert_eq!(plan.len(), 3);

        assert_eq!(plan[0].src_level, 0);
        assert_eq!(plan[0].dst_level, 1);
        assert_eq!(plan[0].src_extent, extent(8, 2));
        assert_eq!(plan[0].dst_extent, extent(4, 1));

        assert_eq!(plan[1].dst_extent, extent(2, 1));
        assert_eq!(plan[2].src_extent, extent(2, 1));
        assert_eq!(plan[2].dst_extent, extent(1, 1));
    }

    #[test]
    fn single_level_has_no_blits() {
        assert!(mip_chain_plan(extent(64, 64), 1).is_empty());
        assert!(mip_chain_plan(extent(64, 64), 0).is_empty());
    }

    #[test]
    fn copy_layouts_pass_through_when_valid() {
        for layout in [
            ImageLayout::General,
            ImageLayout::SharedPresent,
            ImageLayout::TransferDstOptimal,
        ] {
            assert_eq!(coerce_copy_dst_layout(layout), layout);
        }
        assert_eq!(
            coerce_copy_src_layout(ImageLayout::TransferSrcOptimal),
            ImageLayout::TransferSrcOptimal
        );
        assert_eq!(
            coerce_copy_src_layout(ImageLayout::General),
            ImageLayout::General
        );
    }

    #[test]
    fn incompatible_copy_layouts_are_coerced() {
        assert_eq!(
            coerce_copy_dst_layout(ImageLayout::ShaderReadOnlyOptimal),
            ImageLayout::TransferDstOptimal
        );
        assert_eq!(
            coerce_copy_dst_layout(ImageLayout::TransferSrcOptimal),
            ImageLayout::TransferDstOptimal
        );
        assert_eq!(
            coerce_copy_src_layout(ImageLayout::Undefined),
            ImageLayout::TransferSrcOptimal
        );
    }

    #[test]
    fn empty_stage_sets_use_pipe_ends() {
        assert_eq!(
            stage_mask(&[], vk::PipelineStageFlags::TOP_OF_PIPE),
            vk::PipelineStageFlags::TOP_OF_PIPE
        );
        assert_eq!(
            stage_mask(&[PipelineStage::Transfer], vk::PipelineStageFlags::TOP_OF_PIPE),
            vk::PipelineStageFlags::TRANSFER
        );
    }

    #[test]
    fn begin_info_defaults_to_one_time_submit() {
        let info = CommandBeginInfo::new();
        assert_eq!(info.usage, CommandBufferUsage::OneTimeSubmit);
        assert!(info.inheritance.is_none());
    }

    #[test]
    #[should_panic(expected = "only valid on a primary")]
    fn primary_only_ops_reject_secondaries() {
        assert_primary(true, "begin_renderpass");
    }
}
