//! Per-frame uniform upload and clear-and-present rendering.

use std::sync::Arc;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use pandolabo_gpu::{
    buffer_ownership_transfer_pair, AccessFlag, Buffer, BufferBarrier, BufferBarrierBuilder,
    BufferUsage, CommandBeginInfo, CommandDriver, GpuContext, GpuContextBuilder, GraphicOps,
    MemoryUsage, PipelineStage, QueueFamilyType, RenderKit, SubmitSemaphoreGroup,
    SubpassContents, SwapchainRenderKit, TimelinePolicy, TimelineTracker, TransferOps,
    TransferType,
};
use pandolabo_highlevel::{FrameContext, Renderer, RendererConfig};
use tracing::{debug, info, warn};
use winit::window::Window;

use crate::runner::AppConfig;

/// Per-frame data uploaded through the transfer queue.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub color: Vec4,
    pub time: f32,
    pub frame: u32,
    _pad: [u32; 2],
}

impl FrameUniforms {
    /// Colour cycling through hues over time.
    pub fn at(time: f32, frame: u32) -> Self {
        let phase = |offset: f32| 0.5 + 0.5 * (time + offset).sin();
        Self {
            color: Vec4::new(
                phase(0.0),
                phase(std::f32::consts::TAU / 3.0),
                phase(2.0 * std::f32::consts::TAU / 3.0),
                1.0,
            ),
            time,
            frame,
            _pad: [0; 2],
        }
    }
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<FrameUniforms>() as u64;

/// Transfer-queue resources for one frame slot.
///
/// Reusable once the slot's fence has been waited on, since the graphics
/// submission that waited on the slot's timeline signals that fence.
struct UploadSlot {
    driver: CommandDriver,
    tracker: TimelineTracker,
    release: BufferBarrier,
    acquire: BufferBarrier,
    staging: Buffer,
    uniforms: Buffer,
}

impl UploadSlot {
    fn new(ctx: &GpuContext) -> anyhow::Result<Self> {
        let driver = CommandDriver::new(ctx, QueueFamilyType::Transfer)?;
        let staging = Buffer::staging_to_gpu(ctx, UNIFORM_SIZE)?;
        let uniforms = Buffer::new(
            ctx,
            UNIFORM_SIZE,
            BufferUsage::Uniform,
            TransferType::TransferDst,
            MemoryUsage::GpuOnly,
            "frame_uniforms",
        )?;

        let (release, acquire) = buffer_ownership_transfer_pair(
            BufferBarrierBuilder::new()
                .buffer(&uniforms)
                .src_access(&[AccessFlag::TransferWrite])
                .dst_access(&[AccessFlag::UniformRead]),
            driver.queue_family_index(),
            ctx.queue_family_index(QueueFamilyType::Graphics),
        )?;
        let tracker = TimelineTracker::new(&ctx.device_arc(), TimelinePolicy::default())?;

        Ok(Self {
            driver,
            tracker,
            release,
            acquire,
            staging,
            uniforms,
        })
    }

    /// Copy `data` to the device and release it to the graphics queue.
    ///
    /// Returns the timeline value the upload signals.
    fn upload(&mut self, data: &FrameUniforms) -> anyhow::Result<u64> {
        self.staging.write(std::slice::from_ref(data))?;

        self.driver.reset_all_command_pools()?;
        let cmd = self.driver.transfer(None);
        cmd.begin(&CommandBeginInfo::new())?;
        cmd.copy_buffer(&self.staging, &self.uniforms);
        cmd.set_buffer_barrier(
            &self.release,
            PipelineStage::Transfer,
            PipelineStage::BottomOfPipe,
        );
        cmd.end()?;

        let signal = self.tracker.next_signal()?;
        self.driver
            .submit(&SubmitSemaphoreGroup::new().signal_token(signal), None)?;
        Ok(signal.value())
    }
}

/// Everything the viewer owns once the window exists.
///
/// Fields drop in declaration order; the context outlives every object
/// created from it and the window outlives the surface.
pub struct ViewerState {
    slots: Vec<UploadSlot>,
    kit: Option<SwapchainRenderKit>,
    renderer: Renderer,
    ctx: GpuContext,
    window: Arc<Window>,
    started: Instant,
    frame_count: u32,
    needs_recreate: bool,
}

impl ViewerState {
    pub fn new(window: Arc<Window>, config: &AppConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let ctx = GpuContextBuilder::new()
            .app_name(config.title.clone())
            .validation(config.validation)
            .window(window.as_ref())
            .extent(size.width, size.height)
            .vsync(config.vsync)
            .build()?;

        let renderer = Renderer::new(
            &ctx,
            RendererConfig::default().with_extra_wait_stage(PipelineStage::FragmentShader),
        )?;
        let kit = renderer.create_render_kit(&ctx)?;
        let slots = Self::create_slots(&ctx)?;

        info!(
            slots = slots.len(),
            graphics_family = ctx.queue_family_index(QueueFamilyType::Graphics),
            transfer_family = ctx.queue_family_index(QueueFamilyType::Transfer),
            "Viewer state created"
        );

        Ok(Self {
            slots,
            kit: Some(kit),
            renderer,
            ctx,
            window,
            started: Instant::now(),
            frame_count: 0,
            needs_recreate: false,
        })
    }

    fn create_slots(ctx: &GpuContext) -> anyhow::Result<Vec<UploadSlot>> {
        let count = ctx.swapchain()?.frame_slot_count();
        (0..count).map(|_| UploadSlot::new(ctx)).collect()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        debug!(width, height, "Window resized");
        self.needs_recreate = true;
    }

    /// Wait for all submitted work before the state is dropped.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.ctx.wait_idle()?;
        Ok(())
    }

    /// Render one frame, recreating the swapchain first when needed.
    ///
    /// A failed frame marks the swapchain for recreation. The error is only
    /// returned when recreation fails or the frame right after it fails too.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn redraw(&mut self) -> anyhow::Result<()> {
        let recreated = self.needs_recreate;
        if recreated && !self.recreate()? {
            return Ok(());
        }

        match self.render_frame() {
            Ok(true) => {
                debug!("Present reported a suboptimal swapchain");
                self.needs_recreate = true;
            }
            Ok(false) => {}
            Err(e) if recreated => return Err(e.context("Frame failed on a fresh swapchain")),
            Err(e) => {
                warn!("Frame failed, recreating swapchain: {e:#}");
                self.needs_recreate = true;
            }
        }
        Ok(())
    }

    /// Returns whether the swapchain was rebuilt. A minimised window keeps
    /// the request pending.
    fn recreate(&mut self) -> anyhow::Result<bool> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(false);
        }

        self.ctx.wait_idle()?;
        self.kit = None;
        self.slots.clear();

        self.ctx.recreate_swapchain(size.width, size.height)?;
        self.renderer.on_swapchain_recreated(&self.ctx)?;
        self.kit = Some(self.renderer.create_render_kit(&self.ctx)?);
        self.slots = Self::create_slots(&self.ctx)?;

        self.needs_recreate = false;
        info!(width = size.width, height = size.height, "Swapchain recreated");
        Ok(true)
    }

    fn render_frame(&mut self) -> anyhow::Result<bool> {
        let Some(kit) = self.kit.as_mut() else {
            return Ok(false);
        };

        let dyn_kit: &mut dyn RenderKit = kit;
        let mut frame = self.renderer.begin_frame(&mut self.ctx, Some(dyn_kit))?;

        if let Err(e) = self.record_frame(&mut frame) {
            if let Err(abort) = self.renderer.abort_frame(&mut self.ctx, frame) {
                warn!("Failed to abort frame: {abort}");
            }
            return Err(e);
        }

        let suboptimal = self.renderer.end_frame(&mut self.ctx, frame)?;
        self.frame_count = self.frame_count.wrapping_add(1);
        Ok(suboptimal)
    }

    fn record_frame(&mut self, frame: &mut FrameContext) -> anyhow::Result<()> {
        let kit = self
            .kit
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Render kit missing"))?;

        let uniforms = FrameUniforms::at(self.started.elapsed().as_secs_f32(), self.frame_count);
        let slot = self
            .slots
            .get_mut(frame.frame_index)
            .ok_or_else(|| anyhow::anyhow!("No upload slot {}", frame.frame_index))?;
        let value = slot.upload(&uniforms)?;
        debug!(value, frame = self.frame_count, "Uniform upload submitted");
        frame.wait_on(slot.tracker.current_wait());

        kit.set_clear_color(uniforms.color.to_array());
        let extent = kit.extent();
        let acquire = slot.acquire;
        let kit: &SwapchainRenderKit = kit;
        self.renderer.record(frame, |cmd| {
            cmd.set_buffer_barrier(
                &acquire,
                PipelineStage::TopOfPipe,
                PipelineStage::FragmentShader,
            );
            cmd.set_viewport(extent.width as f32, extent.height as f32, 0.0, 1.0);
            cmd.set_scissor(extent);
            cmd.begin_renderpass(kit, extent, SubpassContents::Inline);
            cmd.end_renderpass();
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_have_no_padding_surprises() {
        assert_eq!(UNIFORM_SIZE, 32);
    }

    #[test]
    fn colors_stay_in_unit_range() {
        for step in 0..64u8 {
            let uniforms = FrameUniforms::at(f32::from(step) * 0.25, u32::from(step));
            for channel in uniforms.color.to_array() {
                assert!((0.0..=1.0).contains(&channel));
            }
            assert!((uniforms.color.w - 1.0).abs() < f32::EPSILON);
        }
    }
}
