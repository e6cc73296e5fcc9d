//! Swapchain frame loop.

use pandolabo_core::{Error, Result};
use pandolabo_gpu::{
    CommandBeginInfo, CommandDriver, GpuContext, GraphicCommandBuffer, PipelineStage,
    QueueFamilyType, RenderKit, SubmitSemaphore, SubmitSemaphoreGroup, SwapchainRenderKit,
    WaitToken,
};

/// Renderer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfig {
    /// Clear color for render kits created through [`Renderer::create_render_kit`].
    pub clear_color: [f32; 4],
    /// Stage extra timeline waits block when added with [`FrameContext::wait_on`].
    pub extra_wait_stage: PipelineStage,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            extra_wait_stage: PipelineStage::ColorAttachmentOutput,
        }
    }
}

impl RendererConfig {
    #[must_use]
    pub const fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    #[must_use]
    pub const fn with_extra_wait_stage(mut self, stage: PipelineStage) -> Self {
        self.extra_wait_stage = stage;
        self
    }
}

/// State of one frame between [`Renderer::begin_frame`] and [`Renderer::end_frame`].
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Acquired swapchain image.
    pub image_index: u32,
    /// Frame-sync slot the frame uses.
    pub frame_index: usize,
    extra_wait: Vec<SubmitSemaphore>,
    extra_signal: Vec<SubmitSemaphore>,
    extra_wait_stage: PipelineStage,
}

impl FrameContext {
    /// Make the frame's submission wait on `entry` as well.
    pub fn add_wait(&mut self, entry: SubmitSemaphore) {
        self.extra_wait.push(entry);
    }

    /// Make the frame's submission signal `entry` as well.
    pub fn add_signal(&mut self, entry: SubmitSemaphore) {
        self.extra_signal.push(entry);
    }

    /// Wait on a timeline point at the renderer's configured extra-wait stage.
    pub fn wait_on(&mut self, token: WaitToken) {
        self.add_wait(SubmitSemaphore::wait(token, self.extra_wait_stage));
    }

    pub fn extra_waits(&self) -> &[SubmitSemaphore] {
        &self.extra_wait
    }

    pub fn extra_signals(&self) -> &[SubmitSemaphore] {
        &self.extra_signal
    }

    /// The frame's submission entries: extras first, then the swapchain's own.
    fn into_group(
        self,
        image_available: SubmitSemaphore,
        finished: SubmitSemaphore,
    ) -> SubmitSemaphoreGroup {
        let mut group = SubmitSemaphoreGroup::new();
        for entry in self.extra_wait {
            group.push_wait(entry);
        }
        group.push_wait(image_available);
        for entry in self.extra_signal {
            group.push_signal(entry);
        }
        group.push_signal(finished);
        group
    }
}

/// Drives acquire, record, submit, and present over the context's swapchain.
///
/// Holds one graphics driver per swapchain image. Acquiring an image waits
/// for the fence of whichever frame slot last rendered to it, so the driver
/// for that image is free to reset by the time [`Renderer::begin_frame`]
/// returns.
pub struct Renderer {
    drivers: Vec<CommandDriver>,
    config: RendererConfig,
}

impl Renderer {
    pub fn new(ctx: &GpuContext, config: RendererConfig) -> Result<Self> {
        let drivers = Self::create_drivers(ctx)?;
        tracing::debug!(drivers = drivers.len(), "Created renderer");
        Ok(Self { drivers, config })
    }

    fn create_drivers(ctx: &GpuContext) -> Result<Vec<CommandDriver>> {
        let swapchain = ctx
            .swapchain()
            .map_err(|_| Error::runtime("Swapchain not initialized"))?;
        (0..swapchain.image_count())
            .map(|_| CommandDriver::new(ctx, QueueFamilyType::Graphics).map_err(Error::from))
            .collect()
    }

    /// Rebuild the per-image drivers after the swapchain was recreated.
    ///
    /// The device must be idle.
    pub fn on_swapchain_recreated(&mut self, ctx: &GpuContext) -> Result<()> {
        self.drivers =
            Self::create_drivers(ctx).map_err(|e| e.with_context("Renderer::recreate"))?;
        Ok(())
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// A clear-only render kit over the current swapchain using the configured clear color.
    pub fn create_render_kit(&self, ctx: &GpuContext) -> Result<SwapchainRenderKit> {
        SwapchainRenderKit::new(ctx, self.config.clear_color).map_err(Error::from)
    }

    /// Acquire the next image and prepare its driver for recording.
    ///
    /// When `kit` is given its framebuffer is switched to the acquired image.
    /// An out-of-date swapchain comes back as an error for the caller to
    /// handle by recreating it.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn begin_frame(
        &self,
        ctx: &mut GpuContext,
        kit: Option<&mut dyn RenderKit>,
    ) -> Result<FrameContext> {
        let step = |e: Error| e.with_context("Renderer::beginFrame");

        let swapchain = ctx
            .swapchain_mut()
            .map_err(|_| step(Error::runtime("Swapchain not initialized")))?;
        let suboptimal = swapchain
            .update_image_index()
            .map_err(|e| step(Error::from(e).with_context("acquire")))?;
        if suboptimal {
            tracing::debug!("Swapchain is suboptimal");
        }

        let image_index = swapchain.image_index();
        let frame_index = swapchain.frame_sync_index();

        if let Some(kit) = kit {
            kit.update_index(image_index);
        }

        let driver = self.drivers.get(image_index as usize).ok_or_else(|| {
            step(Error::runtime(format!(
                "No driver for swapchain image {image_index}, call on_swapchain_recreated"
            )))
        })?;
        driver
            .reset_all_command_pools()
            .map_err(|e| step(Error::from(e)))?;

        Ok(FrameContext {
            image_index,
            frame_index,
            extra_wait: Vec::new(),
            extra_signal: Vec::new(),
            extra_wait_stage: self.config.extra_wait_stage,
        })
    }

    /// The driver the frame records into.
    ///
    /// # Panics
    /// If `frame` does not come from this renderer's current swapchain.
    pub fn driver(&self, frame: &FrameContext) -> &CommandDriver {
        &self.drivers[frame.image_index as usize]
    }

    /// Begin the frame's primary buffer, run `f`, and end it.
    pub fn record<F>(&self, frame: &FrameContext, f: F) -> Result<()>
    where
        F: FnOnce(&GraphicCommandBuffer) -> Result<()>,
    {
        let step = |e: Error| e.with_context("Renderer::record");
        let cmd = self.driver(frame).graphic(None);
        cmd.begin(&CommandBeginInfo::new())
            .map_err(|e| step(Error::from(e)))?;
        f(&cmd).map_err(step)?;
        cmd.end().map_err(|e| step(Error::from(e)))
    }

    /// Give back a frame that will not reach [`Renderer::end_frame`].
    ///
    /// Consumes the acquired image so its slot can be reused. Call this when
    /// recording fails between [`Renderer::begin_frame`] and `end_frame`.
    pub fn abort_frame(&self, ctx: &mut GpuContext, frame: FrameContext) -> Result<()> {
        let step = |e: Error| e.with_context("Renderer::abortFrame");
        let queue = self.driver(&frame).queue();
        ctx.swapchain_mut()
            .map_err(|_| step(Error::runtime("Swapchain not initialized")))?
            .abandon_frame(queue)
            .map(|_| ())
            .map_err(|e| step(Error::from(e)))
    }

    /// Submit the frame, present it, and advance to the next frame slot.
    ///
    /// The submission waits on the frame's extra waits and the slot's
    /// image-available semaphore, signals the extra signals and the slot's
    /// render-finished semaphore, and signals the slot fence. A failed submit
    /// abandons the frame before the error is returned.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn end_frame(&self, ctx: &mut GpuContext, frame: FrameContext) -> Result<bool> {
        let step = |e: Error| e.with_context("Renderer::endFrame");
        let driver = self.driver(&frame);

        let swapchain = ctx
            .swapchain()
            .map_err(|_| step(Error::runtime("Swapchain not initialized")))?;
        let group = frame.into_group(
            SubmitSemaphore::binary(
                swapchain.image_available_semaphore(),
                PipelineStage::ColorAttachmentOutput,
            ),
            SubmitSemaphore::binary(swapchain.finished_semaphore(), PipelineStage::AllCommands),
        );

        let submitted = swapchain
            .prepare_submit()
            .and_then(|()| driver.submit(&group, Some(swapchain.fence())));
        if let Err(e) = submitted {
            let queue = driver.queue();
            if let Ok(swapchain) = ctx.swapchain_mut() {
                if let Err(abandon) = swapchain.abandon_frame(queue) {
                    tracing::warn!(error = %abandon, "Failed to abandon frame after submit error");
                }
            }
            return Err(step(Error::from(e).with_context("submit")));
        }

        let finished = swapchain.finished_semaphore();
        let presented = driver.present(ctx, finished);

        // The slot advances even when present fails so the next acquire uses
        // a fresh image-available semaphore.
        ctx.swapchain_mut()
            .map_err(|_| step(Error::runtime("Swapchain not initialized")))?
            .update_frame_sync_index();

        presented.map_err(|e| step(Error::from(e).with_context("present")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pandolabo_gpu::vk::{self, Handle};

    fn raw_semaphore(raw: u64) -> vk::Semaphore {
        vk::Semaphore::from_raw(raw)
    }

    fn frame() -> FrameContext {
        FrameContext {
            image_index: 1,
            frame_index: 0,
            extra_wait: Vec::new(),
            extra_signal: Vec::new(),
            extra_wait_stage: PipelineStage::Transfer,
        }
    }

    fn swapchain_entries() -> (SubmitSemaphore, SubmitSemaphore) {
        (
            SubmitSemaphore::raw_binary(raw_semaphore(1), PipelineStage::ColorAttachmentOutput),
            SubmitSemaphore::raw_binary(raw_semaphore(2), PipelineStage::AllCommands),
        )
    }

    #[test]
    fn swapchain_semaphores_follow_extras() {
        let mut frame = frame();
        frame.add_wait(SubmitSemaphore::raw_binary(
            raw_semaphore(10),
            PipelineStage::ComputeShader,
        ));
        frame.add_signal(SubmitSemaphore::raw_binary(
            raw_semaphore(11),
            PipelineStage::AllCommands,
        ));
        assert_eq!(frame.extra_waits().len(), 1);
        assert_eq!(frame.extra_signals().len(), 1);

        let (available, finished) = swapchain_entries();
        let group = frame.into_group(available, finished);

        assert_eq!(group.wait_semaphores(), &[raw_semaphore(10), raw_semaphore(1)]);
        assert_eq!(group.signal_semaphores(), &[raw_semaphore(11), raw_semaphore(2)]);
        assert_eq!(
            group.resolved_wait_stages(),
            vec![
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            ]
        );
    }

    #[test]
    fn frame_without_extras_uses_swapchain_pair_only() {
        let (available, finished) = swapchain_entries();
        let group = frame().into_group(available, finished);
        assert_eq!(group.wait_semaphores(), &[raw_semaphore(1)]);
        assert_eq!(group.signal_semaphores(), &[raw_semaphore(2)]);
        assert_eq!(group.wait_values(), &[0]);
    }

    #[test]
    fn config_builders() {
        let config = RendererConfig::default()
            .with_clear_color([0.1, 0.2, 0.3, 1.0])
            .with_extra_wait_stage(PipelineStage::VertexInput);
        assert_eq!(config.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.extra_wait_stage, PipelineStage::VertexInput);
    }
}
