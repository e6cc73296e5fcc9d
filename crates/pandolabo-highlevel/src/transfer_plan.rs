//! Batched barriers and copies played back in one submission.

use pandolabo_core::{Error, Result};
use pandolabo_gpu::{
    AccessBarrier, AccessFlag, Buffer, BufferBarrier, CommandBeginInfo, CommandDriver,
    GpuContext, Image, ImageBarrier, ImageBarrierBuilder, ImageLayout, ImageViewInfo,
    PipelineStage, QueueFamilyType, SubmitSemaphoreGroup, TransferOps,
};

/// One recorded step of a [`TransferPlan`].
#[derive(Clone)]
pub enum PlanOp<'a> {
    /// A batch of barriers inserted with one pipeline-barrier call.
    Barrier {
        barriers: Vec<AccessBarrier>,
        src_stages: Vec<PipelineStage>,
        dst_stages: Vec<PipelineStage>,
    },
    CopyBuffer {
        src: &'a Buffer,
        dst: &'a Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToImage {
        src: &'a Buffer,
        dst: &'a Image,
        layout: ImageLayout,
        view: ImageViewInfo,
    },
    CopyImageToBuffer {
        src: &'a Image,
        dst: &'a Buffer,
        layout: ImageLayout,
        view: ImageViewInfo,
    },
}

#[derive(Debug, Default, Clone)]
struct PendingBarriers {
    barriers: Vec<AccessBarrier>,
    src_stages: Vec<PipelineStage>,
    dst_stages: Vec<PipelineStage>,
}

impl PendingBarriers {
    fn push(&mut self, barrier: AccessBarrier, src: &[PipelineStage], dst: &[PipelineStage]) {
        self.barriers.push(barrier);
        for &stage in src {
            if !self.src_stages.contains(&stage) {
                self.src_stages.push(stage);
            }
        }
        for &stage in dst {
            if !self.dst_stages.contains(&stage) {
                self.dst_stages.push(stage);
            }
        }
    }

    fn take(&mut self) -> Option<PlanOp<'static>> {
        if self.barriers.is_empty() {
            return None;
        }
        let pending = std::mem::take(self);
        Some(PlanOp::Barrier {
            barriers: pending.barriers,
            src_stages: pending.src_stages,
            dst_stages: pending.dst_stages,
        })
    }
}

/// Accumulates barriers and copies, then records and submits them together.
///
/// Barriers added between two copies are batched into one pipeline barrier
/// whose stage masks are the union of theirs. A copy flushes the batch in
/// front of itself, so barriers always land before the copy that depends on
/// them. Every resource a copy names is borrowed for the plan's lifetime.
pub struct TransferPlan<'a> {
    role: QueueFamilyType,
    ops: Vec<PlanOp<'a>>,
    pending: PendingBarriers,
    driver: Option<CommandDriver>,
}

impl<'a> TransferPlan<'a> {
    pub fn new(role: QueueFamilyType) -> Self {
        Self {
            role,
            ops: Vec::new(),
            pending: PendingBarriers::default(),
            driver: None,
        }
    }

    pub fn role(&self) -> QueueFamilyType {
        self.role
    }

    pub fn add_buffer_barrier(
        &mut self,
        barrier: BufferBarrier,
        src_stages: &[PipelineStage],
        dst_stages: &[PipelineStage],
    ) {
        self.pending.push(barrier.into(), src_stages, dst_stages);
    }

    pub fn add_image_barrier(
        &mut self,
        barrier: ImageBarrier,
        src_stages: &[PipelineStage],
        dst_stages: &[PipelineStage],
    ) {
        self.pending.push(barrier.into(), src_stages, dst_stages);
    }

    /// Queue a barrier on the context's currently acquired swapchain image.
    ///
    /// `families` is the (source, destination) queue family pair for an
    /// ownership transfer; `None` leaves ownership alone.
    #[allow(clippy::too_many_arguments)]
    pub fn add_backbuffer_barrier(
        &mut self,
        ctx: &GpuContext,
        src_access: &[AccessFlag],
        dst_access: &[AccessFlag],
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        src_stages: &[PipelineStage],
        dst_stages: &[PipelineStage],
        families: Option<(u32, u32)>,
    ) -> Result<()> {
        const STEP: &str = "TransferPlan::addBackbufferBarrier";
        let swapchain = ctx
            .swapchain()
            .map_err(|_| Error::runtime("Swapchain not initialized").with_context(STEP))?;

        let mut builder = ImageBarrierBuilder::new()
            .swapchain(swapchain)
            .src_access(src_access)
            .dst_access(dst_access)
            .layouts(old_layout, new_layout);
        if let Some((src, dst)) = families {
            builder = builder.src_queue_family(src).dst_queue_family(dst);
        }

        let barrier = builder
            .build()
            .map_err(|e| Error::from(e).with_context(STEP))?;
        self.add_image_barrier(barrier, src_stages, dst_stages);
        Ok(())
    }

    /// Copy all of `src` to the start of `dst`.
    pub fn copy_buffer(&mut self, src: &'a Buffer, dst: &'a Buffer) {
        self.copy_buffer_region(src, dst, 0, 0, src.size());
    }

    pub fn copy_buffer_region(
        &mut self,
        src: &'a Buffer,
        dst: &'a Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        self.push_copy(PlanOp::CopyBuffer {
            src,
            dst,
            src_offset,
            dst_offset,
            size,
        });
    }

    pub fn copy_buffer_to_image(
        &mut self,
        src: &'a Buffer,
        dst: &'a Image,
        layout: ImageLayout,
        view: ImageViewInfo,
    ) {
        self.push_copy(PlanOp::CopyBufferToImage {
            src,
            dst,
            layout,
            view,
        });
    }

    pub fn copy_image_to_buffer(
        &mut self,
        src: &'a Image,
        dst: &'a Buffer,
        layout: ImageLayout,
        view: ImageViewInfo,
    ) {
        self.push_copy(PlanOp::CopyImageToBuffer {
            src,
            dst,
            layout,
            view,
        });
    }

    fn push_copy(&mut self, op: PlanOp<'a>) {
        self.flush_barriers();
        self.ops.push(op);
    }

    /// Turn the pending barrier batch into an op. Does nothing when no
    /// barrier is pending.
    pub fn flush_barriers(&mut self) {
        if let Some(op) = self.pending.take() {
            self.ops.push(op);
        }
    }

    /// Recorded ops, not counting unflushed barriers.
    pub fn ops(&self) -> &[PlanOp<'a>] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// No ops and no pending barriers.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.pending.barriers.is_empty()
    }

    pub fn pending_barrier_count(&self) -> usize {
        self.pending.barriers.len()
    }

    /// Drop every op and pending barrier.
    pub fn reset(&mut self) {
        self.ops.clear();
        self.pending = PendingBarriers::default();
    }

    /// Record every op into one buffer, submit it with `group`, and wait
    /// for the queue to go idle.
    ///
    /// Pending barriers are flushed first. An empty plan returns without
    /// touching the device. The ops are kept, so the same plan can be
    /// submitted again.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn submit(&mut self, ctx: &GpuContext, group: &SubmitSemaphoreGroup) -> Result<()> {
        const STEP: &str = "TransferPlan::submit";
        self.flush_barriers();
        if self.ops.is_empty() {
            return Ok(());
        }
        if !ctx.is_initialized() {
            return Err(Error::runtime("Context not initialized").with_context(STEP));
        }

        self.record_and_submit(ctx, group)
            .map_err(|e| e.with_context(STEP))?;

        tracing::trace!(ops = self.ops.len(), role = ?self.role, "Submitted transfer plan");
        Ok(())
    }

    fn record_and_submit(
        &mut self,
        ctx: &GpuContext,
        group: &SubmitSemaphoreGroup,
    ) -> Result<()> {
        let driver = match self.driver.take() {
            Some(driver) => driver,
            None => CommandDriver::new(ctx, self.role)?,
        };
        let driver = self.driver.insert(driver);

        driver.reset_all_command_pools()?;
        let cmd = driver.transfer(None);
        cmd.begin(&CommandBeginInfo::new())?;

        for op in &self.ops {
            match op {
                PlanOp::Barrier {
                    barriers,
                    src_stages,
                    dst_stages,
                } => cmd.set_pipeline_barrier(barriers, src_stages, dst_stages),
                PlanOp::CopyBuffer {
                    src,
                    dst,
                    src_offset,
                    dst_offset,
                    size,
                } => cmd.copy_buffer_region(src, dst, *src_offset, *dst_offset, *size),
                PlanOp::CopyBufferToImage {
                    src,
                    dst,
                    layout,
                    view,
                } => cmd.copy_buffer_to_image(src, dst, *layout, view),
                PlanOp::CopyImageToBuffer {
                    src,
                    dst,
                    layout,
                    view,
                } => cmd.copy_image_to_buffer(src, dst, *layout, view),
            }
        }

        cmd.end()?;
        driver.submit(group, None)?;
        driver.queue_wait_idle()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pandolabo_gpu::vk::{self, Handle};
    use pandolabo_gpu::{BufferBarrierBuilder, MemoryBarrierBuilder};

    fn buffer_barrier(raw: u64) -> BufferBarrier {
        BufferBarrierBuilder::new()
            .raw_buffer(vk::Buffer::from_raw(raw), 0, 256)
            .src_access(&[AccessFlag::TransferWrite])
            .dst_access(&[AccessFlag::ShaderRead])
            .build()
            .unwrap()
    }

    fn image_barrier(raw: u64) -> ImageBarrier {
        ImageBarrierBuilder::new()
            .raw_image(vk::Image::from_raw(raw), ImageViewInfo::default())
            .layouts(ImageLayout::Undefined, ImageLayout::TransferDstOptimal)
            .dst_access(&[AccessFlag::TransferWrite])
            .build()
            .unwrap()
    }

    #[test]
    fn barriers_batch_until_flushed() {
        let mut plan = TransferPlan::new(QueueFamilyType::Transfer);
        assert!(plan.is_empty());

        let (transfer, compute) = (PipelineStage::Transfer, PipelineStage::ComputeShader);
        plan.add_buffer_barrier(buffer_barrier(1), &[transfer], &[compute]);
        plan.add_image_barrier(image_barrier(2), &[PipelineStage::TopOfPipe], &[transfer]);
        plan.add_buffer_barrier(buffer_barrier(3), &[transfer], &[compute]);

        assert_eq!(plan.len(), 0);
        assert_eq!(plan.pending_barrier_count(), 3);
        assert!(!plan.is_empty());

        plan.flush_barriers();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.pending_barrier_count(), 0);

        match &plan.ops()[0] {
            PlanOp::Barrier {
                barriers,
                src_stages,
                dst_stages,
            } => {
                assert_eq!(barriers.len(), 3);
                assert!(matches!(barriers[1], AccessBarrier::Image(_)));
                assert_eq!(src_stages, &[transfer, PipelineStage::TopOfPipe]);
                assert_eq!(dst_stages, &[compute, transfer]);
            }
            _ => panic!("expected a barrier op"),
        }
    }

    #[test]
    fn flushing_nothing_adds_no_op() {
        let mut plan = TransferPlan::new(QueueFamilyType::Compute);
        plan.flush_barriers();
        plan.flush_barriers();
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }

    #[test]
    fn separate_flushes_make_separate_batches() {
        let mut plan = TransferPlan::new(QueueFamilyType::Transfer);
        plan.add_buffer_barrier(buffer_barrier(1), &[], &[]);
        plan.flush_barriers();
        let memory = MemoryBarrierBuilder::default()
            .src_access(&[AccessFlag::HostWrite])
            .dst_access(&[AccessFlag::TransferRead])
            .build();
        plan.pending
            .push(memory.into(), &[PipelineStage::Host], &[PipelineStage::Transfer]);
        plan.flush_barriers();

        assert_eq!(plan.len(), 2);
        assert!(plan
            .ops()
            .iter()
            .all(|op| matches!(op, PlanOp::Barrier { barriers, .. } if barriers.len() == 1)));
    }

    #[test]
    fn reset_clears_ops_and_pending() {
        let mut plan = TransferPlan::new(QueueFamilyType::Transfer);
        plan.add_buffer_barrier(buffer_barrier(1), &[], &[]);
        plan.flush_barriers();
        plan.add_buffer_barrier(buffer_barrier(2), &[], &[]);

        plan.reset();
        assert!(plan.is_empty());
        assert_eq!(plan.pending_barrier_count(), 0);
    }
}
