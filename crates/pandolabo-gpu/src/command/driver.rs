//! Command driver: pools, buffers, and queue submission for one queue role.

use super::pool::CommandPool;
use super::recorder::{
    CommandRecorder, ComputeCommandBuffer, GraphicCommandBuffer, TransferCommandBuffer,
};
use crate::context::GpuContext;
use crate::error::Result;
use crate::semaphore::{
    BinarySemaphore, Fence, SolidBinarySemaphore, SubmitSemaphoreGroup, TimelineSemaphore,
};
use crate::types::{PipelineStage, QueueFamilyType};
use ash::vk;
use std::sync::Arc;

/// Owns one primary command buffer, optional secondaries, and the queue
/// they are submitted to.
///
/// Each secondary buffer lives in its own pool so separate threads can record
/// into them concurrently. Dropping the driver destroys the pools, which frees
/// every buffer; the queue must be idle by then.
pub struct CommandDriver {
    role: QueueFamilyType,
    queue_family_index: u32,
    queue: vk::Queue,

    pool: CommandPool,
    primary: vk::CommandBuffer,
    secondary_pools: Vec<CommandPool>,
    secondary_buffers: Vec<vk::CommandBuffer>,

    device: Arc<ash::Device>,
}

impl CommandDriver {
    /// Create a driver for `role` with one primary buffer.
    pub fn new(ctx: &GpuContext, role: QueueFamilyType) -> Result<Self> {
        let device = ctx.device_arc();
        let queue_family_index = ctx.queue_family_index(role);
        let queue = ctx.queue(role);

        let pool = CommandPool::new(&device, queue_family_index)?;
        let primary = pool.allocate(vk::CommandBufferLevel::PRIMARY)?;

        tracing::debug!(?role, queue_family_index, "Created command driver");

        Ok(Self {
            role,
            queue_family_index,
            queue,
            pool,
            primary,
            secondary_pools: Vec::new(),
            secondary_buffers: Vec::new(),
            device,
        })
    }

    pub fn role(&self) -> QueueFamilyType {
        self.role
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Append `count` secondary buffers, each in its own pool.
    pub fn construct_secondary(&mut self, ctx: &GpuContext, count: usize) -> Result<()> {
        let device = ctx.device_arc();
        for _ in 0..count {
            let pool = CommandPool::new(&device, self.queue_family_index)?;
            let buffer = pool.allocate(vk::CommandBufferLevel::SECONDARY)?;
            self.secondary_pools.push(pool);
            self.secondary_buffers.push(buffer);
        }
        Ok(())
    }

    /// Free every secondary buffer and its pool.
    ///
    /// None of them may be pending execution.
    pub fn destroy_secondary(&mut self) {
        for (pool, &buffer) in self.secondary_pools.iter().zip(&self.secondary_buffers) {
            unsafe { pool.free(&[buffer]) };
        }
        self.secondary_buffers.clear();
        self.secondary_pools.clear();
    }

    pub fn secondary_count(&self) -> usize {
        self.secondary_buffers.len()
    }

    fn recorder(&self, secondary: Option<usize>) -> CommandRecorder {
        match secondary {
            Some(index) => {
                let buffer = *self.secondary_buffers.get(index).unwrap_or_else(|| {
                    panic!(
                        "secondary index {index} out of range ({} allocated)",
                        self.secondary_buffers.len()
                    )
                });
                CommandRecorder::new(Arc::clone(&self.device), buffer, true)
            }
            None => CommandRecorder::new(Arc::clone(&self.device), self.primary, false),
        }
    }

    /// Recorder over the primary buffer.
    pub fn primary(&self) -> CommandRecorder {
        self.recorder(None)
    }

    /// Graphic recorder over the primary buffer, or over a secondary.
    ///
    /// # Panics
    /// If `secondary` is out of range.
    pub fn graphic(&self, secondary: Option<usize>) -> GraphicCommandBuffer {
        GraphicCommandBuffer::new(self.recorder(secondary))
    }

    /// Compute recorder over the primary buffer, or over a secondary.
    ///
    /// # Panics
    /// If `secondary` is out of range.
    pub fn compute(&self, secondary: Option<usize>) -> ComputeCommandBuffer {
        ComputeCommandBuffer::new(self.recorder(secondary))
    }

    /// Transfer recorder over the primary buffer, or over a secondary.
    ///
    /// # Panics
    /// If `secondary` is out of range.
    pub fn transfer(&self, secondary: Option<usize>) -> TransferCommandBuffer {
        TransferCommandBuffer::new(self.recorder(secondary))
    }

    /// Record execution of every secondary buffer, in allocation order, into
    /// the primary buffer.
    ///
    /// Call after all secondaries have ended and while the primary is still
    /// recording.
    pub fn merge_secondary_commands(&self) {
        if self.secondary_buffers.is_empty() {
            return;
        }
        unsafe {
            self.device
                .cmd_execute_commands(self.primary, &self.secondary_buffers);
        }
    }

    /// Reset the primary pool and every secondary pool.
    pub fn reset_all_command_pools(&self) -> Result<()> {
        for pool in &self.secondary_pools {
            pool.reset()?;
        }
        self.pool.reset()
    }

    /// Reset each buffer individually, leaving the pools alone.
    pub fn reset_all_commands(&self) -> Result<()> {
        for &buffer in &self.secondary_buffers {
            unsafe {
                self.device
                    .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())?;
            }
        }
        unsafe {
            self.device
                .reset_command_buffer(self.primary, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    fn queue_submit(&self, submit_info: vk::SubmitInfo<'_>, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.queue_submit(self.queue, &[submit_info], fence)? };
        Ok(())
    }

    /// Submit the primary buffer chained on `semaphore`.
    ///
    /// Waits at `dst_stage` for the semaphore's wait value, signals its signal
    /// value, then advances both by one.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn submit_timeline(
        &self,
        dst_stage: PipelineStage,
        semaphore: &mut TimelineSemaphore,
    ) -> Result<()> {
        let semaphores = [semaphore.handle()];
        let wait_values = [semaphore.wait_value()];
        let signal_values = [semaphore.signal_value()];
        let wait_stages = [vk::PipelineStageFlags::from(dst_stage)];
        let command_buffers = [self.primary];

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);

        tracing::trace!(
            role = ?self.role,
            wait = wait_values[0],
            signal = signal_values[0],
            "Timeline submission"
        );
        self.queue_submit(submit_info, vk::Fence::null())?;

        semaphore.update_wait_value();
        semaphore.update_signal_value();
        Ok(())
    }

    /// Submit the primary buffer between two binary semaphores.
    ///
    /// The signal side's fence is reset and then signaled by this submission.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn submit_binary(
        &self,
        wait: &BinarySemaphore,
        dst_stage: PipelineStage,
        signal: &SolidBinarySemaphore,
    ) -> Result<()> {
        let wait_semaphores = [wait.handle()];
        let signal_semaphores = [signal.handle()];
        let wait_stages = [vk::PipelineStageFlags::from(dst_stage)];
        let command_buffers = [self.primary];

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);

        signal.fence().reset()?;
        tracing::trace!(role = ?self.role, "Binary submission");
        self.queue_submit(submit_info, signal.fence().handle())
    }

    /// Submit the primary buffer with an arbitrary mix of binary and timeline
    /// semaphores, optionally signalling `fence`.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn submit(&self, group: &SubmitSemaphoreGroup, fence: Option<&Fence>) -> Result<()> {
        let wait_stages = group.resolved_wait_stages();
        let command_buffers = [self.primary];
        let mut timeline_info = group.timeline_submit_info();

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(group.wait_semaphores())
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(group.signal_semaphores())
            .push_next(&mut timeline_info);

        tracing::trace!(
            role = ?self.role,
            waits = group.wait_semaphores().len(),
            signals = group.signal_semaphores().len(),
            "Group submission"
        );
        self.queue_submit(submit_info, fence.map_or(vk::Fence::null(), Fence::handle))
    }

    /// Present the context's current swapchain image after `wait`.
    ///
    /// Returns whether the swapchain is suboptimal. Presentation failures,
    /// out-of-date included, are returned for the caller to handle.
    ///
    /// # Panics
    /// If this driver is not bound to the graphics role.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present(&self, ctx: &GpuContext, wait: &BinarySemaphore) -> Result<bool> {
        assert!(
            self.role == QueueFamilyType::Graphics,
            "present requires a graphics driver, this one is {:?}",
            self.role
        );
        ctx.swapchain()?.present(self.queue, &[wait.handle()])
    }

    /// Block until the queue has finished all submitted work.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn queue_wait_idle(&self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.queue)? };
        Ok(())
    }
}
