//! Transfer-to-compute streaming loop.

use pandolabo_core::constants::WAIT_FOREVER;
use pandolabo_gpu::{
    buffer_ownership_transfer_pair, AccessFlag, Buffer, BufferBarrier, BufferBarrierBuilder,
    CommandBeginInfo, CommandDriver, GpuContext, PipelineStage, QueueFamilyType,
    SubmitSemaphoreGroup, TimelinePolicy, TimelineTracker, TransferOps, TransferType,
};
use pandolabo_highlevel::{ResourceTransfer, TransferPlan};

use crate::config::AppConfig;

/// Word `word` of payload `iteration`.
pub fn payload_value(iteration: u32, word: u32) -> u32 {
    iteration.wrapping_mul(100_003).wrapping_add(word)
}

/// Streams payloads through a shared buffer into a result buffer.
///
/// Each iteration two threads record half of the staging copy each into
/// secondary buffers of the transfer driver. The primary merges them and
/// releases the shared buffer to the compute family. The compute driver
/// acquires it once the handoff timeline is reached and appends the payload
/// to the result buffer. The host waits on the done timeline before reusing
/// the staging buffer and the pools.
pub struct Streamer {
    config: AppConfig,
    transfer: CommandDriver,
    compute: CommandDriver,
    handoff: TimelineTracker,
    done: TimelineTracker,
    release: BufferBarrier,
    acquire: BufferBarrier,
    staging: Buffer,
    shared: Buffer,
    result: Buffer,
}

impl Streamer {
    pub fn new(ctx: &GpuContext, config: AppConfig) -> anyhow::Result<Self> {
        let payload_bytes = config.payload_bytes();
        let result_bytes = payload_bytes * u64::from(config.iterations);

        let staging = Buffer::staging_to_gpu(ctx, payload_bytes)?;
        let shared = Buffer::storage(ctx, payload_bytes, TransferType::TransferSrcDst)?;
        let result = Buffer::storage(ctx, result_bytes, TransferType::TransferSrcDst)?;

        let mut transfer = CommandDriver::new(ctx, QueueFamilyType::Transfer)?;
        transfer.construct_secondary(ctx, 2)?;
        let compute = CommandDriver::new(ctx, QueueFamilyType::Compute)?;

        let (release, acquire) = buffer_ownership_transfer_pair(
            BufferBarrierBuilder::new()
                .buffer(&shared)
                .src_access(&[AccessFlag::TransferWrite])
                .dst_access(&[AccessFlag::TransferRead]),
            transfer.queue_family_index(),
            compute.queue_family_index(),
        )?;

        let policy = TimelinePolicy::with_threshold(config.timeline_threshold);
        let device = ctx.device_arc();

        tracing::info!(
            transfer_family = transfer.queue_family_index(),
            compute_family = compute.queue_family_index(),
            ownership_transfer = release.is_ownership_transfer(),
            "Streaming {} payloads of {} bytes",
            config.iterations,
            payload_bytes
        );

        Ok(Self {
            config,
            transfer,
            compute,
            handoff: TimelineTracker::new(&device, policy)?,
            done: TimelineTracker::new(&device, policy)?,
            release,
            acquire,
            staging,
            shared,
            result,
        })
    }

    /// Zero the result buffer so unwritten regions fail verification.
    pub fn clear_result(&self, ctx: &GpuContext) -> anyhow::Result<()> {
        let zeros = vec![0u32; (self.result.size() / 4) as usize];
        ResourceTransfer::with_role(QueueFamilyType::Compute).upload_buffer(
            ctx,
            &self.result,
            &zeros,
        )?;
        Ok(())
    }

    /// Stream every payload.
    pub fn run(&mut self) -> anyhow::Result<()> {
        for iteration in 0..self.config.iterations {
            self.done.wait(WAIT_FOREVER)?;
            // Both queues are idle once the last compute batch has signalled.
            unsafe {
                self.handoff.destroy_retired();
                self.done.destroy_retired();
            }
            self.stream_one(iteration)?;
        }
        self.done.wait(WAIT_FOREVER)?;

        tracing::info!(
            handoff_generation = self.handoff.generation(),
            done_generation = self.done.generation(),
            "Streaming finished"
        );
        Ok(())
    }

    fn stream_one(&mut self, iteration: u32) -> anyhow::Result<()> {
        let payload: Vec<u32> = (0..self.config.payload_words)
            .map(|word| payload_value(iteration, word))
            .collect();
        self.staging.write(&payload)?;

        self.record_transfer()?;
        let handoff = self.handoff.next_signal()?;
        self.transfer
            .submit(&SubmitSemaphoreGroup::new().signal_token(handoff), None)?;

        self.record_compute(iteration)?;
        let done = self.done.next_signal()?;
        self.compute.submit(
            &SubmitSemaphoreGroup::new()
                .wait_token(handoff.as_wait(), PipelineStage::Transfer)
                .signal_token(done),
            None,
        )?;

        tracing::debug!(
            iteration,
            handoff = handoff.value(),
            done = done.value(),
            "Submitted payload"
        );
        Ok(())
    }

    fn record_transfer(&self) -> anyhow::Result<()> {
        self.transfer.reset_all_command_pools()?;

        let half = self.config.payload_bytes() / 2;
        let halves = [
            (self.transfer.transfer(Some(0)), 0),
            (self.transfer.transfer(Some(1)), half),
        ];
        let (staging, shared) = (&self.staging, &self.shared);

        std::thread::scope(|scope| -> anyhow::Result<()> {
            let workers: Vec<_> = halves
                .into_iter()
                .map(|(cmd, offset)| {
                    scope.spawn(move || -> pandolabo_gpu::Result<()> {
                        cmd.begin(&CommandBeginInfo::new())?;
                        cmd.copy_buffer_region(staging, shared, offset, offset, half);
                        cmd.end()
                    })
                })
                .collect();
            for worker in workers {
                worker
                    .join()
                    .map_err(|_| anyhow::anyhow!("Recording thread panicked"))??;
            }
            Ok(())
        })?;

        let primary = self.transfer.transfer(None);
        primary.begin(&CommandBeginInfo::new())?;
        self.transfer.merge_secondary_commands();
        primary.set_buffer_barrier(
            &self.release,
            PipelineStage::Transfer,
            PipelineStage::BottomOfPipe,
        );
        primary.end()?;
        Ok(())
    }

    fn record_compute(&self, iteration: u32) -> anyhow::Result<()> {
        self.compute.reset_all_command_pools()?;

        let bytes = self.config.payload_bytes();
        let cmd = self.compute.compute(None);
        cmd.begin(&CommandBeginInfo::new())?;
        cmd.set_buffer_barrier(
            &self.acquire,
            PipelineStage::TopOfPipe,
            PipelineStage::Transfer,
        );
        cmd.copy_buffer_region(
            &self.shared,
            &self.result,
            0,
            u64::from(iteration) * bytes,
            bytes,
        );
        cmd.end()?;
        Ok(())
    }

    /// Read the result buffer back with one batched plan and check every payload.
    pub fn verify(&self, ctx: &GpuContext) -> anyhow::Result<()> {
        let readback = Buffer::staging_from_gpu(ctx, self.result.size())?;

        let mut plan = TransferPlan::new(QueueFamilyType::Compute);
        plan.add_buffer_barrier(
            BufferBarrierBuilder::new()
                .buffer(&self.result)
                .src_access(&[AccessFlag::TransferWrite])
                .dst_access(&[AccessFlag::TransferRead])
                .build()?,
            &[PipelineStage::Transfer],
            &[PipelineStage::Transfer],
        );
        plan.copy_buffer(&self.result, &readback);
        plan.add_buffer_barrier(
            BufferBarrierBuilder::new()
                .buffer(&readback)
                .src_access(&[AccessFlag::TransferWrite])
                .dst_access(&[AccessFlag::HostRead])
                .build()?,
            &[PipelineStage::Transfer],
            &[PipelineStage::Host],
        );
        plan.submit(ctx, &SubmitSemaphoreGroup::new())?;

        let mut words = vec![0u32; (self.result.size() / 4) as usize];
        readback.read(&mut words)?;

        let per_payload = self.config.payload_words as usize;
        for (iteration, chunk) in (0u32..).zip(words.chunks(per_payload)) {
            for (word, (&actual, index)) in chunk.iter().zip(0u32..).enumerate() {
                let expected = payload_value(iteration, index);
                if actual != expected {
                    anyhow::bail!(
                        "Payload {iteration} word {word}: expected {expected}, got {actual}"
                    );
                }
            }
        }

        tracing::info!(words = words.len(), "Verified streamed payloads");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_differ_between_iterations() {
        assert_eq!(payload_value(0, 5), 5);
        assert_ne!(payload_value(1, 0), payload_value(0, 0));
        assert_ne!(payload_value(2, 7), payload_value(1, 7));
    }
}
