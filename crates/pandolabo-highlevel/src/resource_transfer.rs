//! Blocking uploads and readbacks through transient staging buffers.

use pandolabo_core::{Error, Result};
use pandolabo_gpu::{
    vk, AccessFlag, Buffer, BufferBarrier, BufferBarrierBuilder, CommandBeginInfo, CommandDriver,
    GpuContext, Image, ImageBarrierBuilder, ImageLayout, ImageViewInfo, PipelineStage,
    QueueFamilyType, SubmitSemaphoreGroup, TransferCommandBuffer, TransferOps,
};

/// Synchronous host/device copies.
///
/// Every call records one transfer, submits it, and waits for the queue to
/// go idle before returning, so the data is visible (or read back) on return.
/// A staging buffer sized to the data is created for each call and dropped
/// afterwards.
///
/// Copies run on the transfer role by default. With a dedicated transfer
/// family, a resource written here must be acquired by the family that uses
/// it next; [`ResourceTransfer::with_role`] avoids that by copying on the
/// consumer's own queue.
pub struct ResourceTransfer {
    role: QueueFamilyType,
    driver: Option<CommandDriver>,
}

impl Default for ResourceTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTransfer {
    pub fn new() -> Self {
        Self::with_role(QueueFamilyType::Transfer)
    }

    pub fn with_role(role: QueueFamilyType) -> Self {
        Self { role, driver: None }
    }

    pub fn role(&self) -> QueueFamilyType {
        self.role
    }

    /// Copy `data` to the start of `dst`.
    ///
    /// Fails with a validation error, before touching the device, when
    /// `data` is larger than `dst`. An empty slice does nothing.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn upload_buffer<T: bytemuck::Pod>(
        &mut self,
        ctx: &GpuContext,
        dst: &Buffer,
        data: &[T],
    ) -> Result<()> {
        const STEP: &str = "ResourceTransfer::uploadBuffer";
        check_initialized(ctx, STEP)?;

        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > dst.size() {
            return Err(Error::validation("Upload size exceeds destination buffer size")
                .with_context(STEP));
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let staging = staging_with(ctx, bytes).map_err(|e| e.with_context(STEP))?;
        self.run_once(ctx, |cmd| {
            cmd.copy_buffer_region(&staging, dst, 0, 0, staging.size());
        })
        .map_err(|e| e.with_context(STEP))?;

        tracing::trace!(bytes = bytes.len(), "Uploaded buffer");
        Ok(())
    }

    /// Copy tightly packed texels into the level and layers `view` selects.
    ///
    /// The selected range is transitioned from `Undefined`, so its previous
    /// contents are discarded, and is left in `TransferDstOptimal`.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn upload_image<T: bytemuck::Pod>(
        &mut self,
        ctx: &GpuContext,
        dst: &Image,
        view: &ImageViewInfo,
        data: &[T],
    ) -> Result<()> {
        const STEP: &str = "ResourceTransfer::uploadImage";
        check_initialized(ctx, STEP)?;

        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }

        let to_transfer_dst = ImageBarrierBuilder::new()
            .image(dst, *view)
            .dst_access(&[AccessFlag::TransferWrite])
            .layouts(ImageLayout::Undefined, ImageLayout::TransferDstOptimal)
            .build()
            .map_err(|e| Error::from(e).with_context(STEP))?;

        let staging = staging_with(ctx, bytes).map_err(|e| e.with_context(STEP))?;
        self.run_once(ctx, |cmd| {
            cmd.set_image_barrier(
                &to_transfer_dst,
                PipelineStage::TopOfPipe,
                PipelineStage::Transfer,
            );
            cmd.copy_buffer_to_image(&staging, dst, ImageLayout::TransferDstOptimal, view);
        })
        .map_err(|e| e.with_context(STEP))?;

        tracing::trace!(bytes = bytes.len(), "Uploaded image");
        Ok(())
    }

    /// Fill `out` from the start of `src`.
    ///
    /// Fails with a validation error, leaving `out` untouched, when `out` is
    /// larger than `src`.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn readback_buffer<T: bytemuck::Pod>(
        &mut self,
        ctx: &GpuContext,
        src: &Buffer,
        out: &mut [T],
    ) -> Result<()> {
        const STEP: &str = "ResourceTransfer::readbackBuffer";
        check_initialized(ctx, STEP)?;

        let out_bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        if out_bytes.len() as u64 > src.size() {
            return Err(
                Error::validation("Readback size exceeds source buffer size").with_context(STEP)
            );
        }
        if out_bytes.is_empty() {
            return Ok(());
        }

        let staging = Buffer::staging_from_gpu(ctx, out_bytes.len() as u64)
            .map_err(|e| Error::from(e).with_context(STEP))?;
        let to_host = host_read_barrier(staging.handle(), staging.size())
            .map_err(|e| e.with_context(STEP))?;
        self.run_once(ctx, |cmd| {
            cmd.copy_buffer_region(src, &staging, 0, 0, staging.size());
            cmd.set_buffer_barrier(&to_host, PipelineStage::Transfer, PipelineStage::Host);
        })
        .map_err(|e| e.with_context(STEP))?;

        staging
            .read_bytes(0, out_bytes)
            .map_err(|e| Error::from(e).with_context(STEP))?;

        tracing::trace!(bytes = out_bytes.len(), "Read back buffer");
        Ok(())
    }

    /// Record with `f`, submit, and block until the queue is idle.
    fn run_once<F>(&mut self, ctx: &GpuContext, f: F) -> Result<()>
    where
        F: FnOnce(&TransferCommandBuffer),
    {
        let driver = match self.driver.take() {
            Some(driver) => driver,
            None => CommandDriver::new(ctx, self.role)?,
        };
        let driver = self.driver.insert(driver);

        driver.reset_all_command_pools()?;
        let cmd = driver.transfer(None);
        cmd.begin(&CommandBeginInfo::new())?;
        f(&cmd);
        cmd.end()?;

        driver.submit(&SubmitSemaphoreGroup::new(), None)?;
        driver.queue_wait_idle()?;
        Ok(())
    }
}

fn check_initialized(ctx: &GpuContext, step: &str) -> Result<()> {
    if ctx.is_initialized() {
        Ok(())
    } else {
        Err(Error::runtime("Context not initialized").with_context(step))
    }
}

/// Makes a finished copy into `staging` visible to host reads.
fn host_read_barrier(staging: vk::Buffer, size: u64) -> Result<BufferBarrier> {
    Ok(BufferBarrierBuilder::new()
        .raw_buffer(staging, 0, size)
        .src_access(&[AccessFlag::TransferWrite])
        .dst_access(&[AccessFlag::HostRead])
        .build()?)
}

fn staging_with(ctx: &GpuContext, bytes: &[u8]) -> Result<Buffer> {
    let staging = Buffer::staging_to_gpu(ctx, bytes.len() as u64)?;
    staging.write_bytes(0, bytes)?;
    Ok(staging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pandolabo_gpu::vk::Handle;

    #[test]
    fn readback_barrier_hands_transfer_writes_to_the_host() {
        let barrier = host_read_barrier(vk::Buffer::from_raw(5), 256).unwrap();
        assert_eq!(barrier.buffer(), vk::Buffer::from_raw(5));
        assert_eq!((barrier.offset(), barrier.size()), (0, 256));
        assert_eq!(barrier.src_access(), vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access(), vk::AccessFlags::HOST_READ);
        assert!(!barrier.is_ownership_transfer());
    }

    #[test]
    fn default_role_is_transfer() {
        assert_eq!(ResourceTransfer::new().role(), QueueFamilyType::Transfer);
        assert_eq!(
            ResourceTransfer::with_role(QueueFamilyType::Compute).role(),
            QueueFamilyType::Compute
        );
    }
}
