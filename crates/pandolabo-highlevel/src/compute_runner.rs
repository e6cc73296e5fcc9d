//! One-shot compute recording and submission.

use pandolabo_core::{Error, Result};
use pandolabo_gpu::{
    CommandBeginInfo, CommandDriver, ComputeCommandBuffer, GpuContext, QueueFamilyType,
    SubmitSemaphoreGroup,
};

/// Owns a compute-role [`CommandDriver`], created on first use.
///
/// Each [`ComputeRunner::begin`] resets the driver's pools, so the previous
/// submission must have completed before the next one is begun.
#[derive(Default)]
pub struct ComputeRunner {
    driver: Option<CommandDriver>,
}

impl ComputeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the pools and begin recording the primary buffer.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn begin(&mut self, ctx: &GpuContext) -> Result<ComputeCommandBuffer> {
        if !ctx.is_initialized() {
            return Err(
                Error::runtime("Context not initialized").with_context("ComputeRunner::begin")
            );
        }

        let driver = match self.driver.take() {
            Some(driver) => driver,
            None => CommandDriver::new(ctx, QueueFamilyType::Compute)
                .map_err(|e| Error::from(e).with_context("ComputeRunner::begin"))?,
        };
        let driver = self.driver.insert(driver);

        driver
            .reset_all_command_pools()
            .map_err(|e| Error::from(e).with_context("ComputeRunner::begin"))?;

        let cmd = driver.compute(None);
        cmd.begin(&CommandBeginInfo::new())
            .map_err(|e| Error::from(e).with_context("ComputeRunner::begin"))?;
        Ok(cmd)
    }

    /// Run `f` against `cmd`, then end the recording.
    ///
    /// An error from `f` is returned with this step's context attached and
    /// the buffer is left recording.
    pub fn record<F>(&self, cmd: &ComputeCommandBuffer, f: F) -> Result<()>
    where
        F: FnOnce(&ComputeCommandBuffer) -> Result<()>,
    {
        f(cmd).map_err(|e| e.with_context("ComputeRunner::record"))?;
        cmd.end()
            .map_err(|e| Error::from(e).with_context("ComputeRunner::record"))
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn submit(&self, group: &SubmitSemaphoreGroup) -> Result<()> {
        self.require_driver("ComputeRunner::submit")?
            .submit(group, None)
            .map_err(|e| Error::from(e).with_context("ComputeRunner::submit"))
    }

    pub fn queue_wait_idle(&self) -> Result<()> {
        self.require_driver("ComputeRunner::queueWaitIdle")?
            .queue_wait_idle()
            .map_err(|e| Error::from(e).with_context("ComputeRunner::queueWaitIdle"))
    }

    /// The underlying driver, once [`ComputeRunner::begin`] has created it.
    pub fn driver(&self) -> Option<&CommandDriver> {
        self.driver.as_ref()
    }

    fn require_driver(&self, step: &str) -> Result<&CommandDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| {
                Error::runtime("Compute runner has not begun recording").with_context(step)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pandolabo_core::ErrorKind;

    #[test]
    fn submit_before_begin_is_a_runtime_error() {
        let runner = ComputeRunner::new();
        assert!(runner.driver().is_none());

        let err = runner.submit(&SubmitSemaphoreGroup::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(err.context(), "ComputeRunner::submit");

        let err = runner.queue_wait_idle().unwrap_err();
        assert_eq!(err.context(), "ComputeRunner::queueWaitIdle");
    }
}
