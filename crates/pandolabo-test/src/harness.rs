//! Headless context creation for GPU-backed tests.

use pandolabo_gpu::{Buffer, GpuContext, GpuContextBuilder, TransferType};

use crate::Result;

/// Environment variable that opts GPU-backed tests in.
pub const GPU_TESTS_ENV: &str = "PANDOLABO_ENABLE_GPU_TESTS";

/// Whether GPU-backed tests should run.
///
/// Tests call this first and return early when it is false.
pub fn gpu_tests_enabled() -> bool {
    std::env::var(GPU_TESTS_ENV).is_ok_and(|value| value == "1")
}

/// A headless context with validation enabled.
pub struct HeadlessHarness {
    context: GpuContext,
}

impl HeadlessHarness {
    pub fn new() -> Result<Self> {
        let context = GpuContextBuilder::new()
            .app_name("pandolabo-test")
            .validation(true)
            .headless()
            .build()?;
        tracing::debug!("Created headless test context");
        Ok(Self { context })
    }

    pub fn ctx(&self) -> &GpuContext {
        &self.context
    }

    pub fn ctx_mut(&mut self) -> &mut GpuContext {
        &mut self.context
    }

    /// Device-local storage buffer usable as copy source and destination.
    pub fn storage_buffer(&self, size: u64) -> Result<Buffer> {
        Ok(Buffer::storage(&self.context, size, TransferType::TransferSrcDst)?)
    }

    /// Host-visible staging buffer holding `data`.
    pub fn staging_with(&self, data: &[u32]) -> Result<Buffer> {
        let staging = Buffer::staging_to_gpu(&self.context, std::mem::size_of_val(data) as u64)?;
        staging.write(data)?;
        Ok(staging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_name_is_stable() {
        assert_eq!(GPU_TESTS_ENV, "PANDOLABO_ENABLE_GPU_TESTS");
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn headless_harness_creation() {
        let harness = HeadlessHarness::new().unwrap();
        assert!(harness.ctx().is_initialized());
    }
}
