//! Test harness for the Pandolabo Vulkan layer.
//!
//! Provides a headless context factory and helpers for GPU-backed tests.
//! Those tests only run when `PANDOLABO_ENABLE_GPU_TESTS=1` is set; without
//! it they return early so the suite passes on machines with no Vulkan
//! device.

pub mod harness;

pub use harness::{gpu_tests_enabled, HeadlessHarness, GPU_TESTS_ENV};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("GPU error: {0}")]
    Gpu(#[from] pandolabo_gpu::GpuError),
    #[error(transparent)]
    Core(#[from] pandolabo_core::Error),
    #[error("Mismatch at element {index}: expected {expected}, got {actual}")]
    Mismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },
}

pub type Result<T> = std::result::Result<T, TestError>;

/// Check that `actual` matches `expected` element by element.
pub fn expect_u32s(actual: &[u32], expected: impl IntoIterator<Item = u32>) -> Result<()> {
    for (index, (&actual, expected)) in actual.iter().zip(expected).enumerate() {
        if actual != expected {
            return Err(TestError::Mismatch {
                index,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_values_pass() {
        assert!(expect_u32s(&[5, 5, 5], std::iter::repeat(5)).is_ok());
    }

    #[test]
    fn first_mismatch_is_reported() {
        let err = expect_u32s(&[1, 2, 9, 8], [1, 2, 3, 4]).unwrap_err();
        assert!(matches!(
            err,
            TestError::Mismatch {
                index: 2,
                expected: 3,
                actual: 9
            }
        ));
    }
}
