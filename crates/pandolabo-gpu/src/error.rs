//! GPU error types.

use ash::vk;
use pandolabo_core::ErrorKind;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// An operation needed a swapchain but the context is headless.
    #[error("Swapchain not initialized")]
    SwapchainNotInitialized,

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A builder or argument failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Category of this error in the engine-wide taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Vulkan(_) | Self::NoSuitableDevice | Self::AllocationFailed(_) => ErrorKind::Gpu,
            Self::SurfaceCreation(_)
            | Self::SwapchainCreation(_)
            | Self::SwapchainNotInitialized
            | Self::PipelineCreation(_)
            | Self::InvalidState(_) => ErrorKind::Runtime,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Other(_) => ErrorKind::Unknown,
        }
    }

    /// Whether the swapchain must be recreated before the next frame.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }
}

impl From<GpuError> for pandolabo_core::Error {
    fn from(err: GpuError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_validation_kind() {
        let err = GpuError::Validation("Buffer barrier requires a buffer".to_string());
        assert_eq!(err.kind(), ErrorKind::Validation);

        let core: pandolabo_core::Error = err.into();
        assert_eq!(core.kind(), ErrorKind::Validation);
        assert_eq!(
            core.message(),
            "Validation failed: Buffer barrier requires a buffer"
        );
    }

    #[test]
    fn out_of_date_detection() {
        assert!(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR).is_out_of_date());
        assert!(!GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST).is_out_of_date());
        assert_eq!(
            GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST).kind(),
            ErrorKind::Gpu
        );
    }
}
