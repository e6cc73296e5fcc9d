//! Vulkan command and synchronization layer for Pandolabo.
//!
//! This crate provides:
//! - Context bootstrap: instance, device, queues per role, allocator, swapchain
//! - Vocabulary enums for stages, access types, and layouts
//! - Buffer, image, and memory barriers with ownership-transfer pairs
//! - Binary and timeline semaphores, fences, and batched host waits
//! - Tiered command recorders and per-role command drivers

pub mod barrier;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_kit;
pub mod semaphore;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod types;

pub use barrier::{
    buffer_ownership_transfer_pair, ownership_transfer_pair, AccessBarrier, BufferBarrier,
    BufferBarrierBuilder, ImageBarrier, ImageBarrierBuilder, MemoryBarrier, MemoryBarrierBuilder,
};
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{
    CommandBeginInfo, CommandDriver, CommandRecorder, ComputeCommandBuffer, ComputeOps,
    GraphicCommandBuffer, GraphicOps, Inheritance, TransferCommandBuffer, TransferOps,
};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::{Buffer, GpuAllocator, Image, ImageDesc};
pub use pipeline::Pipeline;
pub use render_kit::{RenderKit, SwapchainRenderKit};
pub use semaphore::{
    BinarySemaphore, Fence, SignalToken, SolidBinarySemaphore, SubmitSemaphore,
    SubmitSemaphoreGroup, TimelineCounter, TimelinePolicy, TimelineSemaphore, TimelineTracker,
    TimelineValues, WaitToken,
};
pub use swapchain::{FrameSlots, Swapchain};
pub use sync::{TimelineSemaphoreDriver, WaitedFences};
pub use types::*;

pub use ash::vk;
