//! Command recording and submission.
//!
//! A [`CommandDriver`] owns the pools and buffers for one queue role and is
//! the only place buffers are allocated, reset, or submitted. Recording goes
//! through tiered wrappers: [`TransferCommandBuffer`] exposes [`TransferOps`],
//! [`ComputeCommandBuffer`] adds [`ComputeOps`], and [`GraphicCommandBuffer`]
//! adds [`GraphicOps`]. Operations shared by every tier live on
//! [`CommandRecorder`], which each wrapper dereferences to.

pub mod driver;
pub mod pool;
pub mod recorder;

pub use driver::CommandDriver;
pub use pool::CommandPool;
pub use recorder::{
    coerce_copy_dst_layout, coerce_copy_src_layout, mip_chain_plan, CommandBeginInfo,
    CommandRecorder, ComputeCommandBuffer, ComputeOps, GraphicCommandBuffer, GraphicOps,
    Inheritance, MipStep, RecorderState, TransferCommandBuffer, TransferOps,
};
