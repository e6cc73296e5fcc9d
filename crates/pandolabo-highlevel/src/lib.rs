//! High-level orchestration for Pandolabo.
//!
//! Thin task-shaped wrappers over `pandolabo-gpu` that remove staging-buffer
//! lifetimes, pool resets, and semaphore plumbing from calling code. Every
//! synchronization decision still goes through explicit barriers and
//! wait/signal tokens; failures come back as [`pandolabo_core::Result`] with a
//! context step naming the operation that detected them.
//!
//! - [`ComputeRunner`]: lazily created compute driver with begin/record/submit
//! - [`Renderer`]: per-image graphics drivers and the acquire/submit/present loop
//! - [`ResourceTransfer`]: blocking uploads and readbacks through staging buffers
//! - [`TransferPlan`]: batched barriers and copies played back in one submission
//! - [`PipelineCache`]: keyed pipeline storage with create-on-miss

mod compute_runner;
mod pipeline_cache;
mod renderer;
mod resource_transfer;
mod transfer_plan;

pub use compute_runner::ComputeRunner;
pub use pipeline_cache::PipelineCache;
pub use renderer::{FrameContext, Renderer, RendererConfig};
pub use resource_transfer::ResourceTransfer;
pub use transfer_plan::{PlanOp, TransferPlan};

pub use pandolabo_core::{Error, ErrorCollector, ErrorKind, Result};
