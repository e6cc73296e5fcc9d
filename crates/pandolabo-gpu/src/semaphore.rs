//! Semaphores, fences, and submission wiring.
//!
//! Binary semaphores order one submission against one other submission (or a
//! present). Timeline semaphores carry a 64-bit counter: a submission waits for
//! a value and signals a higher one, so a producer/consumer chain across queues
//! needs no host round-trip. [`SubmitSemaphoreGroup`] collects any mix of both
//! kinds into the arrays one queue submission consumes.

use crate::error::Result;
use crate::types::PipelineStage;
use ash::vk;
use pandolabo_core::constants::{DEFAULT_TIMELINE_RESET_THRESHOLD, WAIT_FOREVER};
use std::sync::Arc;

/// Map a wait result onto `Ok(false)` for timeouts.
pub(crate) fn timeout_as_false(result: ash::prelude::VkResult<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(vk::Result::TIMEOUT) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// A binary semaphore.
pub struct BinarySemaphore {
    semaphore: vk::Semaphore,
    device: Arc<ash::Device>,
}

impl BinarySemaphore {
    pub fn new(device: &Arc<ash::Device>) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.create_semaphore(&create_info, None)? };

        Ok(Self {
            semaphore,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for BinarySemaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}

/// A fence for host-side completion tracking.
pub struct Fence {
    fence: vk::Fence,
    device: Arc<ash::Device>,
}

impl Fence {
    pub fn new(device: &Arc<ash::Device>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None)? };

        Ok(Self {
            fence,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until signaled. Returns `Ok(false)` if `timeout_ns` elapses first.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait(&self, timeout_ns: u64) -> Result<bool> {
        timeout_as_false(unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) })
    }

    /// Reset to unsignaled.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.reset_fences(&[self.fence])? };
        Ok(())
    }

    pub fn is_signaled(&self) -> Result<bool> {
        Ok(unsafe { self.device.get_fence_status(self.fence)? })
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

/// Binary semaphore paired with a fence the signalling submission also signals.
///
/// The fence starts signaled so the first host wait on it returns immediately.
pub struct SolidBinarySemaphore {
    semaphore: BinarySemaphore,
    fence: Fence,
}

impl SolidBinarySemaphore {
    pub fn new(device: &Arc<ash::Device>) -> Result<Self> {
        Ok(Self {
            semaphore: BinarySemaphore::new(device)?,
            fence: Fence::new(device, true)?,
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore.handle()
    }

    pub fn semaphore(&self) -> &BinarySemaphore {
        &self.semaphore
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }
}

/// A point on a timeline a submission waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitToken {
    semaphore: vk::Semaphore,
    value: u64,
}

impl WaitToken {
    pub fn semaphore(&self) -> vk::Semaphore {
        self.semaphore
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn wait_value(&self) -> u64 {
        self.value
    }
}

/// A point on a timeline a submission signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalToken {
    semaphore: vk::Semaphore,
    value: u64,
}

impl SignalToken {
    pub fn semaphore(&self) -> vk::Semaphore {
        self.semaphore
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn signal_value(&self) -> u64 {
        self.value
    }

    /// The token a consumer waits on to observe this signal.
    pub fn as_wait(&self) -> WaitToken {
        WaitToken {
            semaphore: self.semaphore,
            value: self.value,
        }
    }
}

/// When a long-running timeline is torn down and recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePolicy {
    /// Signal values above this trigger recreation.
    pub reset_threshold: u64,
}

impl Default for TimelinePolicy {
    fn default() -> Self {
        Self {
            reset_threshold: DEFAULT_TIMELINE_RESET_THRESHOLD,
        }
    }
}

impl TimelinePolicy {
    pub fn with_threshold(reset_threshold: u64) -> Self {
        Self { reset_threshold }
    }
}

/// Wait and signal values for driver timeline submissions.
///
/// Starts at wait 0 and signal 1. Each timeline submission advances both by
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineValues {
    wait: u64,
    signal: u64,
}

impl Default for TimelineValues {
    fn default() -> Self {
        Self { wait: 0, signal: 1 }
    }
}

impl TimelineValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_value(&self) -> u64 {
        self.wait
    }

    pub fn signal_value(&self) -> u64 {
        self.signal
    }

    pub fn advance_wait(&mut self) {
        self.wait += 1;
    }

    pub fn advance_signal(&mut self) {
        self.signal += 1;
    }

    /// Whether the signal value has run past the policy threshold.
    pub fn exceeds(&self, policy: &TimelinePolicy) -> bool {
        self.signal > policy.reset_threshold
    }
}

/// Issued values and generations of a [`TimelineTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineCounter {
    value: u64,
    generation: u64,
    policy: TimelinePolicy,
}

impl TimelineCounter {
    pub fn new(policy: TimelinePolicy) -> Self {
        Self {
            value: 0,
            generation: 0,
            policy,
        }
    }

    /// Whether the next issue has to start a new generation first.
    pub fn needs_restart(&self) -> bool {
        self.value > self.policy.reset_threshold
    }

    /// Drop back to zero and advance the generation.
    pub fn restart(&mut self) {
        self.value = 0;
        self.generation += 1;
    }

    /// Advance and return the new value.
    pub fn issue(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn policy(&self) -> TimelinePolicy {
        self.policy
    }
}

fn create_timeline(device: &ash::Device, initial_value: u64) -> Result<vk::Semaphore> {
    let mut type_info = vk::SemaphoreTypeCreateInfo::default()
        .semaphore_type(vk::SemaphoreType::TIMELINE)
        .initial_value(initial_value);
    let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
    Ok(unsafe { device.create_semaphore(&create_info, None)? })
}

/// A timeline semaphore with driver-side wait/signal bookkeeping.
///
/// The counter starts at 0. See [`TimelineValues`] for the bookkeeping.
/// Handles replaced by [`TimelineSemaphore::recreate`] are kept until
/// [`TimelineSemaphore::destroy_retired`] or drop.
pub struct TimelineSemaphore {
    semaphore: vk::Semaphore,
    values: TimelineValues,
    retired: Vec<vk::Semaphore>,
    device: Arc<ash::Device>,
}

impl TimelineSemaphore {
    pub fn new(device: &Arc<ash::Device>) -> Result<Self> {
        Ok(Self {
            semaphore: create_timeline(device, 0)?,
            values: TimelineValues::new(),
            retired: Vec::new(),
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Token for waiting on `value`. Does not touch the bookkeeping.
    pub fn for_wait(&self, value: u64) -> WaitToken {
        WaitToken {
            semaphore: self.semaphore,
            value,
        }
    }

    /// Token for signalling `value`. Does not touch the bookkeeping.
    pub fn for_signal(&self, value: u64) -> SignalToken {
        SignalToken {
            semaphore: self.semaphore,
            value,
        }
    }

    pub fn values(&self) -> TimelineValues {
        self.values
    }

    /// Value the next driver timeline submission waits for.
    pub fn wait_value(&self) -> u64 {
        self.values.wait_value()
    }

    /// Value the next driver timeline submission signals.
    pub fn signal_value(&self) -> u64 {
        self.values.signal_value()
    }

    pub(crate) fn update_wait_value(&mut self) {
        self.values.advance_wait();
    }

    pub(crate) fn update_signal_value(&mut self) {
        self.values.advance_signal();
    }

    /// Block until the counter reaches the current wait value.
    pub fn wait(&self, timeout_ns: u64) -> Result<bool> {
        self.wait_for(self.values.wait_value(), timeout_ns)
    }

    /// Block until the counter reaches `value`. Returns `Ok(false)` on timeout.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_for(&self, value: u64, timeout_ns: u64) -> Result<bool> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        timeout_as_false(unsafe { self.device.wait_semaphores(&wait_info, timeout_ns) })
    }

    /// Current counter value as seen by the device.
    pub fn counter_value(&self) -> Result<u64> {
        Ok(unsafe { self.device.get_semaphore_counter_value(self.semaphore)? })
    }

    /// Signal `value` from the host.
    pub fn signal(&self, value: u64) -> Result<()> {
        let signal_info = vk::SemaphoreSignalInfo::default()
            .semaphore(self.semaphore)
            .value(value);
        unsafe { self.device.signal_semaphore(&signal_info)? };
        Ok(())
    }

    /// Whether the bookkeeping has run past the policy threshold.
    pub fn needs_recreate(&self, policy: &TimelinePolicy) -> bool {
        self.values.exceeds(policy)
    }

    /// Swap in a fresh semaphore at counter 0.
    ///
    /// Blocks until the old counter reaches `drain_value`, which must already
    /// be submitted or the call never returns. The old handle is retired, not
    /// destroyed, since batches on other queues may still wait on it. Tokens
    /// issued before the call refer to the retired handle and must not be
    /// submitted.
    pub fn recreate(&mut self, drain_value: u64) -> Result<()> {
        self.wait_for(drain_value, WAIT_FOREVER)?;

        let semaphore = create_timeline(&self.device, 0)?;
        self.retired
            .push(std::mem::replace(&mut self.semaphore, semaphore));
        self.values = TimelineValues::new();
        Ok(())
    }

    /// Handles retired by [`Self::recreate`] and not yet destroyed.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Destroy every retired handle.
    ///
    /// # Safety
    /// No pending submission on any queue may reference a retired handle,
    /// for example after a device or queue wait-idle covering all users.
    pub unsafe fn destroy_retired(&mut self) {
        for semaphore in self.retired.drain(..) {
            unsafe { self.device.destroy_semaphore(semaphore, None) };
        }
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.destroy_retired();
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Owner of a long-running timeline that applies a [`TimelinePolicy`].
///
/// Each call to [`TimelineTracker::next_signal`] hands out the next value.
/// Once the running value exceeds the threshold, the semaphore is drained
/// and recreated, the value restarts at zero, and the generation advances.
pub struct TimelineTracker {
    semaphore: TimelineSemaphore,
    counter: TimelineCounter,
}

impl TimelineTracker {
    pub fn new(device: &Arc<ash::Device>, policy: TimelinePolicy) -> Result<Self> {
        Ok(Self {
            semaphore: TimelineSemaphore::new(device)?,
            counter: TimelineCounter::new(policy),
        })
    }

    /// Advance the timeline and return the token the next producer signals.
    ///
    /// The previous token must have been submitted (or signalled from the
    /// host) before this is called. Past the threshold the call drains the
    /// semaphore to that value and would otherwise block forever. The
    /// replaced handle is retired; see [`TimelineTracker::destroy_retired`].
    pub fn next_signal(&mut self) -> Result<SignalToken> {
        if self.counter.needs_restart() {
            tracing::info!(
                value = self.counter.value(),
                threshold = self.counter.policy().reset_threshold,
                "Timeline semaphore exceeded threshold, recreating"
            );
            self.semaphore.recreate(self.counter.value())?;
            self.counter.restart();
        }

        Ok(self.semaphore.for_signal(self.counter.issue()))
    }

    /// Token for the most recently issued value.
    pub fn current_wait(&self) -> WaitToken {
        self.semaphore.for_wait(self.counter.value())
    }

    /// Block until the most recently issued value is reached.
    pub fn wait(&self, timeout_ns: u64) -> Result<bool> {
        self.semaphore.wait_for(self.counter.value(), timeout_ns)
    }

    /// Destroy semaphores retired by past recreations.
    ///
    /// # Safety
    /// Same contract as [`TimelineSemaphore::destroy_retired`].
    pub unsafe fn destroy_retired(&mut self) {
        unsafe { self.semaphore.destroy_retired() };
    }

    pub fn value(&self) -> u64 {
        self.counter.value()
    }

    /// Number of times the semaphore has been recreated.
    pub fn generation(&self) -> u64 {
        self.counter.generation()
    }

    pub fn policy(&self) -> TimelinePolicy {
        self.counter.policy()
    }

    pub fn counter(&self) -> TimelineCounter {
        self.counter
    }

    pub fn semaphore(&self) -> &TimelineSemaphore {
        &self.semaphore
    }
}

/// One semaphore entry of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSemaphore {
    semaphore: vk::Semaphore,
    value: u64,
    stage_mask: vk::PipelineStageFlags,
}

impl SubmitSemaphore {
    /// Wait on a timeline point before `stage`.
    pub fn wait(token: WaitToken, stage: PipelineStage) -> Self {
        Self {
            semaphore: token.semaphore,
            value: token.value,
            stage_mask: stage.into(),
        }
    }

    /// Signal a timeline point.
    pub fn signal(token: SignalToken) -> Self {
        Self {
            semaphore: token.semaphore,
            value: token.value,
            stage_mask: vk::PipelineStageFlags::ALL_COMMANDS,
        }
    }

    /// Binary semaphore entry. `stage` only matters on the wait side.
    pub fn binary(semaphore: &BinarySemaphore, stage: PipelineStage) -> Self {
        Self::raw_binary(semaphore.handle(), stage)
    }

    pub fn raw_binary(semaphore: vk::Semaphore, stage: PipelineStage) -> Self {
        Self {
            semaphore,
            value: 0,
            stage_mask: stage.into(),
        }
    }

    #[must_use]
    pub fn stage_mask(mut self, stage: PipelineStage) -> Self {
        self.stage_mask = stage.into();
        self
    }

    pub fn semaphore(&self) -> vk::Semaphore {
        self.semaphore
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Wait/signal semaphore arrays for one queue submission.
///
/// Binary entries carry value 0 in the value arrays, which the device ignores.
#[derive(Debug, Default, Clone)]
pub struct SubmitSemaphoreGroup {
    wait_semaphores: Vec<vk::Semaphore>,
    wait_values: Vec<u64>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal_semaphores: Vec<vk::Semaphore>,
    signal_values: Vec<u64>,
}

impl SubmitSemaphoreGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the wait list, taking each entry's stage as its wait stage.
    #[must_use]
    pub fn set_wait_semaphores(
        mut self,
        semaphores: impl IntoIterator<Item = SubmitSemaphore>,
    ) -> Self {
        self.wait_semaphores.clear();
        self.wait_values.clear();
        self.wait_stages.clear();
        for entry in semaphores {
            self.push_wait(entry);
        }
        self
    }

    /// Replace the signal list.
    #[must_use]
    pub fn set_signal_semaphores(
        mut self,
        semaphores: impl IntoIterator<Item = SubmitSemaphore>,
    ) -> Self {
        self.signal_semaphores.clear();
        self.signal_values.clear();
        for entry in semaphores {
            self.push_signal(entry);
        }
        self
    }

    /// Replace the wait stages, one entry per wait semaphore.
    #[must_use]
    pub fn set_wait_stages(mut self, stages: &[PipelineStage]) -> Self {
        self.wait_stages = stages.iter().map(|&s| s.into()).collect();
        self
    }

    #[must_use]
    pub fn wait_token(mut self, token: WaitToken, stage: PipelineStage) -> Self {
        self.push_wait(SubmitSemaphore::wait(token, stage));
        self
    }

    #[must_use]
    pub fn wait_binary(mut self, semaphore: &BinarySemaphore, stage: PipelineStage) -> Self {
        self.push_wait(SubmitSemaphore::binary(semaphore, stage));
        self
    }

    #[must_use]
    pub fn signal_token(mut self, token: SignalToken) -> Self {
        self.push_signal(SubmitSemaphore::signal(token));
        self
    }

    #[must_use]
    pub fn signal_binary(mut self, semaphore: &BinarySemaphore) -> Self {
        self.push_signal(SubmitSemaphore::binary(semaphore, PipelineStage::AllCommands));
        self
    }

    /// Append a wait. Stages for earlier waits are resolved first so the new
    /// stage always lines up with the new semaphore.
    pub fn push_wait(&mut self, entry: SubmitSemaphore) {
        if self.wait_stages.len() != self.wait_semaphores.len() {
            self.wait_stages = self.resolved_wait_stages();
        }
        self.wait_semaphores.push(entry.semaphore);
        self.wait_values.push(entry.value);
        self.wait_stages.push(entry.stage_mask);
    }

    pub fn push_signal(&mut self, entry: SubmitSemaphore) {
        self.signal_semaphores.push(entry.semaphore);
        self.signal_values.push(entry.value);
    }

    pub fn wait_semaphores(&self) -> &[vk::Semaphore] {
        &self.wait_semaphores
    }

    pub fn signal_semaphores(&self) -> &[vk::Semaphore] {
        &self.signal_semaphores
    }

    pub fn wait_values(&self) -> &[u64] {
        &self.wait_values
    }

    pub fn signal_values(&self) -> &[u64] {
        &self.signal_values
    }

    /// Wait stages as set, which may be shorter than the wait list.
    pub fn wait_stages(&self) -> &[vk::PipelineStageFlags] {
        &self.wait_stages
    }

    /// Wait stages padded to one entry per wait semaphore.
    ///
    /// Missing entries repeat the last provided stage; with no stages at all,
    /// every wait blocks `ALL_COMMANDS`.
    pub fn resolved_wait_stages(&self) -> Vec<vk::PipelineStageFlags> {
        let fill = self
            .wait_stages
            .last()
            .copied()
            .unwrap_or(vk::PipelineStageFlags::ALL_COMMANDS);
        (0..self.wait_semaphores.len())
            .map(|i| self.wait_stages.get(i).copied().unwrap_or(fill))
            .collect()
    }

    /// Timeline values to chain into the submit info.
    pub fn timeline_submit_info(&self) -> vk::TimelineSemaphoreSubmitInfo<'_> {
        vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&self.wait_values)
            .signal_semaphore_values(&self.signal_values)
    }

    pub fn is_empty(&self) -> bool {
        self.wait_semaphores.is_empty() && self.signal_semaphores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn token_pair(raw: u64, wait: u64, signal: u64) -> (WaitToken, SignalToken) {
        let semaphore = vk::Semaphore::from_raw(raw);
        (
            WaitToken {
                semaphore,
                value: wait,
            },
            SignalToken {
                semaphore,
                value: signal,
            },
        )
    }

    #[test]
    fn tokens_are_plain_values() {
        let (wait, signal) = token_pair(7, 5, 7);
        assert_eq!(wait.wait_value(), 5);
        assert_eq!(signal.signal_value(), 7);
        assert_eq!(signal.as_wait().value(), 7);
        assert_eq!(signal.as_wait().semaphore(), wait.semaphore());
    }

    #[test]
    fn group_with_two_waits_and_one_signal() {
        let (wait_a, _) = token_pair(1, 3, 4);
        let (wait_b, signal_b) = token_pair(2, 8, 9);

        let group = SubmitSemaphoreGroup::new()
            .set_wait_semaphores([
                SubmitSemaphore::wait(wait_a, PipelineStage::Transfer),
                SubmitSemaphore::wait(wait_b, PipelineStage::Transfer),
            ])
            .set_signal_semaphores([SubmitSemaphore::signal(signal_b)])
            .set_wait_stages(&[PipelineStage::ComputeShader]);

        assert_eq!(group.wait_semaphores().len(), 2);
        assert_eq!(group.signal_semaphores().len(), 1);
        assert_eq!(group.wait_values(), &[3, 8]);
        assert_eq!(group.signal_values(), &[9]);

        let info = group.timeline_submit_info();
        assert_eq!(info.wait_semaphore_value_count, 2);
        assert_eq!(info.signal_semaphore_value_count, 1);
        assert!(!info.p_wait_semaphore_values.is_null());

        assert_eq!(
            group.resolved_wait_stages(),
            vec![vk::PipelineStageFlags::COMPUTE_SHADER; 2]
        );
    }

    #[test]
    fn binary_entries_carry_zero_values() {
        let group = SubmitSemaphoreGroup::new()
            .set_wait_semaphores([SubmitSemaphore::raw_binary(
                vk::Semaphore::from_raw(11),
                PipelineStage::ColorAttachmentOutput,
            )])
            .signal_token(token_pair(12, 0, 4).1);

        assert_eq!(group.wait_values(), &[0]);
        assert_eq!(group.signal_values(), &[4]);
        assert_eq!(
            group.wait_stages(),
            &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT]
        );
    }

    #[test]
    fn missing_stages_default_to_all_commands() {
        let (wait, _) = token_pair(3, 1, 2);
        let group = SubmitSemaphoreGroup::new()
            .wait_token(wait, PipelineStage::Transfer)
            .set_wait_stages(&[]);
        assert_eq!(
            group.resolved_wait_stages(),
            vec![vk::PipelineStageFlags::ALL_COMMANDS]
        );
        assert!(SubmitSemaphoreGroup::new().is_empty());
    }

    #[test]
    fn stages_set_short_are_filled_before_the_next_wait() {
        let (a, _) = token_pair(1, 1, 2);
        let (b, _) = token_pair(2, 1, 2);
        let (c, _) = token_pair(3, 1, 2);

        let group = SubmitSemaphoreGroup::new()
            .set_wait_semaphores([
                SubmitSemaphore::wait(a, PipelineStage::Transfer),
                SubmitSemaphore::wait(b, PipelineStage::Transfer),
            ])
            .set_wait_stages(&[PipelineStage::ComputeShader])
            .wait_token(c, PipelineStage::VertexInput);

        assert_eq!(
            group.resolved_wait_stages(),
            vec![
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::VERTEX_INPUT,
            ]
        );
        assert_eq!(group.wait_stages().len(), group.wait_semaphores().len());
    }

    #[test]
    fn stages_set_long_are_truncated_before_the_next_wait() {
        let (a, _) = token_pair(1, 1, 2);
        let (b, _) = token_pair(2, 1, 2);

        let group = SubmitSemaphoreGroup::new()
            .wait_token(a, PipelineStage::Transfer)
            .set_wait_stages(&[PipelineStage::ComputeShader, PipelineStage::FragmentShader])
            .wait_token(b, PipelineStage::VertexInput);

        assert_eq!(
            group.resolved_wait_stages(),
            vec![
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::VERTEX_INPUT,
            ]
        );
    }

    #[test]
    fn timeline_values_advance_in_step() {
        let mut values = TimelineValues::new();
        assert_eq!((values.wait_value(), values.signal_value()), (0, 1));

        for _ in 0..3 {
            values.advance_wait();
            values.advance_signal();
        }
        assert_eq!((values.wait_value(), values.signal_value()), (3, 4));
        assert_eq!(values.signal_value(), values.wait_value() + 1);
    }

    #[test]
    fn timeline_values_exceed_only_past_threshold() {
        let policy = TimelinePolicy::with_threshold(3);
        let mut values = TimelineValues::new();
        values.advance_signal();
        values.advance_signal();
        assert_eq!(values.signal_value(), 3);
        assert!(!values.exceeds(&policy));

        values.advance_signal();
        assert!(values.exceeds(&policy));
    }

    #[test]
    fn counter_restarts_after_crossing_threshold() {
        let mut counter = TimelineCounter::new(TimelinePolicy::with_threshold(2));
        assert_eq!(counter.issue(), 1);
        assert_eq!(counter.issue(), 2);
        assert!(!counter.needs_restart());

        assert_eq!(counter.issue(), 3);
        assert!(counter.needs_restart());

        counter.restart();
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.generation(), 1);
        assert!(!counter.needs_restart());
        assert_eq!(counter.issue(), 1);
    }

    #[test]
    fn counter_generation_counts_every_restart() {
        let mut counter = TimelineCounter::new(TimelinePolicy::with_threshold(0));
        for expected in 1..=4 {
            counter.issue();
            assert!(counter.needs_restart());
            counter.restart();
            assert_eq!(counter.generation(), expected);
        }
        assert_eq!(counter.policy().reset_threshold, 0);
    }

    #[test]
    fn default_policy_threshold() {
        assert_eq!(TimelinePolicy::default().reset_threshold, 1_000_000);
        assert_eq!(TimelinePolicy::with_threshold(8).reset_threshold, 8);
    }
}
