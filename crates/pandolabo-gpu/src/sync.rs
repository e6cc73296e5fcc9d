//! Batched host waits.

use crate::error::{GpuError, Result};
use crate::semaphore::{timeout_as_false, Fence, TimelineSemaphore, WaitToken};
use ash::vk;

/// A set of fences waited on together.
#[derive(Debug, Default, Clone)]
pub struct WaitedFences {
    fences: Vec<vk::Fence>,
}

impl WaitedFences {
    pub fn new<'a>(fences: impl IntoIterator<Item = &'a Fence>) -> Self {
        Self {
            fences: fences.into_iter().map(Fence::handle).collect(),
        }
    }

    pub fn from_raw(fences: Vec<vk::Fence>) -> Self {
        Self { fences }
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Wait until every fence is signaled.
    ///
    /// On timeout returns `Ok(false)` and leaves the fences untouched. On
    /// success the fences are reset when `reset` is set.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait(&self, device: &ash::Device, timeout_ns: u64, reset: bool) -> Result<bool> {
        if self.fences.is_empty() {
            return Ok(true);
        }

        let signaled =
            timeout_as_false(unsafe { device.wait_for_fences(&self.fences, true, timeout_ns) })?;
        if signaled && reset {
            unsafe { device.reset_fences(&self.fences)? };
        }
        Ok(signaled)
    }
}

/// N timeline semaphores paired with N target values.
#[derive(Debug, Default, Clone)]
pub struct TimelineSemaphoreDriver {
    semaphores: Vec<vk::Semaphore>,
    values: Vec<u64>,
}

impl TimelineSemaphoreDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: &[WaitToken]) -> Self {
        Self {
            semaphores: tokens.iter().map(WaitToken::semaphore).collect(),
            values: tokens.iter().map(WaitToken::value).collect(),
        }
    }

    #[must_use]
    pub fn set_semaphores<'a>(
        mut self,
        semaphores: impl IntoIterator<Item = &'a TimelineSemaphore>,
    ) -> Self {
        self.semaphores = semaphores.into_iter().map(TimelineSemaphore::handle).collect();
        self
    }

    #[must_use]
    pub fn set_values(mut self, values: &[u64]) -> Self {
        self.values = values.to_vec();
        self
    }

    pub fn semaphores(&self) -> &[vk::Semaphore] {
        &self.semaphores
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    fn check_lengths(&self) -> Result<()> {
        if self.semaphores.len() == self.values.len() {
            Ok(())
        } else {
            Err(GpuError::Validation(format!(
                "Timeline driver has {} semaphores but {} values",
                self.semaphores.len(),
                self.values.len()
            )))
        }
    }

    /// Wait until every semaphore reaches its value, in one call.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait(&self, device: &ash::Device, timeout_ns: u64) -> Result<bool> {
        self.check_lengths()?;
        if self.semaphores.is_empty() {
            return Ok(true);
        }

        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&self.semaphores)
            .values(&self.values);
        timeout_as_false(unsafe { device.wait_semaphores(&wait_info, timeout_ns) })
    }

    /// Signal each semaphore to its value from the host.
    pub fn signal(&self, device: &ash::Device) -> Result<()> {
        self.check_lengths()?;
        for (&semaphore, &value) in self.semaphores.iter().zip(&self.values) {
            let signal_info = vk::SemaphoreSignalInfo::default()
                .semaphore(semaphore)
                .value(value);
            unsafe { device.signal_semaphore(&signal_info)? };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_lengths_fail_validation() {
        let driver = TimelineSemaphoreDriver::new().set_values(&[1, 2]);
        let err = driver.check_lengths().unwrap_err();
        assert!(matches!(err, GpuError::Validation(_)));
    }

    #[test]
    fn empty_sets_are_trivially_satisfied() {
        assert!(WaitedFences::default().is_empty());
        assert!(TimelineSemaphoreDriver::new().check_lengths().is_ok());
    }
}
