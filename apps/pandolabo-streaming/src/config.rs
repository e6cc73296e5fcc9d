//! Demo configuration.

/// Streaming demo settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Number of payloads streamed from the transfer queue to the compute queue.
    pub iterations: u32,
    /// Words per payload. Split in half between the two recording threads.
    pub payload_words: u32,
    /// Timeline value past which the demo's trackers recreate their semaphore.
    pub timeline_threshold: u64,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            iterations: 16,
            payload_words: 4096,
            timeline_threshold: 8,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_payload_words(mut self, words: u32) -> Self {
        self.payload_words = words;
        self
    }

    #[must_use]
    pub fn with_timeline_threshold(mut self, threshold: u64) -> Self {
        self.timeline_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Payload size in bytes.
    pub fn payload_bytes(&self) -> u64 {
        u64::from(self.payload_words) * 4
    }

    /// Apply command line flags on top of this configuration.
    pub fn apply_args(mut self, args: &[String]) -> anyhow::Result<Self> {
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match (args[i].as_str(), value) {
                ("--iterations" | "-n", Some(v)) => self.iterations = v.parse()?,
                ("--words" | "-w", Some(v)) => self.payload_words = v.parse()?,
                ("--threshold" | "-t", Some(v)) => self.timeline_threshold = v.parse()?,
                ("--validation", _) => {
                    self.validation = true;
                    i += 1;
                    continue;
                }
                (flag, _) => anyhow::bail!("Unknown or incomplete option: {flag}"),
            }
            i += 2;
        }

        if self.payload_words < 2 || self.payload_words % 2 != 0 {
            anyhow::bail!("--words must be an even number of at least 2");
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("pandolabo-streaming")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn flags_override_defaults() {
        let config = AppConfig::default()
            .apply_args(&args(&["-n", "3", "--words", "64", "--threshold", "2"]))
            .unwrap();
        assert_eq!(config.iterations, 3);
        assert_eq!(config.payload_words, 64);
        assert_eq!(config.timeline_threshold, 2);
        assert_eq!(config.payload_bytes(), 256);
    }

    #[test]
    fn odd_payloads_are_rejected() {
        assert!(AppConfig::default()
            .apply_args(&args(&["--words", "7"]))
            .is_err());
        assert!(AppConfig::default().apply_args(&args(&["--bogus"])).is_err());
    }
}
