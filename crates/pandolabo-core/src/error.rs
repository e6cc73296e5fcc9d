//! Error types for the engine.

use std::fmt;

use thiserror::Error;

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Runtime failure (uninitialized state, failed device call at the orchestration level).
    Runtime,
    /// Invalid configuration.
    Config,
    /// I/O failure.
    Io,
    /// Device or driver failure.
    Gpu,
    /// Caller-supplied data failed a precondition.
    Validation,
    /// Anything else.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Runtime => "Runtime",
            Self::Config => "Config",
            Self::Io => "IO",
            Self::Gpu => "GPU",
            Self::Validation => "Validation",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Engine-wide error type.
///
/// Carries a category, a message, and a context chain. Each orchestration
/// step that forwards an error prepends its own name with
/// [`Error::with_context`], so the rendered message reads outermost first:
/// `Runtime error: Renderer::endFrame: present | Failed to present image.`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {}{message}", context_prefix(.context))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: String,
}

fn context_prefix(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!("{context} | ")
    }
}

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: String::new(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn gpu(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Gpu, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Error category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message without the context chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context chain, outermost first. Empty when no context was attached.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Prepend a context step.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if self.context.is_empty() {
            context
        } else {
            format!("{context}: {}", self.context)
        };
        self
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Accumulates errors from independent steps and reports them together.
#[derive(Debug, Default, Clone)]
pub struct ErrorCollector {
    errors: Vec<Error>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn add(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Record the error of a failed result, passing the success value through.
    pub fn check<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.add(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// `Ok(())` when nothing was collected, otherwise one runtime error
    /// listing every collected error.
    pub fn finalize(&self) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let detail = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ");

        Err(Error::runtime(format!(
            "Collected {} error(s): {detail}",
            self.errors.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_context() {
        let err = Error::validation("Upload size exceeds destination buffer size");
        assert_eq!(
            err.to_string(),
            "Validation error: Upload size exceeds destination buffer size"
        );
    }

    #[test]
    fn context_chain_prepends() {
        let err = Error::runtime("Failed to present image.")
            .with_context("present")
            .with_context("Renderer::endFrame");
        assert_eq!(err.context(), "Renderer::endFrame: present");
        assert_eq!(
            err.to_string(),
            "Runtime error: Renderer::endFrame: present | Failed to present image."
        );
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(err.message(), "Failed to present image.");
    }

    #[test]
    fn io_errors_map_to_io_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "shader.spv");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn collector_empty_is_ok() {
        let collector = ErrorCollector::new();
        assert!(collector.finalize().is_ok());
    }

    #[test]
    fn collector_joins_errors() {
        let mut collector = ErrorCollector::new();
        collector.add(Error::gpu("queue lost"));
        assert_eq!(collector.check::<u32>(Ok(3)), Some(3));
        assert!(collector
            .check::<u32>(Err(Error::config("bad threshold")))
            .is_none());

        assert_eq!(collector.len(), 2);
        let err = collector.finalize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(
            err.message(),
            "Collected 2 error(s): GPU error: queue lost | Config error: bad threshold"
        );
    }
}
