use super::{Error, Severity};

/// A policy for classifying and emitting errors.
///
/// Library crates return [`crate::Result`] and leave presentation to the
/// application, which installs an `ErrorPolicy` at stage boundaries.
///
/// ```rust,ignore
/// use vidtax_error::{ErrorPolicy, Severity, Error};
///
/// struct PrintPolicy;
/// impl ErrorPolicy for PrintPolicy {
///     fn classify(&self, e: &Error) -> Severity { e.severity() }
///     fn emit(&self, e: &Error) { eprintln!("[{:?}] {e}", self.classify(e)); }
/// }
/// ```
pub trait ErrorPolicy: Send + Sync {
    /// Classify the error's severity
    fn classify(&self, error: &Error) -> Severity;

    /// Emit the error according to the policy (e.g., log, collect, etc.)
    fn emit(&self, error: &Error);
}

/// A policy that uses the error's default severity and emits via tracing
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Default)]
pub struct TracingPolicy;

#[cfg(feature = "tracing")]
impl ErrorPolicy for TracingPolicy {
    fn classify(&self, error: &Error) -> Severity {
        error.severity()
    }

    fn emit(&self, error: &Error) {
        use tracing::{Level, event};

        match error.severity() {
            Severity::Warning => event!(Level::WARN, error = %error),
            Severity::Error | Severity::Fatal => event!(Level::ERROR, error = %error),
        }
    }
}
