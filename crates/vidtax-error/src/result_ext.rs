use super::{ErrorPolicy, Result};

/// Extension trait for `Result` enabling policy-driven emission without
/// contaminating core control-flow with side-effects.
///
/// ```rust,ignore
/// use vidtax_error::{Result, ResultExt, TracingPolicy};
///
/// fn flush(policy: &TracingPolicy) {
///     let r: Result<()> = checkpoint.flush().map_err(Into::into);
///     // logged as a warning, the run continues without durability for this unit
///     let _ = r.log_and_continue(policy);
/// }
/// ```
pub trait ResultExt<T> {
    /// Emit any error through the policy and discard it.
    fn log_and_continue(self, policy: &impl ErrorPolicy) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn log_and_continue(self, policy: &impl ErrorPolicy) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                policy.emit(&e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{Error, Severity, WarningError};

    #[derive(Default)]
    struct Collect(Mutex<Vec<Severity>>);

    impl ErrorPolicy for Collect {
        fn classify(&self, error: &Error) -> Severity {
            error.severity()
        }
        fn emit(&self, error: &Error) {
            self.0.lock().unwrap().push(error.severity());
        }
    }

    #[test]
    fn log_and_continue_emits_and_discards() {
        let policy = Collect::default();
        let r: Result<u8> = Err(WarningError::CheckpointWrite("disk full".into()).into());
        assert_eq!(r.log_and_continue(&policy), None);
        let ok: Result<u8> = Ok(3);
        assert_eq!(ok.log_and_continue(&policy), Some(3));
        assert_eq!(*policy.0.lock().unwrap(), vec![Severity::Warning]);
    }
}
