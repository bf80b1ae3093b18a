//! Exit status codes for the CLI
//!
//! - 0: Success (every selected test passed)
//! - 1: Any error (definition errors, unreadable files, transport setup)
//! - 10: The run completed but at least one test failed its checks
//! - 130: User interrupted (Ctrl+C, standard SIGINT exit code)

use std::process::{ExitCode, Termination};

/// Exit status codes following standard Unix conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Successful execution
    Success = 0,
    /// Any error
    Error = 1,
    /// Run finished with failing checks
    ChecksFailed = 10,
    /// User interrupted (Ctrl+C) - standard SIGINT code
    Interrupted = 130,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

impl ExitStatus {
    /// Exit status for a finished run
    pub fn from_run(passed: bool) -> Self {
        if passed {
            ExitStatus::Success
        } else {
            ExitStatus::ChecksFailed
        }
    }

    /// Create an exit status from a raw exit code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitStatus::Success,
            10 => ExitStatus::ChecksFailed,
            130 => ExitStatus::Interrupted,
            _ => ExitStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_run() {
        assert_eq!(ExitStatus::from_run(true), ExitStatus::Success);
        assert_eq!(ExitStatus::from_run(false), ExitStatus::ChecksFailed);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ExitStatus::from_code(0), ExitStatus::Success);
        assert_eq!(ExitStatus::from_code(10), ExitStatus::ChecksFailed);
        assert_eq!(ExitStatus::from_code(130), ExitStatus::Interrupted);
        assert_eq!(ExitStatus::from_code(42), ExitStatus::Error);
    }
}
