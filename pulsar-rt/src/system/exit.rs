//! Process exit codes.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Exit codes of the runtime loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Normal shutdown
    Ok = 0,
    /// Internal error or uncaught failure
    Internal = 1,
    /// Configuration or improper input
    Config = 2,
    /// Forced termination after the graceful timeout was exceeded
    Forced = 3,
}

impl ExitCode {
    /// The numeric code handed to the OS.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Terminate the current process with this code.
    pub fn exit(self) -> ! {
        std::process::exit(self.code())
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}
