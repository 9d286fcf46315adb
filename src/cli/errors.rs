//! CLI-specific error types
//!
//! All CLI errors are FATAL and end the process with [`EXIT_FATAL`].

use std::fmt;

use crate::recovery::RecoveryError;

/// Exit status for fatal errors (and clap usage errors)
pub const EXIT_FATAL: i32 = 2;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file or flag error
    ConfigError,
    /// Source store could not be opened
    SourceOpenFailed,
    /// Destination store could not be created or written
    DestinationFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SALVAGE_CLI_CONFIG_ERROR",
            Self::SourceOpenFailed => "SALVAGE_CLI_SOURCE_OPEN_FAILED",
            Self::DestinationFailed => "SALVAGE_CLI_DESTINATION_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<RecoveryError> for CliError {
    fn from(e: RecoveryError) -> Self {
        let code = match e {
            RecoveryError::SourceOpen { .. } => CliErrorCode::SourceOpenFailed,
            RecoveryError::DestinationOpen { .. } | RecoveryError::DestinationWrite { .. } => {
                CliErrorCode::DestinationFailed
            }
        };
        Self::new(code, e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::config_error(format!("Invalid config JSON: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
