//! CLI-specific error types and exit code mapping

use layerscan_core::error::LayerscanError;
use layerscan_inspector::InspectorError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Inspection, caching or layer merge failed.
    #[error("scan error: {0}")]
    Scan(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from layerscan-core.
    #[error("{0}")]
    Core(#[from] LayerscanError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success (warnings included)              |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration error                      |
    /// | 3    | Scan failure (walk, analyze, cache, merge) |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Core(LayerscanError::Config(_)) => 2,
            Self::Scan(_) | Self::Core(LayerscanError::Scan(_) | LayerscanError::Storage(_)) => 3,
            Self::Io(_) | Self::Core(LayerscanError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

impl From<InspectorError> for CliError {
    fn from(e: InspectorError) -> Self {
        match e {
            InspectorError::Config { .. } => Self::Config(e.to_string()),
            InspectorError::Cancelled => Self::Command("interrupted".to_owned()),
            other => Self::Scan(other.to_string()),
        }
    }
}
