/*!
 * Error types for Slotline
 */

use slotline_core_resilience::ResilienceError;
use slotline_sentinel::SentinelError;
use slotline_server::ServerError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SlotlineError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum SlotlineError {
    /// Missing or invalid configuration; prevents startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O against a known path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML (de)serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A guarded operation exhausted its retries or hit an open circuit
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    /// The portal refused the credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// An applicant form could not be filled or saved
    #[error("Form filling error: {0}")]
    FormFill(String),

    /// An external collaborator failed outside a retry boundary
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl SlotlineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SlotlineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SlotlineError::Config(_) | SlotlineError::Authentication(_) => EXIT_FATAL,
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if this error is fatal: the supervisor stops instead of starting a new life
    pub fn is_fatal(&self) -> bool {
        match self {
            SlotlineError::Config(_) => true,
            SlotlineError::Authentication(_) => true,

            SlotlineError::Io { .. } => false,
            SlotlineError::Serialization(_) => false,
            SlotlineError::Resilience(_) => false,
            SlotlineError::FormFill(_) => false,
            SlotlineError::Collaborator(_) => false,
            SlotlineError::Other(_) => false,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            SlotlineError::Resilience(e) => e.is_transient() || e.is_circuit_open(),
            SlotlineError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            SlotlineError::Config(_) => ErrorCategory::Configuration,
            SlotlineError::Io { .. } => ErrorCategory::IoError,
            SlotlineError::Serialization(_) => ErrorCategory::Serialization,
            SlotlineError::Resilience(e) if e.is_circuit_open() => ErrorCategory::CircuitOpen,
            SlotlineError::Resilience(_) => ErrorCategory::Retry,
            SlotlineError::Authentication(_) => ErrorCategory::Security,
            SlotlineError::FormFill(_) => ErrorCategory::Booking,
            SlotlineError::Collaborator(_) => ErrorCategory::Collaborator,
            SlotlineError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error categories for logging and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    IoError,
    Serialization,
    Retry,
    CircuitOpen,
    Security,
    Booking,
    Collaborator,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::IoError => "io",
            ErrorCategory::Serialization => "serialization",
            ErrorCategory::Retry => "retry",
            ErrorCategory::CircuitOpen => "circuit_open",
            ErrorCategory::Security => "security",
            ErrorCategory::Booking => "booking",
            ErrorCategory::Collaborator => "collaborator",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

impl From<serde_json::Error> for SlotlineError {
    fn from(err: serde_json::Error) -> Self {
        SlotlineError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SlotlineError {
    fn from(err: toml::de::Error) -> Self {
        SlotlineError::Config(err.to_string())
    }
}

impl From<SentinelError> for SlotlineError {
    fn from(err: SentinelError) -> Self {
        match err {
            SentinelError::InvalidPolicy(msg) => SlotlineError::Config(msg),
            SentinelError::Io { path, source } => SlotlineError::Io { path, source },
            SentinelError::Serialization(e) => SlotlineError::Serialization(e.to_string()),
        }
    }
}

impl From<ServerError> for SlotlineError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::InvalidAddress(addr) => {
                SlotlineError::Config(format!("Invalid bind address '{}'", addr))
            }
            other => SlotlineError::Other(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for SlotlineError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ResilienceError>() {
            Ok(inner) => SlotlineError::Resilience(inner),
            Err(other) => SlotlineError::Collaborator(format!("{:#}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        let err = SlotlineError::Config("missing key: username".into());
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), EXIT_FATAL);
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_circuit_open_is_transient() {
        let err = SlotlineError::from(ResilienceError::CircuitOpen {
            operation: "login".into(),
            attempts: 1,
        });
        assert!(!err.is_fatal());
        assert!(err.is_transient());
        assert_eq!(err.category(), ErrorCategory::CircuitOpen);
        assert_eq!(err.exit_code(), EXIT_PARTIAL);
    }

    #[test]
    fn test_anyhow_keeps_resilience_error() {
        let wrapped = anyhow::Error::new(ResilienceError::Transient("reset".into()));
        assert!(matches!(
            SlotlineError::from(wrapped),
            SlotlineError::Resilience(ResilienceError::Transient(_))
        ));

        let plain = anyhow::anyhow!("driver crashed");
        assert!(matches!(
            SlotlineError::from(plain),
            SlotlineError::Collaborator(msg) if msg == "driver crashed"
        ));
    }

    #[test]
    fn test_io_display_names_path() {
        let err = SlotlineError::io(
            "data/booking_stats.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            err.to_string(),
            "I/O error on data/booking_stats.json: denied"
        );
        assert_eq!(err.category().to_string(), "io");
    }
}
