//! Error types for `covprobe`.
//!
//! Instrumentation has exactly one domain failure, a module that already
//! carries the reserved probe members. Everything else here is either a
//! caller breaking the visitation protocol or a collaborator failing.

use thiserror::Error;

/// Result type alias for instrumentation operations.
pub type Result<T> = std::result::Result<T, InstrError>;

/// Errors raised while instrumenting a module.
#[derive(Debug, Error)]
pub enum InstrError {
    /// The module declares a member with a reserved probe-storage name.
    ///
    /// Fatal for the whole module: the caller must not instrument it again.
    #[error("Module {module} is already instrumented")]
    AlreadyInstrumented {
        /// Qualified name of the offending module
        module: String,
    },

    /// Visitation events arrived out of order.
    #[error("Visitation protocol violated: {message}")]
    Protocol {
        /// What was out of order
        message: String,
    },

    /// The accessor code generator failed.
    #[error("Accessor generation failed: {message}")]
    Accessor {
        /// Generator supplied message
        message: String,
    },

    /// A field or method descriptor could not be parsed.
    #[error("Invalid descriptor '{descriptor}'")]
    InvalidDescriptor {
        /// The descriptor text
        descriptor: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error while reading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstrError {
    /// Build a protocol violation error.
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether the error marks a module that must be left untouched.
    #[must_use]
    pub const fn is_already_instrumented(&self) -> bool {
        matches!(self, Self::AlreadyInstrumented { .. })
    }
}
