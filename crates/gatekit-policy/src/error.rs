//! Error types for the policy engine.
//!
//! The taxonomy mirrors the failure classes of the model contract:
//! - compatibility failures: a reference to a subject/object/activity,
//!   role, or usage mode unknown to the bound context, the role set, or the
//!   valid-usage-mode set, and context-name mismatches on rebind/load;
//! - parameter failures: empty or otherwise invalid arguments;
//! - validation failures: an activity with no authorized subject;
//! - property failures: malformed serialized payloads.
//!
//! All failures are synchronous and local; validation strictly precedes
//! mutation, so a rejected call never leaves partial state behind.

use gatekit_context::ContextError;
use gatekit_types::DataUsage;
use thiserror::Error;

/// Error type for policy model and role lattice operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A referenced identifier is unknown to the bound context.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A referenced role is not part of the role set.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// A referenced usage mode is outside the valid-usage-mode set.
    #[error("usage mode '{mode}' is not in the valid usage mode set")]
    InvalidUsageMode {
        /// The offending mode.
        mode: DataUsage,
    },

    /// A context name mismatch on rebind or properties load.
    #[error("context name mismatch: expected '{expected}', found '{found}'")]
    ContextMismatch {
        /// Name of the currently bound context.
        expected: String,
        /// Name carried by the new context or the properties payload.
        found: String,
    },

    /// An empty or otherwise invalid argument.
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// An activity with no authorized subject, raised by validity checking.
    #[error("activity '{0}' has no authorized subject")]
    NotExecutable(String),

    /// A malformed serialized properties payload.
    #[error("malformed properties payload: {0}")]
    Property(#[from] serde_json::Error),
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
