//! Error types for allocation configuration loading.

use thiserror::Error;

use crate::allocation::document::DocumentError;

/// Errors raised while loading, parsing, or resolving an allocation file.
///
/// The manual reload path propagates these to the caller; the background
/// poll loop catches and logs them, keeping the previously published
/// snapshot in place.
#[derive(Debug, Error)]
pub enum AllocationConfigError {
    /// A resource expression such as "2048mb,10vcores" could not be parsed.
    #[error("malformed resource expression '{0}'")]
    MalformedResourceExpression(String),

    /// A queue name is empty, whitespace-only, contains '.', or collides
    /// with the root queue.
    #[error("invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: String },

    /// A placement rule declaration is structurally illegal: unknown rule
    /// name, bad nesting, or unreachable rules after a terminal rule.
    #[error("invalid placement rule structure: {0}")]
    InvalidPlacementRuleStructure(String),

    /// `fifo` was configured as the default scheduling policy.
    #[error("unsupported default scheduling policy '{0}'")]
    UnsupportedDefaultPolicy(String),

    /// A scalar setting holds a value of the wrong shape.
    #[error("invalid value '{value}' for {setting}: {reason}")]
    InvalidValue {
        setting: String,
        value: String,
        reason: String,
    },

    /// The document is not well-formed.
    #[error("malformed allocation document: {0}")]
    Document(#[from] DocumentError),

    /// The allocation file could not be read.
    #[error("failed to read allocation file: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for allocation configuration operations.
pub type AllocResult<T> = Result<T, AllocationConfigError>;
