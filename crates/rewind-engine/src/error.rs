//! Engine error type

use rewind_bytecode::{ClassError, CodeError, VerifyError};
use thiserror::Error;

/// Errors raised by the continuations engine
///
/// Lookup misses (unknown or expired continuation ids) are not errors; they
/// surface as `None`.
#[derive(Debug, Error)]
pub enum ContinuationError {
    // ===== Configuration =====
    /// Class bytes are not available from any provider
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// A super class or interface needed to decide eligibility is missing
    #[error("Cannot resolve the hierarchy of {class}: bytes of {missing} are unavailable")]
    UnresolvedHierarchy {
        /// Class being inspected
        class: String,
        /// The class whose bytes could not be supplied
        missing: String,
    },

    /// The runtime config has no manager for the executing continuable
    #[error("No continuation manager is available for {0}")]
    MissingManager(String),

    /// Invalid configuration value or file
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ===== Cloning =====
    /// An object reached while cloning doesn't support the clone contract
    #[error("Clone not supported for instances of {0}")]
    CloneNotSupported(String),

    // ===== Instrumentation =====
    /// Type inference could not establish a consistent frame
    #[error("Type analysis of {method} failed: {reason}")]
    Analysis {
        /// Class and method being analyzed
        method: String,
        /// What went wrong
        reason: String,
    },

    /// Rewriting a method body failed
    #[error("Instrumentation of {method} failed: {reason}")]
    Instrumentation {
        /// Class and method being rewritten
        method: String,
        /// What went wrong
        reason: String,
    },

    /// Malformed class file
    #[error(transparent)]
    Class(#[from] ClassError),

    /// Malformed method code
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Structurally invalid class
    #[error(transparent)]
    Verify(#[from] VerifyError),

    // ===== Execution =====
    /// A suspension method was reached in code that was not rewritten
    #[error("{0} was called outside an instrumented entry method")]
    NotInstrumented(String),

    /// A suspension opcode ran without an active context
    #[error("No active continuation context")]
    NoActiveContext,

    /// Method lookup failed
    #[error("No such method: {0}")]
    NoSuchMethod(String),

    /// Native method lookup failed
    #[error("Native method not registered: {0}")]
    NativeNotFound(String),

    /// An exception propagated out of the entry method
    #[error("Uncaught {class}: {message}")]
    UncaughtException {
        /// Class of the thrown object
        class: String,
        /// Its message, if any
        message: String,
    },

    /// Any other execution failure
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Engine result type
pub type EngineResult<T> = Result<T, ContinuationError>;
