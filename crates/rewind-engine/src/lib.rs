//! Rewind Continuations Engine
//!
//! This crate turns ordinary stack-machine methods into resumable ones:
//! - **Types**: per-instruction frame type inference (`types` module)
//! - **Instrument**: detection and rewriting of continuable classes (`instrument` module)
//! - **Runtime**: typed continuation stacks, contexts and the context manager
//! - **VM**: class loader, interpreter and the basic continuable runner
//!
//! # Example
//!
//! ```rust,ignore
//! use rewind_engine::{BasicContinuableRunner, BasicInstrumentConfig, DirectoryClassProvider, RuntimeSettings};
//!
//! let runner = BasicContinuableRunner::new(
//!     Arc::new(DirectoryClassProvider::new("classes")),
//!     Arc::new(BasicInstrumentConfig::default()),
//!     RuntimeSettings::default(),
//! );
//!
//! let mut outcome = runner.start("app/Countdown")?;
//! while let Some(id) = outcome.id {
//!     outcome = runner.resume(&id)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]

// ============================================================================
// Continuation Core
// ============================================================================

/// Typed continuation stack
pub mod stack;

/// Type inference over method control flow
pub mod types;

/// Eligibility detection and method rewriting
pub mod instrument;

/// Continuation contexts and call states
pub mod context;

/// Registry of live continuation contexts
pub mod manager;

/// Runtime policy
pub mod config;

/// Active context bookkeeping for one run
pub mod scope;

// ============================================================================
// Virtual Machine
// ============================================================================

/// Values and heap objects
pub mod value;

/// Built-in runtime classes
pub mod builtins;

/// Class loading with load-time instrumentation
pub mod loader;

/// Native method registry
pub mod natives;

/// Bytecode interpreter
pub mod interpreter;

/// Basic continuable runner
pub mod runner;

// ============================================================================
// Shared
// ============================================================================

/// Default tuning values
pub mod defaults;

/// Error types
pub mod error;

pub use config::{BasicRuntimeConfig, RuntimeConfig, RuntimeSettings};
pub use context::{CallState, ContinuationContext};
pub use error::{ContinuationError, EngineResult};
pub use instrument::{BasicInstrumentConfig, ContinuationsTransformer, InstrumentConfig};
pub use interpreter::{Completion, Interpreter, Suspension};
pub use loader::{
    ClassBytesProvider, ContinuableClassLoader, DirectoryClassProvider, MemoryClassProvider,
};
pub use manager::ContinuationManager;
pub use natives::NativeRegistry;
pub use runner::{BasicContinuableRunner, CallTargetRetriever, ClassCallTargetRetriever, RunOutcome};
pub use scope::ExecutionScope;
pub use stack::ContinuationStack;
pub use value::{ObjectRef, Value};
