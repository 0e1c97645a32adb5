//! Instrumentation driver
//!
//! [`ContinuableDetector`] decides eligibility from class headers,
//! [`ResumableAdapter`] rewrites the entry method using the type analysis and
//! [`ContinuationsTransformer`] ties both together for the class loader.

mod adapter;
mod config;
mod detector;
mod transformer;

pub use adapter::ResumableAdapter;
pub use config::{BasicInstrumentConfig, InstrumentConfig};
pub use detector::ContinuableDetector;
pub use transformer::ContinuationsTransformer;
