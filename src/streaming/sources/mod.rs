//! Data source implementations for streaming.

pub mod generator;
pub mod memory;

#[cfg(feature = "wav")]
pub mod wav;

// Re-export main source types
pub use generator::{GeneratorConfig, GeneratorSource, SignalType};
pub use memory::{MemorySource, SampleSpan};

#[cfg(feature = "wav")]
pub use wav::WavSource;
