pub mod executor;
pub mod outcome;

pub use executor::{EngineConfig, ExecutionEngine};
pub use outcome::{ExecutionReport, FillOutcome};
