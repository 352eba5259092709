pub mod engine;
pub mod error;
pub mod events;
pub mod experiments;

pub use engine::{ExecutionEngine, LocalEngine};
pub use error::EngineError;
pub use events::LoopEvent;
pub use experiments::{ExperimentAssigner, ModelVariantAssigner, NoopAssigner};
