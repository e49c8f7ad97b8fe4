// dwi-connectome/src/core/mod.rs

//! Building blocks of the stage pipeline: shared run state, stage
//! definitions and flow-control signals.

pub mod context_data;
pub mod control;
pub mod stage;

pub use context_data::ContextData;
pub use control::{RunOutcome, StageControl};
pub use stage::{SkipCondition, StageDef, StageHandler};
