// dwi-connectome/src/pipeline/mod.rs

//! `StagePipeline<TData, Err>`: an ordered list of named async stages over
//! shared state, with per-stage skip conditions.

pub mod definition;
pub mod execution;
pub mod hooks;

pub use definition::StagePipeline;
