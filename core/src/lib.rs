// dwi-connectome/src/lib.rs

//! dwi-connectome: an auto-configuring diffusion-MRI connectome pipeline.
//!
//! For one subject/session the crate:
//!  - checks the FreeSurfer derivatives and discovers the BIDS acquisition layout,
//!  - reads sidecars and b-values to classify the data (single/multi-shell,
//!    distortion-correction strategy),
//!  - selects a processing recipe for the `(species, shell)` pair,
//!  - assembles a step graph of MRtrix3/FSL invocations in ordered phases,
//!  - renders the graph as a bash script and runs it through an
//!    [`ExecutionEngine`] with node-level caching.
//!
//! The end-to-end flow is a [`StagePipeline`] driven by [`PipelineDriver`].

pub mod acquisition;
pub mod config;
pub mod core;
pub mod driver;
pub mod engine;
pub mod error;
pub mod freesurfer;
pub mod logging;
pub mod pipeline;
pub mod recipe;
pub mod registry;
pub mod workflow;

// --- Re-exports for the Public API ---

pub use crate::acquisition::{
  AcquisitionLayout, AcquisitionMetadata, BidsDirectorySource, DistortionStrategy, LayoutSource,
  PhaseEncodingDirection, ShellDetection, ShellType, Species,
};
pub use crate::config::{ProcessingConfig, RunParameters};
pub use crate::core::{ContextData, RunOutcome, StageControl};
pub use crate::driver::{exit_code, PipelineDriver, RunStatus};
pub use crate::engine::{ExecutionEngine, ExecutionReport, ExecutionRequest, LocalEngine, ProcessRunner, ToolRunner};
pub use crate::error::{DwiError, DwiResult, ErrorKind};
pub use crate::freesurfer::FreeSurferDerivatives;
pub use crate::pipeline::StagePipeline;
pub use crate::recipe::{FodAlgorithm, ProcessingRecipe, ResponseAlgorithm};
pub use crate::registry::RecipeRegistry;
pub use crate::workflow::{PlanSummary, StepGraph, WorkflowAssembler};
