// dwi-connectome/src/workflow/mod.rs

//! The step graph for one run: tool contracts, the graph itself, the phased
//! assembler that builds it and the bash rendering of it.

pub mod assembler;
pub mod atlas;
pub mod graph;
pub mod script;
pub mod tools;

pub use assembler::{AssemblyContext, GraphState, PlanSummary, WorkflowAssembler};
pub use atlas::{available_atlases, Atlas, AtlasSource};
pub use graph::{DataHandle, Edge, OutputFile, PathResolver, StepGraph, StepNode};
pub use script::{render_script, shell_quote, write_script};
pub use tools::{DistortionCorrection, FodParameters, NodeIo, Tissue, ToolInvocation, TrackingParameters};
