// dwi-connectome/src/driver.rs

//! Runs one subject/session end to end: FreeSurfer check, discovery,
//! metadata, detection, recipe selection, assembly, script rendering and
//! execution. Each of these is a stage of a [`StagePipeline`] over a shared
//! [`DriverState`].

use crate::acquisition::{
  AcquisitionLayout, AcquisitionMetadata, BidsDirectorySource, DistortionStrategy, LayoutSource, ShellDetection,
  ShellType,
};
use crate::config::ProcessingConfig;
use crate::core::{ContextData, RunOutcome, SkipCondition, StageControl};
use crate::engine::{ExecutionEngine, ExecutionReport, ExecutionRequest, LocalEngine, ProcessRunner};
use crate::error::{DwiError, DwiResult};
use crate::freesurfer::FreeSurferDerivatives;
use crate::pipeline::StagePipeline;
use crate::recipe::ProcessingRecipe;
use crate::registry::RecipeRegistry;
use crate::workflow::{available_atlases, write_script, AssemblyContext, PlanSummary, StepGraph, WorkflowAssembler};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{event, instrument, Level};

pub const STAGES: [&str; 8] = [
  "validate_freesurfer",
  "discover_layout",
  "extract_metadata",
  "detect_configuration",
  "select_recipe",
  "assemble_graph",
  "render_script",
  "execute_graph",
];

/// Everything the stages produce, filled in stage by stage.
#[derive(Debug)]
pub struct DriverState {
  pub config: ProcessingConfig,
  pub freesurfer: Option<FreeSurferDerivatives>,
  pub layout: Option<AcquisitionLayout>,
  pub metadata: Option<AcquisitionMetadata>,
  pub shell_type: Option<ShellType>,
  pub distortion_strategy: Option<DistortionStrategy>,
  pub recipe: Option<ProcessingRecipe>,
  pub graph: Option<StepGraph>,
  pub summary: Option<PlanSummary>,
  pub script_path: Option<PathBuf>,
  pub report: Option<ExecutionReport>,
}

impl DriverState {
  pub fn new(config: ProcessingConfig) -> Self {
    Self {
      config,
      freesurfer: None,
      layout: None,
      metadata: None,
      shell_type: None,
      distortion_strategy: None,
      recipe: None,
      graph: None,
      summary: None,
      script_path: None,
      report: None,
    }
  }
}

fn require<'a, T>(value: &'a Option<T>, what: &str) -> DwiResult<&'a T> {
  value
    .as_ref()
    .ok_or_else(|| DwiError::internal(format!("{} is not available at this stage", what)))
}

/// Terminal state of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
  /// The graph ran; `report` lists executed and cached nodes.
  Completed {
    summary: PlanSummary,
    script: PathBuf,
    report: ExecutionReport,
  },
  /// Dry run: the script was written, nothing executed.
  Planned { summary: PlanSummary, script: PathBuf },
}

impl RunStatus {
  pub fn summary(&self) -> &PlanSummary {
    match self {
      RunStatus::Completed { summary, .. } | RunStatus::Planned { summary, .. } => summary,
    }
  }

  pub fn script(&self) -> &std::path::Path {
    match self {
      RunStatus::Completed { script, .. } | RunStatus::Planned { script, .. } => script,
    }
  }

  pub fn report(&self) -> Option<&ExecutionReport> {
    match self {
      RunStatus::Completed { report, .. } => Some(report),
      RunStatus::Planned { .. } => None,
    }
  }

  pub fn exit_code(&self) -> i32 {
    0
  }
}

/// Process exit status for a finished run.
pub fn exit_code(result: &DwiResult<RunStatus>) -> i32 {
  match result {
    Ok(status) => status.exit_code(),
    Err(e) => e.exit_code(),
  }
}

pub struct PipelineDriver {
  layout_source: Arc<dyn LayoutSource>,
  engine: Arc<dyn ExecutionEngine>,
  registry: Arc<RecipeRegistry>,
  detection: ShellDetection,
}

impl PipelineDriver {
  pub fn new(layout_source: Arc<dyn LayoutSource>, engine: Arc<dyn ExecutionEngine>) -> Self {
    Self {
      layout_source,
      engine,
      registry: Arc::new(RecipeRegistry::builtin()),
      detection: ShellDetection::default(),
    }
  }

  /// BIDS directory discovery and local process execution.
  pub fn local(config: &ProcessingConfig) -> Self {
    Self::new(
      Arc::new(BidsDirectorySource::new(config.bids_dir())),
      Arc::new(LocalEngine::new(ProcessRunner)),
    )
  }

  pub fn with_registry(mut self, registry: RecipeRegistry) -> Self {
    self.registry = Arc::new(registry);
    self
  }

  pub fn with_shell_detection(mut self, detection: ShellDetection) -> Self {
    self.detection = detection;
    self
  }

  #[instrument(name = "PipelineDriver::run", skip_all, fields(run_id = config.run_id()), err(Display))]
  pub async fn run(&self, config: ProcessingConfig) -> DwiResult<RunStatus> {
    let ctx = ContextData::new(DriverState::new(config));
    let outcome = self.build_pipeline()?.run(ctx.clone()).await?;
    if let RunOutcome::Stopped { at } = outcome {
      return Err(DwiError::internal(format!("pipeline stopped early at '{}'", at)));
    }

    let state = ctx
      .into_inner()
      .map_err(|_| DwiError::internal("run state is still shared after the pipeline finished"))?;
    let summary = require(&state.summary, "plan summary")?.clone();
    let script = require(&state.script_path, "script path")?.clone();
    let status = match state.report {
      Some(report) => RunStatus::Completed { summary, script, report },
      None => RunStatus::Planned { summary, script },
    };
    event!(Level::INFO, planned = matches!(status, RunStatus::Planned { .. }), "Run finished.");
    Ok(status)
  }

  pub fn build_pipeline(&self) -> DwiResult<StagePipeline<DriverState, DwiError>> {
    let mut pipeline = StagePipeline::new(&STAGES);

    pipeline.on_stage("validate_freesurfer", |ctx: ContextData<DriverState>| async move {
      let derivatives = {
        let state = ctx.read();
        let config = &state.config;
        FreeSurferDerivatives::probe(config.freesurfer_dir(), config.subject(), config.session())
      };
      derivatives.require_mandatory()?;
      event!(Level::INFO, subject_dir = %derivatives.subject_dir().display(), "FreeSurfer derivatives present.");
      ctx.write().freesurfer = Some(derivatives);
      Ok::<_, DwiError>(StageControl::Continue)
    })?;

    let source = Arc::clone(&self.layout_source);
    pipeline.on_stage("discover_layout", move |ctx: ContextData<DriverState>| {
      let source = Arc::clone(&source);
      async move {
        let (subject, session, freesurfer) = {
          let state = ctx.read();
          (
            state.config.subject().to_string(),
            state.config.session().map(str::to_string),
            require(&state.freesurfer, "FreeSurfer probe")?.clone(),
          )
        };
        let layout = source
          .discover(&subject, session.as_deref(), &freesurfer)
          .await
          .map_err(DwiError::from)?;
        event!(
          Level::INFO,
          dwi = %layout.primary_dwi().image.display(),
          reverse = layout.reverse_dwi().is_some(),
          fieldmap = layout.fieldmap().is_some(),
          "Acquisition layout discovered."
        );
        ctx.write().layout = Some(layout);
        Ok::<_, DwiError>(StageControl::Continue)
      }
    })?;

    let detection = self.detection;
    pipeline.on_stage("extract_metadata", move |ctx: ContextData<DriverState>| async move {
      let metadata = {
        let state = ctx.read();
        AcquisitionMetadata::load(require(&state.layout, "layout")?, detection)?
      };
      ctx.write().metadata = Some(metadata);
      Ok::<_, DwiError>(StageControl::Continue)
    })?;

    pipeline.on_stage("detect_configuration", |ctx: ContextData<DriverState>| async move {
      let mut state = ctx.write();
      let shell_type = require(&state.metadata, "metadata")?.shell_type();
      let strategy = require(&state.layout, "layout")?.distortion_strategy();
      event!(
        Level::INFO,
        species = %state.config.species(),
        %shell_type,
        %strategy,
        "Processing variant detected."
      );
      state.shell_type = Some(shell_type);
      state.distortion_strategy = Some(strategy);
      Ok::<_, DwiError>(StageControl::Continue)
    })?;

    let registry = Arc::clone(&self.registry);
    pipeline.on_stage("select_recipe", move |ctx: ContextData<DriverState>| {
      let registry = Arc::clone(&registry);
      async move {
        let mut state = ctx.write();
        let shell_type = *require(&state.shell_type, "shell type")?;
        let recipe = registry.select(state.config.species(), shell_type)?;
        state.recipe = Some(recipe);
        Ok::<_, DwiError>(StageControl::Continue)
      }
    })?;

    pipeline.on_stage("assemble_graph", |ctx: ContextData<DriverState>| async move {
      let mut state = ctx.write();
      let (graph, summary) = {
        let assembly = AssemblyContext {
          recipe: require(&state.recipe, "recipe")?,
          layout: require(&state.layout, "layout")?,
          metadata: require(&state.metadata, "metadata")?,
          config: &state.config,
        };
        let graph = WorkflowAssembler::assemble(assembly)?;
        let summary = PlanSummary::new(&assembly, &graph);
        (graph, summary)
      };
      event!(Level::INFO, %summary, "Step graph assembled.");
      state.graph = Some(graph);
      state.summary = Some(summary);
      Ok::<_, DwiError>(StageControl::Continue)
    })?;

    pipeline.on_stage("render_script", |ctx: ContextData<DriverState>| async move {
      let mut state = ctx.write();
      let path = write_script(require(&state.graph, "graph")?, &state.config)?;
      state.script_path = Some(path);
      Ok::<_, DwiError>(StageControl::Continue)
    })?;

    let engine = Arc::clone(&self.engine);
    pipeline.on_stage("execute_graph", move |ctx: ContextData<DriverState>| {
      let engine = Arc::clone(&engine);
      async move {
        let (graph, request) = {
          let state = ctx.read();
          let layout = require(&state.layout, "layout")?;
          if !available_atlases(layout).is_empty() {
            state.config.require_lut_dir()?;
          }
          (
            require(&state.graph, "graph")?.clone(),
            ExecutionRequest::from_config(&state.config),
          )
        };
        let report = engine.execute(&graph, &request).await?;
        ctx.write().report = Some(report);
        Ok::<_, DwiError>(StageControl::Continue)
      }
    })?;
    let dry_run: SkipCondition<DriverState> = Arc::new(|ctx: ContextData<DriverState>| {
      let dry_run = ctx.map_read(|state| &state.config).dry_run();
      if dry_run {
        event!(Level::INFO, "Dry run, skipping execution.");
      }
      dry_run
    });
    pipeline.set_skip_condition("execute_graph", Some(dry_run))?;

    Ok(pipeline)
  }
}
