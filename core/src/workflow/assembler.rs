// dwi-connectome/src/workflow/assembler.rs

//! Builds the step graph for one run in ordered phases.
//!
//! Each phase takes the accumulated [`GraphState`] by value and returns the
//! next one, so a phase can only see what earlier phases registered.
//! [`WorkflowAssembler`] chains the phases fluently and carries the first
//! error through to [`WorkflowAssembler::finish`].

use super::atlas::{available_atlases, Atlas, FREESURFER_COLOR_LUT};
use super::graph::{DataHandle, StepGraph, StepNode};
use super::tools::{self, DistortionCorrection, FodParameters, Tissue, ToolInvocation, TrackingParameters};
use crate::acquisition::{AcquisitionLayout, AcquisitionMetadata, DistortionStrategy, ShellType, Species};
use crate::config::ProcessingConfig;
use crate::error::{DwiError, DwiResult};
use crate::recipe::{FodAlgorithm, ProcessingRecipe};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{event, instrument, Level};

pub const SIFT_SELECTION: u64 = 1_000_000;

/// Registry keys for data handed between phases.
pub mod keys {
  pub const T1W: &str = "t1w";
  pub const DWI: &str = "dwi";
  pub const DENOISED: &str = "denoised";
  pub const DEGIBBSED: &str = "degibbsed";
  pub const PREPROCESSED: &str = "preprocessed";
  pub const BIAS_CORRECTED: &str = "bias_corrected";
  pub const MASK: &str = "mask";
  pub const MEAN_B0: &str = "mean_b0";
  pub const T1_BRAIN: &str = "t1_brain";
  pub const T1_IN_DWI: &str = "t1_in_dwi";
  pub const FIVE_TT: &str = "5tt";
  pub const GMWMI: &str = "gmwmi";
  pub const TRACKS: &str = "tracks";
  pub const SIFT2_WEIGHTS: &str = "sift2_weights";
  pub const SELECTED_TRACKS: &str = "selected_tracks";
  pub const SELECTED_WEIGHTS: &str = "selected_weights";

  pub fn response(tissue: super::Tissue) -> String {
    format!("response.{}", tissue.label())
  }

  pub fn fod(tissue: super::Tissue) -> String {
    format!("fod.{}", tissue.label())
  }

  pub fn normalised_fod(tissue: super::Tissue) -> String {
    format!("fod_norm.{}", tissue.label())
  }

  pub fn parcels(atlas: super::Atlas) -> String {
    format!("parcels.{}", atlas.label())
  }

  pub fn connectome(atlas: super::Atlas, kind: &str) -> String {
    format!("connectome.{}.{}", atlas.label(), kind)
  }
}

/// Everything the phases read. Borrowed, never modified.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyContext<'a> {
  pub recipe: &'a ProcessingRecipe,
  pub layout: &'a AcquisitionLayout,
  pub metadata: &'a AcquisitionMetadata,
  pub config: &'a ProcessingConfig,
}

/// The graph so far plus the logical-name registry of data handles.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
  graph: StepGraph,
  registry: BTreeMap<String, DataHandle>,
}

impl GraphState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn graph(&self) -> &StepGraph {
    &self.graph
  }

  pub fn registry(&self) -> &BTreeMap<String, DataHandle> {
    &self.registry
  }

  /// Looks up a handle registered by an earlier phase.
  pub fn handle(&self, key: &str, needed_by: &str) -> DwiResult<DataHandle> {
    self.registry.get(key).cloned().ok_or_else(|| {
      DwiError::build(
        needed_by,
        format!("required data '{}' has not been produced by an earlier phase", key),
      )
    })
  }

  pub fn register(mut self, key: impl Into<String>, handle: DataHandle) -> Self {
    self.registry.insert(key.into(), handle);
    self
  }

  pub fn add(mut self, node: StepNode) -> DwiResult<Self> {
    event!(Level::DEBUG, step = node.name(), tool = node.tool().program(), "Adding node.");
    self.graph.add_node(node)?;
    Ok(self)
  }

  /// Builds a node against the current registry, then adds it.
  pub fn add_with(self, build: impl FnOnce(&Self) -> DwiResult<StepNode>) -> DwiResult<Self> {
    let node = build(&self)?;
    self.add(node)
  }

  pub fn into_graph(self) -> StepGraph {
    self.graph
  }
}

/// Phase 1. Conversion, denoising, optional degibbs, distortion correction,
/// bias correction and the brain mask.
#[instrument(name = "assemble::preprocessing", skip_all, fields(strategy = %ctx.layout.distortion_strategy()), err(Display))]
pub fn add_preprocessing(state: GraphState, ctx: &AssemblyContext<'_>) -> DwiResult<GraphState> {
  let primary = ctx.layout.primary_dwi();
  let mut state = state
    .register(keys::T1W, DataHandle::external(ctx.layout.anat_t1w()))
    .add(
      StepNode::new("mrconvert", ToolInvocation::ConvertDwi)
        .input(tools::IN, DataHandle::external(&primary.image))
        .input(tools::BVEC, DataHandle::external(&primary.bvec))
        .input(tools::BVAL, DataHandle::external(&primary.bval))
        .output(tools::OUT, "dwi.mif"),
    )?
    .register(keys::DWI, DataHandle::step_output("mrconvert", tools::OUT));

  state = state
    .add_with(|s| {
      Ok(
        StepNode::new("dwidenoise", ToolInvocation::Denoise)
          .input(tools::IN, s.handle(keys::DWI, "dwidenoise")?)
          .output(tools::OUT, "dwi_denoised.mif")
          .output(tools::NOISE, "noise.mif"),
      )
    })?
    .register(keys::DENOISED, DataHandle::step_output("dwidenoise", tools::OUT));

  let mut corrected_input = keys::DENOISED;
  if ctx.recipe.apply_degibbs {
    state = state
      .add_with(|s| {
        Ok(
          StepNode::new("mrdegibbs", ToolInvocation::Degibbs)
            .input(tools::IN, s.handle(keys::DENOISED, "mrdegibbs")?)
            .output(tools::OUT, "dwi_degibbs.mif"),
        )
      })?
      .register(keys::DEGIBBSED, DataHandle::step_output("mrdegibbs", tools::OUT));
    corrected_input = keys::DEGIBBSED;
  } else {
    event!(Level::INFO, "Recipe disables Gibbs ringing removal, skipping mrdegibbs.");
  }

  let (correction, extra_input) = distortion_correction(&mut state, ctx)?;
  state = state
    .add_with(|s| {
      Ok(
        StepNode::new("dwifslpreproc", ToolInvocation::Preprocess { correction })
          .input(tools::IN, s.handle(corrected_input, "dwifslpreproc")?)
          .inputs_from(extra_input)
          .output(tools::OUT, "dwi_preproc.mif"),
      )
    })?
    .register(keys::PREPROCESSED, DataHandle::step_output("dwifslpreproc", tools::OUT));

  state = state
    .add_with(|s| {
      Ok(
        StepNode::new("dwibiascorrect", ToolInvocation::BiasCorrect)
          .input(tools::IN, s.handle(keys::PREPROCESSED, "dwibiascorrect")?)
          .output(tools::OUT, "dwi_biascorr.mif"),
      )
    })?
    .register(keys::BIAS_CORRECTED, DataHandle::step_output("dwibiascorrect", tools::OUT));

  match ctx.config.mask() {
    Some(external) => {
      event!(Level::INFO, mask = %external.display(), "Using external brain mask, skipping dwi2mask.");
      Ok(state.register(keys::MASK, DataHandle::external(external)))
    }
    None => Ok(
      state
        .add_with(|s| {
          Ok(
            StepNode::new("dwi2mask", ToolInvocation::Mask)
              .input(tools::IN, s.handle(keys::BIAS_CORRECTED, "dwi2mask")?)
              .output(tools::OUT, "mask.mif"),
          )
        })?
        .register(keys::MASK, DataHandle::step_output("dwi2mask", tools::OUT)),
    ),
  }
}

/// Chooses the correction parameters and adds any helper node they depend on.
/// Returns the extra input the correction node binds, if any.
fn distortion_correction(
  state: &mut GraphState,
  ctx: &AssemblyContext<'_>,
) -> DwiResult<(DistortionCorrection, Option<(&'static str, DataHandle)>)> {
  let pe_dir = ctx.metadata.pe_direction();
  let readout_time = ctx.metadata.total_readout_time();

  match ctx.layout.distortion_strategy() {
    DistortionStrategy::RpePair => {
      let reverse = ctx
        .layout
        .reverse_dwi()
        .ok_or_else(|| DwiError::build("se_epi_pair", "RPE_PAIR strategy without a reverse phase-encoded series"))?;
      let reverse_pe_dir = ctx.metadata.reverse_pe_direction().unwrap_or_else(|| pe_dir.reversed());
      if reverse_pe_dir != pe_dir.reversed() {
        event!(Level::WARN, %pe_dir, %reverse_pe_dir, "Reverse series is not encoded along the opposite direction.");
      }
      let node = StepNode::new("se_epi_pair", ToolInvocation::SeEpiPair)
        .input(tools::IN, state.handle(keys::DWI, "se_epi_pair")?)
        .input(tools::REVERSE, DataHandle::external(&reverse.image))
        .input(tools::REVERSE_BVEC, DataHandle::external(&reverse.bvec))
        .input(tools::REVERSE_BVAL, DataHandle::external(&reverse.bval))
        .output(tools::REVERSE_MIF, "dwi_reverse.mif")
        .output(tools::B0_PRIMARY, "b0_primary.mif")
        .output(tools::B0_REVERSE, "b0_reverse.mif")
        .output(tools::OUT, "b0_pair.mif");
      replace_with(state, |s| s.add(node))?;
      event!(Level::INFO, %pe_dir, %reverse_pe_dir, "Configured RPE_PAIR correction (topup + eddy).");
      Ok((
        DistortionCorrection::RpePair {
          pe_dir,
          reverse_pe_dir,
          readout_time,
        },
        Some((tools::SE_EPI, DataHandle::step_output("se_epi_pair", tools::OUT))),
      ))
    }
    DistortionStrategy::Fieldmap => {
      let fieldmap = ctx
        .layout
        .fieldmap()
        .ok_or_else(|| DwiError::build("prepare_fieldmap", "FIELDMAP strategy without fieldmap files"))?;
      let magnitude = fieldmap
        .magnitude()
        .ok_or_else(|| DwiError::build("prepare_fieldmap", "fieldmap set has no magnitude image"))?;
      let delta_te = ctx
        .metadata
        .delta_te()
        .ok_or_else(|| DwiError::build("prepare_fieldmap", "echo-time difference was not extracted"))?;
      let delta_te_ms = delta_te * 1000.0;
      let node = StepNode::new("prepare_fieldmap", ToolInvocation::PrepareFieldmap { delta_te_ms })
        .input(tools::PHASEDIFF, DataHandle::external(&fieldmap.phasediff))
        .input(tools::MAGNITUDE, DataHandle::external(magnitude))
        .output(tools::MAGNITUDE_BRAIN, "magnitude_brain.nii.gz")
        .output(tools::FIELDMAP_RADS, "fieldmap_rads.nii.gz")
        .output(tools::FIELDMAP_HZ, "fieldmap_hz.nii.gz");
      replace_with(state, |s| s.add(node))?;
      event!(Level::INFO, delta_te_ms, "Configured FIELDMAP correction.");
      Ok((
        DistortionCorrection::Fieldmap {
          pe_dir,
          readout_time,
          delta_te_ms,
        },
        Some((tools::FIELDMAP, DataHandle::step_output("prepare_fieldmap", tools::FIELDMAP_HZ))),
      ))
    }
    DistortionStrategy::None => {
      event!(Level::WARN, "No distortion correction data, configuring eddy-only preprocessing.");
      Ok((DistortionCorrection::None { pe_dir, readout_time }, None))
    }
  }
}

/// Runs a by-value state transition on a `&mut GraphState`.
fn replace_with(state: &mut GraphState, f: impl FnOnce(GraphState) -> DwiResult<GraphState>) -> DwiResult<()> {
  let taken = std::mem::take(state);
  *state = f(taken)?;
  Ok(())
}

/// Phase 2. One response per tissue the recipe's algorithm estimates.
#[instrument(name = "assemble::response", skip_all, fields(algorithm = %ctx.recipe.response_algorithm), err(Display))]
pub fn add_response_estimation(state: GraphState, ctx: &AssemblyContext<'_>) -> DwiResult<GraphState> {
  let algorithm = ctx.recipe.response_algorithm;
  // Tissues are estimated in WM, GM, CSF order.
  let tissues = &Tissue::ALL[..algorithm.tissue_count()];

  let mut node = StepNode::new("dwi2response", ToolInvocation::Response { algorithm })
    .input(tools::IN, state.handle(keys::BIAS_CORRECTED, "dwi2response")?)
    .input(tools::MASK, state.handle(keys::MASK, "dwi2response")?);
  for tissue in tissues {
    node = node.output(tissue.response_port(), format!("{}_response.txt", tissue.label()));
  }

  let mut state = state.add(node)?;
  for tissue in tissues {
    state = state.register(
      keys::response(*tissue),
      DataHandle::step_output("dwi2response", tissue.response_port()),
    );
  }
  Ok(state)
}

/// Phase 3. FOD estimation followed by intensity normalisation over the same tissues.
#[instrument(name = "assemble::fod", skip_all, fields(algorithm = %ctx.recipe.fod_algorithm), err(Display))]
pub fn add_fod_estimation(state: GraphState, ctx: &AssemblyContext<'_>) -> DwiResult<GraphState> {
  let parameters = match ctx.recipe.fod_algorithm {
    FodAlgorithm::Csd => FodParameters::Csd { tissue: Tissue::Wm },
    FodAlgorithm::MsmtCsd => FodParameters::MsmtCsd { tissues: Tissue::ALL },
  };
  let tissues = parameters.tissues().to_vec();
  if tissues.len() != ctx.recipe.normalization_tissues {
    return Err(DwiError::build(
      "mtnormalise",
      format!(
        "{} estimates {} tissue(s) but the recipe normalises {}",
        parameters.algorithm(),
        tissues.len(),
        ctx.recipe.normalization_tissues
      ),
    ));
  }

  let mut fod = StepNode::new("dwi2fod", ToolInvocation::Fod { parameters })
    .input(tools::IN, state.handle(keys::BIAS_CORRECTED, "dwi2fod")?)
    .input(tools::MASK, state.handle(keys::MASK, "dwi2fod")?);
  for tissue in &tissues {
    fod = fod
      .input(tissue.response_port(), state.handle(&keys::response(*tissue), "dwi2fod")?)
      .output(tissue.fod_port(), format!("{}_fod.mif", tissue.label()));
  }
  let mut state = state.add(fod)?;
  for tissue in &tissues {
    state = state.register(keys::fod(*tissue), DataHandle::step_output("dwi2fod", tissue.fod_port()));
  }

  let mut normalise = StepNode::new(
    "mtnormalise",
    ToolInvocation::Normalise {
      tissues: tissues.clone(),
    },
  )
  .input(tools::MASK, state.handle(keys::MASK, "mtnormalise")?);
  for tissue in &tissues {
    normalise = normalise
      .input(tissue.fod_port(), state.handle(&keys::fod(*tissue), "mtnormalise")?)
      .output(tissue.normalised_port(), format!("{}_fod_norm.mif", tissue.label()));
  }
  let mut state = state.add(normalise)?;
  for tissue in &tissues {
    state = state.register(
      keys::normalised_fod(*tissue),
      DataHandle::step_output("mtnormalise", tissue.normalised_port()),
    );
  }
  Ok(state)
}

/// Phase 4. Anatomical priors, whole-brain tracking, SIFT2 and the
/// 1M-streamline selection.
#[instrument(name = "assemble::tractography", skip_all, fields(cutoff = ctx.recipe.fod_cutoff), err(Display))]
pub fn add_tractography(state: GraphState, ctx: &AssemblyContext<'_>) -> DwiResult<GraphState> {
  let state = state
    .add_with(|s| Ok(
      StepNode::new("extract_b0", ToolInvocation::ExtractB0)
        .input(tools::IN, s.handle(keys::BIAS_CORRECTED, "extract_b0")?)
        .output(tools::B0, "b0.mif")
        .output(tools::MEAN_B0, "mean_b0.nii.gz"),
    ))?
    .register(keys::MEAN_B0, DataHandle::step_output("extract_b0", tools::MEAN_B0));

  let state = state
    .add_with(|s| Ok(
      StepNode::new("bet_t1w", ToolInvocation::BrainExtractT1)
        .input(tools::IN, s.handle(keys::T1W, "bet_t1w")?)
        .output(tools::OUT, "t1w_brain.nii.gz")
        .output(tools::MASK, "t1w_brain_mask.nii.gz"),
    ))?
    .register(keys::T1_BRAIN, DataHandle::step_output("bet_t1w", tools::OUT));

  let state = state
    .add_with(|s| Ok(
      StepNode::new("flirt_t1_to_dwi", ToolInvocation::RegisterRigid { dof: 6, cost: "mutualinfo" })
        .input(tools::IN, s.handle(keys::T1_BRAIN, "flirt_t1_to_dwi")?)
        .input(tools::REFERENCE, s.handle(keys::MEAN_B0, "flirt_t1_to_dwi")?)
        .output(tools::OUT, "t1w_in_dwi.nii.gz")
        .output(tools::MATRIX, "t1w_to_dwi.mat"),
    ))?
    .register(keys::T1_IN_DWI, DataHandle::step_output("flirt_t1_to_dwi", tools::OUT));

  let state = state
    .add_with(|s| Ok(
      StepNode::new("5ttgen", ToolInvocation::FiveTissue)
        .input(tools::IN, s.handle(keys::T1_IN_DWI, "5ttgen")?)
        .output(tools::OUT, "5tt.mif"),
    ))?
    .register(keys::FIVE_TT, DataHandle::step_output("5ttgen", tools::OUT));

  let state = state
    .add_with(|s| Ok(
      StepNode::new("5tt2gmwmi", ToolInvocation::GmwmInterface)
        .input(tools::IN, s.handle(keys::FIVE_TT, "5tt2gmwmi")?)
        .output(tools::OUT, "gmwmi.mif"),
    ))?
    .register(keys::GMWMI, DataHandle::step_output("5tt2gmwmi", tools::OUT));

  let wm_fod = state.handle(&keys::normalised_fod(Tissue::Wm), "tckgen")?;
  let state = state
    .add_with(|s| Ok(
      StepNode::new(
        "tckgen",
        ToolInvocation::Track {
          parameters: TrackingParameters::ifod2(ctx.recipe.fod_cutoff),
        },
      )
      .input(tools::FOD, wm_fod.clone())
      .input(tools::ACT, s.handle(keys::FIVE_TT, "tckgen")?)
      .input(tools::SEED, s.handle(keys::GMWMI, "tckgen")?)
      .output(tools::TRACKS, "tracks_10M.tck"),
    ))?
    .register(keys::TRACKS, DataHandle::step_output("tckgen", tools::TRACKS));

  let state = state
    .add_with(|s| Ok(
      StepNode::new("tcksift2", ToolInvocation::Sift2)
        .input(tools::TRACKS, s.handle(keys::TRACKS, "tcksift2")?)
        .input(tools::FOD, wm_fod)
        .input(tools::ACT, s.handle(keys::FIVE_TT, "tcksift2")?)
        .output(tools::WEIGHTS, "sift2_weights.txt"),
    ))?
    .register(keys::SIFT2_WEIGHTS, DataHandle::step_output("tcksift2", tools::WEIGHTS));

  let state = state
    .add_with(|s| Ok(
      StepNode::new("select_1m", ToolInvocation::SelectStreamlines { number: SIFT_SELECTION })
        .input(tools::TRACKS, s.handle(keys::TRACKS, "select_1m")?)
        .input(tools::WEIGHTS, s.handle(keys::SIFT2_WEIGHTS, "select_1m")?)
        .published_output(tools::TRACKS, "sift_1M.tck")
        .published_output(tools::WEIGHTS, "sift_1M_weights.txt"),
    ))?
    .register(keys::SELECTED_TRACKS, DataHandle::step_output("select_1m", tools::TRACKS))
    .register(keys::SELECTED_WEIGHTS, DataHandle::step_output("select_1m", tools::WEIGHTS));
  Ok(state)
}

/// Phase 5. A label conversion and a connectome node per available atlas.
#[instrument(name = "assemble::connectome", skip_all, err(Display))]
pub fn add_connectomes(state: GraphState, ctx: &AssemblyContext<'_>) -> DwiResult<GraphState> {
  let atlases = available_atlases(ctx.layout);
  if atlases.is_empty() {
    event!(Level::WARN, "No parcellation available, no connectome will be generated.");
  }

  let mut state = state;
  for source in atlases {
    let atlas = source.atlas;
    let target_lut = atlas.target_lut();
    let convert_name = format!("labelconvert_{}", atlas.label());
    let connectome_name = format!("tck2connectome_{}", atlas.label());
    let lut_dir = ctx.config.lut_dir();

    state = state
      .add_with(|s| Ok(
        StepNode::new(&convert_name, ToolInvocation::LabelConvert { atlas })
          .input(tools::IN, DataHandle::external(&source.parcellation))
          .input(tools::LUT_IN, DataHandle::external(lut_dir.join(FREESURFER_COLOR_LUT)))
          .input(tools::LUT_OUT, DataHandle::external(lut_dir.join(target_lut)))
          .output(tools::PARCELS, format!("parcels_{}.mif", atlas.label())),
      ))?
      .register(keys::parcels(atlas), DataHandle::step_output(&convert_name, tools::PARCELS));

    state = state
      .add_with(|s| Ok(
        StepNode::new(&connectome_name, ToolInvocation::Connectome { atlas })
          .input(tools::TRACKS, s.handle(keys::SELECTED_TRACKS, &connectome_name)?)
          .input(tools::WEIGHTS, s.handle(keys::SELECTED_WEIGHTS, &connectome_name)?)
          .input(tools::PARCELS, s.handle(&keys::parcels(atlas), &connectome_name)?)
          .published_output(tools::COUNTS, format!("connectome_{}_counts.csv", atlas.label()))
          .published_output(tools::SCALED, format!("connectome_{}_scaled.csv", atlas.label())),
      ))?
      .register(
        keys::connectome(atlas, tools::COUNTS),
        DataHandle::step_output(&connectome_name, tools::COUNTS),
      )
      .register(
        keys::connectome(atlas, tools::SCALED),
        DataHandle::step_output(&connectome_name, tools::SCALED),
      );
    event!(Level::INFO, %atlas, "Connectome generation added.");
  }
  Ok(state)
}

/// Fluent driver over the phase functions.
pub struct WorkflowAssembler<'a> {
  ctx: AssemblyContext<'a>,
  state: DwiResult<GraphState>,
}

impl<'a> WorkflowAssembler<'a> {
  pub fn new(ctx: AssemblyContext<'a>) -> Self {
    Self {
      ctx,
      state: Ok(GraphState::new()),
    }
  }

  fn then(self, phase: fn(GraphState, &AssemblyContext<'_>) -> DwiResult<GraphState>) -> Self {
    let ctx = self.ctx;
    let state = self.state.and_then(|s| phase(s, &ctx));
    Self { ctx, state }
  }

  pub fn preprocessing(self) -> Self {
    self.then(add_preprocessing)
  }

  pub fn response_estimation(self) -> Self {
    self.then(add_response_estimation)
  }

  pub fn fod_estimation(self) -> Self {
    self.then(add_fod_estimation)
  }

  pub fn tractography(self) -> Self {
    self.then(add_tractography)
  }

  pub fn connectomes(self) -> Self {
    self.then(add_connectomes)
  }

  /// Verifies acyclicity and hands back the finished graph.
  pub fn finish(self) -> DwiResult<StepGraph> {
    let graph = self.state?.into_graph();
    let groups = graph.topological_groups()?;
    event!(Level::DEBUG, nodes = graph.len(), groups = groups.len(), "Step graph finalized.");
    Ok(graph)
  }

  /// All five phases in order.
  pub fn assemble(ctx: AssemblyContext<'a>) -> DwiResult<StepGraph> {
    Self::new(ctx)
      .preprocessing()
      .response_estimation()
      .fod_estimation()
      .tractography()
      .connectomes()
      .finish()
  }
}

/// One-paragraph description of what a run will do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
  pub run_id: String,
  pub species: Species,
  pub shell_type: ShellType,
  pub distortion_strategy: DistortionStrategy,
  pub recipe: ProcessingRecipe,
  pub node_count: usize,
  pub atlases: Vec<Atlas>,
  pub external_mask: bool,
}

impl PlanSummary {
  pub fn new(ctx: &AssemblyContext<'_>, graph: &StepGraph) -> Self {
    let atlases = graph
      .nodes()
      .iter()
      .filter_map(|n| match n.tool() {
        ToolInvocation::Connectome { atlas } => Some(*atlas),
        _ => None,
      })
      .collect();
    Self {
      run_id: ctx.config.run_id().to_string(),
      species: ctx.config.species(),
      shell_type: ctx.metadata.shell_type(),
      distortion_strategy: ctx.layout.distortion_strategy(),
      recipe: *ctx.recipe,
      node_count: graph.len(),
      atlases,
      external_mask: ctx.config.mask().is_some(),
    }
  }
}

impl fmt::Display for PlanSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let atlases: Vec<&str> = self.atlases.iter().map(Atlas::label).collect();
    write!(
      f,
      "run {} [{}]: {} / {} correction, recipe {}, {} nodes, connectomes [{}]{}",
      self.run_id,
      self.species,
      self.shell_type,
      self.distortion_strategy,
      self.recipe,
      self.node_count,
      atlases.join(", "),
      if self.external_mask { ", external mask" } else { "" }
    )
  }
}
