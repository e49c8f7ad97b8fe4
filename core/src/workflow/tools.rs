// dwi-connectome/src/workflow/tools.rs

//! External tool invocations and their argv contracts.
//!
//! Every [`ToolInvocation`] declares the input and output ports it binds and
//! renders one or more command lines once those ports are resolved to paths.
//! The tools themselves are black boxes.

use super::atlas::Atlas;
use crate::acquisition::PhaseEncodingDirection;
use crate::error::{DwiError, DwiResult};
use crate::recipe::ResponseAlgorithm;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Builds a `Vec<String>` from heterogeneous string-like arguments.
macro_rules! argv {
  ($($arg:expr),* $(,)?) => {
    vec![$(String::from($arg)),*]
  };
}

pub const IN: &str = "in";
pub const OUT: &str = "out";
pub const MASK: &str = "mask";
pub const BVEC: &str = "bvec";
pub const BVAL: &str = "bval";
pub const NOISE: &str = "noise";
pub const SE_EPI: &str = "se_epi";
pub const REVERSE: &str = "reverse";
pub const REVERSE_BVEC: &str = "reverse_bvec";
pub const REVERSE_BVAL: &str = "reverse_bval";
pub const REVERSE_MIF: &str = "reverse_mif";
pub const B0_PRIMARY: &str = "b0_primary";
pub const B0_REVERSE: &str = "b0_reverse";
pub const PHASEDIFF: &str = "phasediff";
pub const MAGNITUDE: &str = "magnitude";
pub const MAGNITUDE_BRAIN: &str = "magnitude_brain";
pub const FIELDMAP_RADS: &str = "fieldmap_rads";
pub const FIELDMAP_HZ: &str = "fieldmap_hz";
pub const FIELDMAP: &str = "fieldmap";
pub const B0: &str = "b0";
pub const MEAN_B0: &str = "mean_b0";
pub const REFERENCE: &str = "reference";
pub const MATRIX: &str = "matrix";
pub const FOD: &str = "fod";
pub const ACT: &str = "act";
pub const SEED: &str = "seed";
pub const TRACKS: &str = "tracks";
pub const WEIGHTS: &str = "weights";
pub const LUT_IN: &str = "lut_in";
pub const LUT_OUT: &str = "lut_out";
pub const PARCELS: &str = "parcels";
pub const COUNTS: &str = "counts";
pub const SCALED: &str = "scaled";

/// 2π, for converting a fieldmap from rad/s to Hz.
const RADS_PER_HZ: f64 = std::f64::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tissue {
  Wm,
  Gm,
  Csf,
}

impl Tissue {
  pub const ALL: [Tissue; 3] = [Tissue::Wm, Tissue::Gm, Tissue::Csf];

  pub fn label(&self) -> &'static str {
    match self {
      Tissue::Wm => "wm",
      Tissue::Gm => "gm",
      Tissue::Csf => "csf",
    }
  }

  /// Port carrying this tissue's response function.
  pub fn response_port(&self) -> &'static str {
    match self {
      Tissue::Wm => "wm_response",
      Tissue::Gm => "gm_response",
      Tissue::Csf => "csf_response",
    }
  }

  /// Port carrying this tissue's FOD image.
  pub fn fod_port(&self) -> &'static str {
    match self {
      Tissue::Wm => "wm_fod",
      Tissue::Gm => "gm_fod",
      Tissue::Csf => "csf_fod",
    }
  }

  /// Port carrying this tissue's intensity-normalised FOD image.
  pub fn normalised_port(&self) -> &'static str {
    match self {
      Tissue::Wm => "wm_fod_norm",
      Tissue::Gm => "gm_fod_norm",
      Tissue::Csf => "csf_fod_norm",
    }
  }
}

/// Parameters of the single `dwifslpreproc` node, one variant per strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DistortionCorrection {
  /// topup + eddy from a b=0 pair with opposite phase encoding.
  RpePair {
    pe_dir: PhaseEncodingDirection,
    reverse_pe_dir: PhaseEncodingDirection,
    readout_time: f64,
  },
  /// eddy with a prepared off-resonance fieldmap.
  Fieldmap {
    pe_dir: PhaseEncodingDirection,
    readout_time: f64,
    delta_te_ms: f64,
  },
  /// eddy only.
  None {
    pe_dir: PhaseEncodingDirection,
    readout_time: f64,
  },
}

impl DistortionCorrection {
  pub fn pe_dir(&self) -> PhaseEncodingDirection {
    match self {
      DistortionCorrection::RpePair { pe_dir, .. }
      | DistortionCorrection::Fieldmap { pe_dir, .. }
      | DistortionCorrection::None { pe_dir, .. } => *pe_dir,
    }
  }

  pub fn readout_time(&self) -> f64 {
    match self {
      DistortionCorrection::RpePair { readout_time, .. }
      | DistortionCorrection::Fieldmap { readout_time, .. }
      | DistortionCorrection::None { readout_time, .. } => *readout_time,
    }
  }

  /// Both directions, `None` outside the RPE-pair strategy.
  pub fn pe_pair(&self) -> Option<(PhaseEncodingDirection, PhaseEncodingDirection)> {
    match self {
      DistortionCorrection::RpePair {
        pe_dir, reverse_pe_dir, ..
      } => Some((*pe_dir, *reverse_pe_dir)),
      _ => None,
    }
  }
}

/// FOD estimation: one response/output pair, or three.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum FodParameters {
  Csd { tissue: Tissue },
  MsmtCsd { tissues: [Tissue; 3] },
}

impl FodParameters {
  pub fn tissues(&self) -> &[Tissue] {
    match self {
      FodParameters::Csd { tissue } => std::slice::from_ref(tissue),
      FodParameters::MsmtCsd { tissues } => tissues,
    }
  }

  pub fn algorithm(&self) -> &'static str {
    match self {
      FodParameters::Csd { .. } => "csd",
      FodParameters::MsmtCsd { .. } => "msmt_csd",
    }
  }
}

/// Whole-brain anatomically-constrained tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingParameters {
  pub algorithm: &'static str,
  pub select: u64,
  pub cutoff: f64,
  pub backtrack: bool,
  pub crop_at_gmwmi: bool,
}

impl TrackingParameters {
  pub fn ifod2(cutoff: f64) -> Self {
    Self {
      algorithm: "iFOD2",
      select: 10_000_000,
      cutoff,
      backtrack: true,
      crop_at_gmwmi: true,
    }
  }
}

/// One external tool call (or a short fixed sequence of calls).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInvocation {
  ConvertDwi,
  Denoise,
  Degibbs,
  /// Builds the b=0 pair that `-rpe_pair` expects from both series.
  SeEpiPair,
  PrepareFieldmap { delta_te_ms: f64 },
  Preprocess { correction: DistortionCorrection },
  BiasCorrect,
  Mask,
  Response { algorithm: ResponseAlgorithm },
  Fod { parameters: FodParameters },
  Normalise { tissues: Vec<Tissue> },
  ExtractB0,
  BrainExtractT1,
  RegisterRigid { dof: u8, cost: &'static str },
  FiveTissue,
  GmwmInterface,
  Track { parameters: TrackingParameters },
  Sift2,
  SelectStreamlines { number: u64 },
  LabelConvert { atlas: Atlas },
  Connectome { atlas: Atlas },
}

impl ToolInvocation {
  /// Primary program, for logging and summaries.
  pub fn program(&self) -> &'static str {
    match self {
      ToolInvocation::ConvertDwi => "mrconvert",
      ToolInvocation::Denoise => "dwidenoise",
      ToolInvocation::Degibbs => "mrdegibbs",
      ToolInvocation::SeEpiPair => "mrcat",
      ToolInvocation::PrepareFieldmap { .. } => "fsl_prepare_fieldmap",
      ToolInvocation::Preprocess { .. } => "dwifslpreproc",
      ToolInvocation::BiasCorrect => "dwibiascorrect",
      ToolInvocation::Mask => "dwi2mask",
      ToolInvocation::Response { .. } => "dwi2response",
      ToolInvocation::Fod { .. } => "dwi2fod",
      ToolInvocation::Normalise { .. } => "mtnormalise",
      ToolInvocation::ExtractB0 => "dwiextract",
      ToolInvocation::BrainExtractT1 => "bet",
      ToolInvocation::RegisterRigid { .. } => "flirt",
      ToolInvocation::FiveTissue => "5ttgen",
      ToolInvocation::GmwmInterface => "5tt2gmwmi",
      ToolInvocation::Track { .. } => "tckgen",
      ToolInvocation::Sift2 => "tcksift2",
      ToolInvocation::SelectStreamlines { .. } => "tckedit",
      ToolInvocation::LabelConvert { .. } => "labelconvert",
      ToolInvocation::Connectome { .. } => "tck2connectome",
    }
  }

  pub fn input_ports(&self) -> Vec<&'static str> {
    match self {
      ToolInvocation::ConvertDwi => vec![IN, BVEC, BVAL],
      ToolInvocation::SeEpiPair => vec![IN, REVERSE, REVERSE_BVEC, REVERSE_BVAL],
      ToolInvocation::PrepareFieldmap { .. } => vec![PHASEDIFF, MAGNITUDE],
      ToolInvocation::Preprocess { correction } => match correction {
        DistortionCorrection::RpePair { .. } => vec![IN, SE_EPI],
        DistortionCorrection::Fieldmap { .. } => vec![IN, FIELDMAP],
        DistortionCorrection::None { .. } => vec![IN],
      },
      ToolInvocation::Response { .. } => vec![IN, MASK],
      ToolInvocation::Fod { parameters } => {
        let mut ports = vec![IN, MASK];
        ports.extend(parameters.tissues().iter().map(Tissue::response_port));
        ports
      }
      ToolInvocation::Normalise { tissues } => {
        let mut ports = vec![MASK];
        ports.extend(tissues.iter().map(Tissue::fod_port));
        ports
      }
      ToolInvocation::RegisterRigid { .. } => vec![IN, REFERENCE],
      ToolInvocation::Track { .. } => vec![FOD, ACT, SEED],
      ToolInvocation::Sift2 => vec![TRACKS, FOD, ACT],
      ToolInvocation::SelectStreamlines { .. } => vec![TRACKS, WEIGHTS],
      ToolInvocation::LabelConvert { .. } => vec![IN, LUT_IN, LUT_OUT],
      ToolInvocation::Connectome { .. } => vec![TRACKS, WEIGHTS, PARCELS],
      ToolInvocation::Denoise
      | ToolInvocation::Degibbs
      | ToolInvocation::BiasCorrect
      | ToolInvocation::Mask
      | ToolInvocation::ExtractB0
      | ToolInvocation::BrainExtractT1
      | ToolInvocation::FiveTissue
      | ToolInvocation::GmwmInterface => vec![IN],
    }
  }

  pub fn output_ports(&self) -> Vec<&'static str> {
    match self {
      ToolInvocation::Denoise => vec![OUT, NOISE],
      ToolInvocation::SeEpiPair => vec![REVERSE_MIF, B0_PRIMARY, B0_REVERSE, OUT],
      ToolInvocation::PrepareFieldmap { .. } => vec![MAGNITUDE_BRAIN, FIELDMAP_RADS, FIELDMAP_HZ],
      ToolInvocation::Response { algorithm } => match algorithm {
        ResponseAlgorithm::Tournier => vec![Tissue::Wm.response_port()],
        ResponseAlgorithm::Dhollander => Tissue::ALL.iter().map(Tissue::response_port).collect(),
      },
      ToolInvocation::Fod { parameters } => parameters.tissues().iter().map(Tissue::fod_port).collect(),
      ToolInvocation::Normalise { tissues } => tissues.iter().map(Tissue::normalised_port).collect(),
      ToolInvocation::ExtractB0 => vec![B0, MEAN_B0],
      ToolInvocation::BrainExtractT1 => vec![OUT, MASK],
      ToolInvocation::RegisterRigid { .. } => vec![OUT, MATRIX],
      ToolInvocation::Track { .. } => vec![TRACKS],
      ToolInvocation::Sift2 => vec![WEIGHTS],
      ToolInvocation::SelectStreamlines { .. } => vec![TRACKS, WEIGHTS],
      ToolInvocation::LabelConvert { .. } => vec![PARCELS],
      ToolInvocation::Connectome { .. } => vec![COUNTS, SCALED],
      ToolInvocation::ConvertDwi
      | ToolInvocation::Degibbs
      | ToolInvocation::Preprocess { .. }
      | ToolInvocation::BiasCorrect
      | ToolInvocation::Mask
      | ToolInvocation::FiveTissue
      | ToolInvocation::GmwmInterface => vec![OUT],
    }
  }

  /// The output whose presence marks the node as done in a plan script.
  pub fn completion_port(&self) -> &'static str {
    match self {
      ToolInvocation::Connectome { .. } => SCALED,
      ToolInvocation::PrepareFieldmap { .. } => FIELDMAP_HZ,
      ToolInvocation::ExtractB0 => MEAN_B0,
      ToolInvocation::Sift2 => WEIGHTS,
      ToolInvocation::Track { .. } | ToolInvocation::SelectStreamlines { .. } => TRACKS,
      ToolInvocation::LabelConvert { .. } => PARCELS,
      ToolInvocation::Response { .. } => Tissue::Wm.response_port(),
      ToolInvocation::Fod { .. } => Tissue::Wm.fod_port(),
      ToolInvocation::Normalise { .. } => Tissue::Wm.normalised_port(),
      _ => OUT,
    }
  }

  /// Renders the argv of every command this node runs, in order.
  pub fn command_lines(&self, io: &NodeIo<'_>) -> DwiResult<Vec<Vec<String>>> {
    let mrtrix = |mut argv: Vec<String>| {
      argv.extend(["-nthreads".to_string(), io.n_threads.to_string(), "-force".to_string()]);
      argv
    };

    let lines = match self {
      ToolInvocation::ConvertDwi => vec![mrtrix(argv![
        "mrconvert",
        io.input(IN)?,
        io.output(OUT)?,
        "-fslgrad",
        io.input(BVEC)?,
        io.input(BVAL)?
      ])],
      ToolInvocation::Denoise => vec![mrtrix(argv![
        "dwidenoise",
        io.input(IN)?,
        io.output(OUT)?,
        "-noise",
        io.output(NOISE)?
      ])],
      ToolInvocation::Degibbs => vec![mrtrix(argv!["mrdegibbs", io.input(IN)?, io.output(OUT)?])],
      ToolInvocation::SeEpiPair => vec![
        mrtrix(argv![
          "mrconvert",
          io.input(REVERSE)?,
          io.output(REVERSE_MIF)?,
          "-fslgrad",
          io.input(REVERSE_BVEC)?,
          io.input(REVERSE_BVAL)?
        ]),
        mrtrix(argv!["dwiextract", io.input(IN)?, io.output(B0_PRIMARY)?, "-bzero"]),
        mrtrix(argv!["dwiextract", io.output(REVERSE_MIF)?, io.output(B0_REVERSE)?, "-bzero"]),
        mrtrix(argv![
          "mrcat",
          io.output(B0_PRIMARY)?,
          io.output(B0_REVERSE)?,
          io.output(OUT)?,
          "-axis",
          "3"
        ]),
      ],
      ToolInvocation::PrepareFieldmap { delta_te_ms } => vec![
        argv!["bet", io.input(MAGNITUDE)?, io.output(MAGNITUDE_BRAIN)?, "-R"],
        argv![
          "fsl_prepare_fieldmap",
          "SIEMENS",
          io.input(PHASEDIFF)?,
          io.output(MAGNITUDE_BRAIN)?,
          io.output(FIELDMAP_RADS)?,
          fmt_float(*delta_te_ms)
        ],
        argv![
          "fslmaths",
          io.output(FIELDMAP_RADS)?,
          "-div",
          fmt_float(RADS_PER_HZ),
          io.output(FIELDMAP_HZ)?
        ],
      ],
      ToolInvocation::Preprocess { correction } => {
        let mut argv = argv![
          "dwifslpreproc",
          io.input(IN)?,
          io.output(OUT)?,
          "-pe_dir",
          correction.pe_dir().code(),
          "-readout_time",
          fmt_float(correction.readout_time())
        ];
        match correction {
          DistortionCorrection::RpePair { .. } => {
            argv.extend(argv!["-rpe_pair", "-se_epi", io.input(SE_EPI)?, "-align_seepi"]);
          }
          DistortionCorrection::Fieldmap { .. } => {
            let field = io.input(FIELDMAP)?;
            let stem = field.strip_suffix(".nii.gz").unwrap_or(&field);
            argv.extend(argv!["-rpe_none", "-eddy_options", format!(" --field={} ", stem)]);
          }
          DistortionCorrection::None { .. } => argv.push("-rpe_none".to_string()),
        }
        vec![mrtrix(argv)]
      }
      ToolInvocation::BiasCorrect => vec![mrtrix(argv!["dwibiascorrect", "ants", io.input(IN)?, io.output(OUT)?])],
      ToolInvocation::Mask => vec![mrtrix(argv!["dwi2mask", io.input(IN)?, io.output(OUT)?])],
      ToolInvocation::Response { algorithm } => {
        let mut argv = argv!["dwi2response", algorithm.as_str(), io.input(IN)?];
        for port in self.output_ports() {
          argv.push(io.output(port)?);
        }
        argv.extend(argv!["-mask", io.input(MASK)?]);
        vec![mrtrix(argv)]
      }
      ToolInvocation::Fod { parameters } => {
        let mut argv = argv!["dwi2fod", parameters.algorithm(), io.input(IN)?];
        for tissue in parameters.tissues() {
          argv.push(io.input(tissue.response_port())?);
          argv.push(io.output(tissue.fod_port())?);
        }
        argv.extend(argv!["-mask", io.input(MASK)?]);
        vec![mrtrix(argv)]
      }
      ToolInvocation::Normalise { tissues } => {
        let mut argv = argv!["mtnormalise"];
        for tissue in tissues {
          argv.push(io.input(tissue.fod_port())?);
          argv.push(io.output(tissue.normalised_port())?);
        }
        argv.extend(argv!["-mask", io.input(MASK)?]);
        vec![mrtrix(argv)]
      }
      ToolInvocation::ExtractB0 => vec![
        mrtrix(argv!["dwiextract", io.input(IN)?, io.output(B0)?, "-bzero"]),
        mrtrix(argv!["mrmath", io.output(B0)?, "mean", io.output(MEAN_B0)?, "-axis", "3"]),
      ],
      ToolInvocation::BrainExtractT1 => {
        // bet derives the mask name from the output stem.
        vec![argv!["bet", io.input(IN)?, io.output(OUT)?, "-m", "-R"]]
      }
      ToolInvocation::RegisterRigid { dof, cost } => vec![argv![
        "flirt",
        "-in",
        io.input(IN)?,
        "-ref",
        io.input(REFERENCE)?,
        "-out",
        io.output(OUT)?,
        "-omat",
        io.output(MATRIX)?,
        "-dof",
        dof.to_string(),
        "-cost",
        *cost
      ]],
      ToolInvocation::FiveTissue => vec![mrtrix(argv![
        "5ttgen",
        "fsl",
        io.input(IN)?,
        io.output(OUT)?,
        "-premasked"
      ])],
      ToolInvocation::GmwmInterface => vec![mrtrix(argv!["5tt2gmwmi", io.input(IN)?, io.output(OUT)?])],
      ToolInvocation::Track { parameters } => {
        let mut argv = argv![
          "tckgen",
          io.input(FOD)?,
          io.output(TRACKS)?,
          "-algorithm",
          parameters.algorithm,
          "-select",
          parameters.select.to_string(),
          "-act",
          io.input(ACT)?,
          "-seed_gmwmi",
          io.input(SEED)?,
          "-cutoff",
          fmt_float(parameters.cutoff)
        ];
        if parameters.backtrack {
          argv.push("-backtrack".to_string());
        }
        if parameters.crop_at_gmwmi {
          argv.push("-crop_at_gmwmi".to_string());
        }
        vec![mrtrix(argv)]
      }
      ToolInvocation::Sift2 => vec![mrtrix(argv![
        "tcksift2",
        io.input(TRACKS)?,
        io.input(FOD)?,
        io.output(WEIGHTS)?,
        "-act",
        io.input(ACT)?
      ])],
      ToolInvocation::SelectStreamlines { number } => vec![mrtrix(argv![
        "tckedit",
        io.input(TRACKS)?,
        io.output(TRACKS)?,
        "-number",
        number.to_string(),
        "-tck_weights_in",
        io.input(WEIGHTS)?,
        "-tck_weights_out",
        io.output(WEIGHTS)?
      ])],
      ToolInvocation::LabelConvert { .. } => vec![mrtrix(argv![
        "labelconvert",
        io.input(IN)?,
        io.input(LUT_IN)?,
        io.input(LUT_OUT)?,
        io.output(PARCELS)?
      ])],
      ToolInvocation::Connectome { .. } => vec![
        mrtrix(argv![
          "tck2connectome",
          io.input(TRACKS)?,
          io.input(PARCELS)?,
          io.output(COUNTS)?,
          "-symmetric",
          "-zero_diagonal"
        ]),
        mrtrix(argv![
          "tck2connectome",
          io.input(TRACKS)?,
          io.input(PARCELS)?,
          io.output(SCALED)?,
          "-symmetric",
          "-zero_diagonal",
          "-tck_weights_in",
          io.input(WEIGHTS)?
        ]),
      ],
    };
    Ok(lines)
  }
}

fn fmt_float(value: f64) -> String {
  format!("{}", value)
}

/// Port-to-path bindings for one node at render time.
#[derive(Debug, Clone)]
pub struct NodeIo<'a> {
  step: &'a str,
  inputs: BTreeMap<String, PathBuf>,
  outputs: BTreeMap<String, PathBuf>,
  n_threads: usize,
}

impl<'a> NodeIo<'a> {
  pub fn new(
    step: &'a str,
    inputs: BTreeMap<String, PathBuf>,
    outputs: BTreeMap<String, PathBuf>,
    n_threads: usize,
  ) -> Self {
    Self {
      step,
      inputs,
      outputs,
      n_threads,
    }
  }

  pub fn input(&self, port: &str) -> DwiResult<String> {
    self.lookup(&self.inputs, port, "input")
  }

  pub fn output(&self, port: &str) -> DwiResult<String> {
    self.lookup(&self.outputs, port, "output")
  }

  pub fn output_paths(&self) -> impl Iterator<Item = &Path> {
    self.outputs.values().map(PathBuf::as_path)
  }

  fn lookup(&self, ports: &BTreeMap<String, PathBuf>, port: &str, direction: &str) -> DwiResult<String> {
    ports
      .get(port)
      .map(|p| p.to_string_lossy().into_owned())
      .ok_or_else(|| DwiError::build(self.step, format!("{} port '{}' is not bound", direction, port)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn io_for(tool: &ToolInvocation) -> NodeIo<'static> {
    let inputs = tool
      .input_ports()
      .into_iter()
      .map(|p| (p.to_string(), PathBuf::from(format!("/in/{}.mif", p))))
      .collect();
    let outputs = tool
      .output_ports()
      .into_iter()
      .map(|p| (p.to_string(), PathBuf::from(format!("/out/{}.mif", p))))
      .collect();
    NodeIo::new("node", inputs, outputs, 4)
  }

  fn pe(code: &str) -> PhaseEncodingDirection {
    code.parse().unwrap()
  }

  #[test]
  fn rpe_pair_renders_se_epi() {
    let tool = ToolInvocation::Preprocess {
      correction: DistortionCorrection::RpePair {
        pe_dir: pe("j-"),
        reverse_pe_dir: pe("j"),
        readout_time: 0.0936,
      },
    };
    let lines = tool.command_lines(&io_for(&tool)).unwrap();
    assert_eq!(lines.len(), 1);
    let argv = &lines[0];
    assert_eq!(argv[0], "dwifslpreproc");
    assert!(argv.windows(2).any(|w| w == ["-pe_dir", "j-"]));
    assert!(argv.windows(2).any(|w| w == ["-readout_time", "0.0936"]));
    assert!(argv.windows(3).any(|w| w == ["-rpe_pair", "-se_epi", "/in/se_epi.mif"]));
    assert!(argv.windows(2).any(|w| w == ["-nthreads", "4"]));
  }

  #[test]
  fn none_strategy_has_no_reverse_arguments() {
    let tool = ToolInvocation::Preprocess {
      correction: DistortionCorrection::None {
        pe_dir: pe("j"),
        readout_time: 0.05,
      },
    };
    assert_eq!(tool.input_ports(), vec![IN]);
    let argv = &tool.command_lines(&io_for(&tool)).unwrap()[0];
    assert!(argv.contains(&"-rpe_none".to_string()));
    assert!(!argv.iter().any(|a| a == "-se_epi" || a == "-rpe_pair"));
  }

  #[test]
  fn msmt_fod_pairs_each_tissue() {
    let tool = ToolInvocation::Fod {
      parameters: FodParameters::MsmtCsd { tissues: Tissue::ALL },
    };
    let argv = &tool.command_lines(&io_for(&tool)).unwrap()[0];
    let expected: Vec<String> = [
      "dwi2fod",
      "msmt_csd",
      "/in/in.mif",
      "/in/wm_response.mif",
      "/out/wm_fod.mif",
      "/in/gm_response.mif",
      "/out/gm_fod.mif",
      "/in/csf_response.mif",
      "/out/csf_fod.mif",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(&argv[..expected.len()], &expected[..]);
  }

  #[test]
  fn connectome_renders_counts_and_weighted() {
    let tool = ToolInvocation::Connectome {
      atlas: Atlas::DesikanKilliany,
    };
    let lines = tool.command_lines(&io_for(&tool)).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(!lines[0].contains(&"-tck_weights_in".to_string()));
    assert!(lines[1].windows(2).any(|w| w == ["-tck_weights_in", "/in/weights.mif"]));
  }

  #[test]
  fn unbound_port_is_a_build_error() {
    let tool = ToolInvocation::Degibbs;
    let io = NodeIo::new("degibbs", BTreeMap::new(), BTreeMap::new(), 1);
    let err = tool.command_lines(&io).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::WorkflowBuild);
  }
}
