// dwi-connectome/src/acquisition/metadata.rs

//! Sidecar parsing and the derived acquisition parameters.
//!
//! The `extract_*` functions are pure functions of a [`SidecarRecord`]; only
//! [`SidecarRecord::from_path`], [`read_bvals`] and [`AcquisitionMetadata::load`]
//! touch the filesystem.

use super::detect::ShellDetection;
use super::enums::{DistortionStrategy, ShellType};
use super::layout::AcquisitionLayout;
use crate::error::{DwiError, DwiResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{event, instrument, Level};

/// The subset of a BIDS JSON sidecar the pipeline reads. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SidecarRecord {
  #[serde(default)]
  pub phase_encoding_direction: Option<String>,
  #[serde(default)]
  pub in_plane_phase_encoding_direction: Option<String>,
  #[serde(default)]
  pub total_readout_time: Option<f64>,
  #[serde(default)]
  pub effective_echo_spacing: Option<f64>,
  /// Some scanners write this as `240.0`, so it is read as a float.
  #[serde(default, rename = "ReconMatrixPE")]
  pub recon_matrix_pe: Option<f64>,
  #[serde(default)]
  pub echo_time1: Option<f64>,
  #[serde(default)]
  pub echo_time2: Option<f64>,

  /// Where the record came from, for error reporting.
  #[serde(skip)]
  pub origin: Option<PathBuf>,
}

impl SidecarRecord {
  pub fn from_path(path: &Path) -> DwiResult<Self> {
    let text = std::fs::read_to_string(path).map_err(|e| DwiError::io(path, e))?;
    let mut record: SidecarRecord = serde_json::from_str(&text).map_err(|source| DwiError::Json {
      path: path.to_path_buf(),
      source,
    })?;
    record.origin = Some(path.to_path_buf());
    Ok(record)
  }

  fn origin_name(&self) -> String {
    self
      .origin
      .as_ref()
      .map(|p| p.display().to_string())
      .unwrap_or_else(|| "sidecar record".to_string())
  }
}

/// Voxel axis along which the phase is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseAxis {
  I,
  J,
  K,
}

/// A phase-encoding direction in BIDS notation (`i`, `j`, `k`, optionally negated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseEncodingDirection {
  pub axis: PhaseAxis,
  pub negative: bool,
}

impl PhaseEncodingDirection {
  /// The same axis with the opposite polarity.
  pub fn reversed(self) -> Self {
    Self {
      axis: self.axis,
      negative: !self.negative,
    }
  }

  pub fn code(&self) -> &'static str {
    match (self.axis, self.negative) {
      (PhaseAxis::I, false) => "i",
      (PhaseAxis::J, false) => "j",
      (PhaseAxis::K, false) => "k",
      (PhaseAxis::I, true) => "i-",
      (PhaseAxis::J, true) => "j-",
      (PhaseAxis::K, true) => "k-",
    }
  }
}

impl fmt::Display for PhaseEncodingDirection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

impl FromStr for PhaseEncodingDirection {
  type Err = DwiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (axis_code, negative) = match s.strip_suffix('-') {
      Some(stripped) => (stripped, true),
      None => (s, false),
    };
    let axis = match axis_code {
      "i" => PhaseAxis::I,
      "j" => PhaseAxis::J,
      "k" => PhaseAxis::K,
      _ => {
        return Err(DwiError::bids(
          format!("invalid PhaseEncodingDirection '{}'", s),
          vec![format!(
            "PhaseEncodingDirection '{}' is not one of i, j, k, i-, j-, k-",
            s
          )],
        ))
      }
    };
    Ok(Self { axis, negative })
  }
}

/// Direct code first, then the in-plane `ROW`/`COL` hint. A blank code
/// counts as absent.
pub fn extract_phase_encoding_direction(record: &SidecarRecord) -> DwiResult<PhaseEncodingDirection> {
  let code = record
    .phase_encoding_direction
    .as_deref()
    .map(str::trim)
    .filter(|c| !c.is_empty());
  if let Some(code) = code {
    return code.parse();
  }
  match record.in_plane_phase_encoding_direction.as_deref().map(str::trim) {
    Some("ROW") => Ok(PhaseEncodingDirection {
      axis: PhaseAxis::J,
      negative: false,
    }),
    Some("COL") => Ok(PhaseEncodingDirection {
      axis: PhaseAxis::I,
      negative: false,
    }),
    Some(other) => Err(DwiError::bids(
      format!("invalid InPlanePhaseEncodingDirection '{}'", other),
      vec![format!(
        "InPlanePhaseEncodingDirection '{}' in {} is neither ROW nor COL",
        other,
        record.origin_name()
      )],
    )),
    None => Err(DwiError::missing_metadata(
      record.origin_name(),
      ["PhaseEncodingDirection", "InPlanePhaseEncodingDirection"],
    )),
  }
}

/// `ReconMatrixPE` as a whole number of lines.
fn recon_matrix_size(raw: f64, record: &SidecarRecord) -> DwiResult<u32> {
  if raw.is_finite() && raw.fract() == 0.0 && raw >= 1.0 && raw <= f64::from(u32::MAX) {
    Ok(raw as u32)
  } else {
    Err(DwiError::bids(
      "invalid ReconMatrixPE",
      vec![format!("ReconMatrixPE {} in {} is not a positive whole number", raw, record.origin_name())],
    ))
  }
}

/// `TotalReadoutTime`, or `EffectiveEchoSpacing * (ReconMatrixPE - 1)`. Seconds.
pub fn extract_total_readout_time(record: &SidecarRecord) -> DwiResult<f64> {
  let readout = match (record.total_readout_time, record.effective_echo_spacing, record.recon_matrix_pe) {
    (Some(trt), _, _) => trt,
    (None, Some(spacing), Some(matrix)) => {
      let matrix = recon_matrix_size(matrix, record)?;
      let derived = spacing * (f64::from(matrix) - 1.0);
      event!(Level::DEBUG, spacing, matrix, derived, "Derived total readout time from echo spacing.");
      derived
    }
    (None, spacing, matrix) => {
      let mut fields = vec!["TotalReadoutTime"];
      if spacing.is_none() {
        fields.push("EffectiveEchoSpacing");
      }
      if matrix.is_none() {
        fields.push("ReconMatrixPE");
      }
      return Err(DwiError::missing_metadata(record.origin_name(), fields));
    }
  };

  if !readout.is_finite() || readout <= 0.0 {
    return Err(DwiError::bids(
      "non-positive total readout time",
      vec![format!("Total readout time {} from {} must be positive", readout, record.origin_name())],
    ));
  }
  Ok(readout)
}

/// Echo-time difference of a phase-difference fieldmap, in the sidecar's units.
pub fn extract_delta_te(record: &SidecarRecord) -> DwiResult<f64> {
  let (te1, te2) = match (record.echo_time1, record.echo_time2) {
    (Some(te1), Some(te2)) => (te1, te2),
    (te1, te2) => {
      let missing = [("EchoTime1", te1), ("EchoTime2", te2)]
        .into_iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| name);
      return Err(DwiError::missing_metadata(record.origin_name(), missing));
    }
  };

  let delta = (te2 - te1).abs();
  if !delta.is_finite() || delta <= 0.0 {
    return Err(DwiError::bids(
      "non-positive echo-time difference",
      vec![format!(
        "EchoTime1 {} and EchoTime2 {} in {} give no usable difference",
        te1,
        te2,
        record.origin_name()
      )],
    ));
  }
  Ok(delta)
}

/// Whitespace-separated b-values, as found in a `.bval` file.
pub fn parse_bvals(text: &str, origin: &Path) -> DwiResult<Vec<f64>> {
  let mut values = Vec::new();
  let mut problems = Vec::new();
  for (idx, token) in text.split_whitespace().enumerate() {
    match token.parse::<f64>() {
      Ok(v) if v.is_finite() => values.push(v),
      _ => problems.push(format!("Token {} ('{}') in {} is not a b-value", idx, token, origin.display())),
    }
  }
  if !problems.is_empty() {
    return Err(DwiError::bids(format!("malformed b-value file {}", origin.display()), problems));
  }
  Ok(values)
}

pub fn read_bvals(path: &Path) -> DwiResult<Vec<f64>> {
  let text = std::fs::read_to_string(path).map_err(|e| DwiError::io(path, e))?;
  parse_bvals(&text, path)
}

/// Acquisition parameters for one subject/session.
///
/// Shell type is computed from the b-values at construction and has no setter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionMetadata {
  bvals: Vec<f64>,
  shells: Vec<f64>,
  shell_type: ShellType,
  pe_direction: PhaseEncodingDirection,
  reverse_pe_direction: Option<PhaseEncodingDirection>,
  total_readout_time: f64,
  delta_te: Option<f64>,
}

impl AcquisitionMetadata {
  pub fn new(
    bvals: Vec<f64>,
    pe_direction: PhaseEncodingDirection,
    total_readout_time: f64,
    detection: ShellDetection,
  ) -> DwiResult<Self> {
    let shell_type = detection.classify(&bvals)?;
    let shells = detection.unique_shells(&bvals);
    Ok(Self {
      bvals,
      shells,
      shell_type,
      pe_direction,
      reverse_pe_direction: None,
      total_readout_time,
      delta_te: None,
    })
  }

  pub fn with_reverse_pe_direction(mut self, reverse: PhaseEncodingDirection) -> Self {
    self.reverse_pe_direction = Some(reverse);
    self
  }

  pub fn with_delta_te(mut self, delta_te: f64) -> Self {
    self.delta_te = Some(delta_te);
    self
  }

  /// Reads the primary sidecar and b-values, plus whatever the layout's
  /// distortion strategy needs (reverse sidecar or fieldmap echo times).
  #[instrument(name = "AcquisitionMetadata::load", skip_all, fields(strategy = %layout.distortion_strategy()), err(Display))]
  pub fn load(layout: &AcquisitionLayout, detection: ShellDetection) -> DwiResult<Self> {
    let primary = layout.primary_dwi();
    let record = SidecarRecord::from_path(&primary.sidecar)?;
    let bvals = read_bvals(&primary.bval)?;
    let pe_direction = extract_phase_encoding_direction(&record)?;
    let readout = extract_total_readout_time(&record)?;
    let mut metadata = Self::new(bvals, pe_direction, readout, detection)?;

    match layout.distortion_strategy() {
      DistortionStrategy::RpePair => {
        let reverse = match layout.reverse_dwi() {
          Some(series) if series.sidecar.is_file() => {
            extract_phase_encoding_direction(&SidecarRecord::from_path(&series.sidecar)?)?
          }
          _ => {
            event!(Level::DEBUG, "Reverse series has no sidecar, assuming the opposite polarity.");
            pe_direction.reversed()
          }
        };
        metadata = metadata.with_reverse_pe_direction(reverse);
      }
      DistortionStrategy::Fieldmap => {
        if let Some(fmap) = layout.fieldmap() {
          let fmap_record = SidecarRecord::from_path(&fmap.phasediff_sidecar)?;
          metadata = metadata.with_delta_te(extract_delta_te(&fmap_record)?);
        }
      }
      DistortionStrategy::None => {}
    }

    event!(
      Level::INFO,
      shell_type = %metadata.shell_type,
      shells = ?metadata.shells,
      pe_dir = %metadata.pe_direction,
      readout = metadata.total_readout_time,
      "Acquisition metadata extracted."
    );
    Ok(metadata)
  }

  pub fn bvals(&self) -> &[f64] {
    &self.bvals
  }

  /// Sorted unique rounded diffusion-weighted shells.
  pub fn shells(&self) -> &[f64] {
    &self.shells
  }

  pub fn shell_type(&self) -> ShellType {
    self.shell_type
  }

  pub fn pe_direction(&self) -> PhaseEncodingDirection {
    self.pe_direction
  }

  pub fn reverse_pe_direction(&self) -> Option<PhaseEncodingDirection> {
    self.reverse_pe_direction
  }

  pub fn total_readout_time(&self) -> f64 {
    self.total_readout_time
  }

  pub fn delta_te(&self) -> Option<f64> {
    self.delta_te
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  fn record(json: &str) -> SidecarRecord {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn readout_time_direct() {
    let trt = extract_total_readout_time(&record(r#"{"TotalReadoutTime":0.0936}"#)).unwrap();
    assert!((trt - 0.0936).abs() < 1e-12);
  }

  #[test]
  fn readout_time_from_echo_spacing() {
    let trt = extract_total_readout_time(&record(r#"{"EffectiveEchoSpacing":0.00039,"ReconMatrixPE":240}"#)).unwrap();
    assert!((trt - 0.09321).abs() < 1e-9);
  }

  #[test]
  fn float_matrix_size_is_accepted() {
    let trt = extract_total_readout_time(&record(r#"{"EffectiveEchoSpacing":0.00039,"ReconMatrixPE":240.0}"#)).unwrap();
    assert!((trt - 0.09321).abs() < 1e-9);

    for bad in ["240.5", "-3", "0"] {
      let json = format!(r#"{{"EffectiveEchoSpacing":0.00039,"ReconMatrixPE":{}}}"#, bad);
      let err = extract_total_readout_time(&record(&json)).unwrap_err();
      assert_eq!(err.kind(), ErrorKind::BidsValidation, "ReconMatrixPE {}", bad);
    }
  }

  #[test]
  fn readout_time_missing_or_invalid() {
    let err = extract_total_readout_time(&record(r#"{"EffectiveEchoSpacing":0.00039}"#)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    match err {
      DwiError::MissingMetadata { fields, .. } => assert!(fields.contains(&"ReconMatrixPE".to_string())),
      other => panic!("unexpected {other:?}"),
    }

    let err = extract_total_readout_time(&record(r#"{"TotalReadoutTime":-1.0}"#)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BidsValidation);

    let err = extract_total_readout_time(&record(r#"{"EffectiveEchoSpacing":0.0005,"ReconMatrixPE":1}"#)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BidsValidation);
  }

  #[test]
  fn phase_encoding_codes() {
    assert_eq!(
      extract_phase_encoding_direction(&record(r#"{"PhaseEncodingDirection":"j-"}"#))
        .unwrap()
        .code(),
      "j-"
    );
    assert_eq!(
      extract_phase_encoding_direction(&record(r#"{"InPlanePhaseEncodingDirection":"ROW"}"#))
        .unwrap()
        .code(),
      "j"
    );
    assert_eq!(
      extract_phase_encoding_direction(&record(r#"{"InPlanePhaseEncodingDirection":"COL"}"#))
        .unwrap()
        .code(),
      "i"
    );
    let err = extract_phase_encoding_direction(&record("{}")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    assert_eq!(
      extract_phase_encoding_direction(&record(r#"{"PhaseEncodingDirection":" ","InPlanePhaseEncodingDirection":"COL"}"#))
        .unwrap()
        .code(),
      "i"
    );
    let err = extract_phase_encoding_direction(&record(r#"{"PhaseEncodingDirection":""}"#)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    let err = extract_phase_encoding_direction(&record(r#"{"PhaseEncodingDirection":"y"}"#)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BidsValidation);
  }

  #[test]
  fn direction_reversal() {
    let j: PhaseEncodingDirection = "j".parse().unwrap();
    assert_eq!(j.reversed().code(), "j-");
    assert_eq!(j.reversed().reversed(), j);
  }

  #[test]
  fn delta_te() {
    let d = extract_delta_te(&record(r#"{"EchoTime1":0.00492,"EchoTime2":0.00738}"#)).unwrap();
    assert!((d - 0.00246).abs() < 1e-12);
    let swapped = extract_delta_te(&record(r#"{"EchoTime1":0.00738,"EchoTime2":0.00492}"#)).unwrap();
    assert!((swapped - d).abs() < 1e-12);

    let err = extract_delta_te(&record(r#"{"EchoTime1":0.00492}"#)).unwrap_err();
    match err {
      DwiError::MissingMetadata { fields, .. } => assert_eq!(fields, vec!["EchoTime2".to_string()]),
      other => panic!("unexpected {other:?}"),
    }
    let err = extract_delta_te(&record(r#"{"EchoTime1":0.005,"EchoTime2":0.005}"#)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BidsValidation);
  }

  #[test]
  fn bval_parsing() {
    let origin = Path::new("dwi.bval");
    assert_eq!(parse_bvals("0 1000\n 1000  2000\n", origin).unwrap(), vec![0.0, 1000.0, 1000.0, 2000.0]);
    let err = parse_bvals("0 1000 abc", origin).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BidsValidation);
    assert_eq!(err.detail_lines().len(), 1);
  }

  #[test]
  fn metadata_computes_shell_type_once() {
    let pe: PhaseEncodingDirection = "j-".parse().unwrap();
    let meta = AcquisitionMetadata::new(vec![0.0, 995.0, 1998.0], pe, 0.05, ShellDetection::default()).unwrap();
    assert_eq!(meta.shell_type(), ShellType::MultiShell);
    assert_eq!(meta.shells(), &[1000.0, 2000.0]);

    let err = AcquisitionMetadata::new(vec![0.0, 0.0], pe, 0.05, ShellDetection::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingMetadata);
  }
}
