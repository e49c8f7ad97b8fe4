// dwi-connectome/src/config.rs

//! Run parameters and the validated, derived `ProcessingConfig`.

use crate::acquisition::Species;
use crate::error::{DwiError, DwiResult};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const MAX_THREADS: usize = 32;
pub const DEFAULT_THREADS: usize = 4;

/// Install locations searched for MRtrix3 label-conversion tables when
/// `MRTRIX_LUTS` is not set.
pub const COMMON_LUT_DIRS: &[&str] = &[
  "/usr/share/mrtrix3/labelconvert",
  "/usr/local/share/mrtrix3/labelconvert",
  "/opt/mrtrix3/share/mrtrix3/labelconvert",
];

fn default_threads() -> usize {
  DEFAULT_THREADS
}

/// Primary, user-supplied fields. Nothing here is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
  pub subject: String,
  #[serde(default)]
  pub session: Option<String>,
  pub bids_dir: PathBuf,
  pub freesurfer_dir: PathBuf,
  pub output_dir: PathBuf,
  pub work_dir: PathBuf,
  #[serde(default = "default_threads")]
  pub n_threads: usize,
  #[serde(default)]
  pub species: Species,
  #[serde(default)]
  pub rerun: bool,
  #[serde(default)]
  pub dry_run: bool,
  #[serde(default)]
  pub mask: Option<PathBuf>,
  #[serde(default)]
  pub lut_dir: Option<PathBuf>,
}

impl RunParameters {
  pub fn new(
    subject: impl Into<String>,
    bids_dir: impl Into<PathBuf>,
    freesurfer_dir: impl Into<PathBuf>,
    output_dir: impl Into<PathBuf>,
    work_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      subject: subject.into(),
      session: None,
      bids_dir: bids_dir.into(),
      freesurfer_dir: freesurfer_dir.into(),
      output_dir: output_dir.into(),
      work_dir: work_dir.into(),
      n_threads: DEFAULT_THREADS,
      species: Species::default(),
      rerun: false,
      dry_run: false,
      mask: None,
      lut_dir: None,
    }
  }

  /// Reads `DWI_*` variables, loading `.env` first if present.
  pub fn from_env() -> DwiResult<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| env::var(var_name).ok().filter(|v| !v.trim().is_empty());
    let subject = get_env("DWI_SUBJECT")
      .ok_or_else(|| DwiError::configuration("DWI_SUBJECT", "missing environment variable"))?;
    let n_threads = match get_env("DWI_N_THREADS") {
      Some(raw) => raw
        .trim()
        .parse::<usize>()
        .map_err(|e| DwiError::configuration("DWI_N_THREADS", format!("invalid value '{}': {}", raw, e)))?,
      None => DEFAULT_THREADS,
    };
    let species = match get_env("DWI_SPECIES") {
      Some(raw) => raw.parse::<Species>()?,
      None => Species::default(),
    };

    let params = Self {
      subject,
      session: get_env("DWI_SESSION"),
      bids_dir: get_env("DWI_BIDS_DIR").unwrap_or_else(|| "/data".into()).into(),
      freesurfer_dir: get_env("DWI_FREESURFER_DIR").unwrap_or_else(|| "/freesurfer".into()).into(),
      output_dir: get_env("DWI_OUTPUT_DIR").unwrap_or_else(|| "/out".into()).into(),
      work_dir: get_env("DWI_WORK_DIR").unwrap_or_else(|| "/tmp/work".into()).into(),
      n_threads,
      species,
      rerun: parse_flag("DWI_RERUN", get_env("DWI_RERUN"))?,
      dry_run: parse_flag("DWI_DRY_RUN", get_env("DWI_DRY_RUN"))?,
      mask: get_env("DWI_MASK").map(PathBuf::from),
      lut_dir: get_env("MRTRIX_LUTS").map(PathBuf::from),
    };
    tracing::info!(subject = %params.subject, "Run parameters loaded from environment.");
    Ok(params)
  }
}

fn parse_flag(name: &str, raw: Option<String>) -> DwiResult<bool> {
  match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
    None => Ok(false),
    Some(v) => match v.as_str() {
      "1" | "true" | "yes" | "on" => Ok(true),
      "0" | "false" | "no" | "off" => Ok(false),
      _ => Err(DwiError::configuration(name, format!("'{}' is not a boolean", v))),
    },
  }
}

/// Validated configuration for one run. Derived fields are computed once in
/// [`ProcessingConfig::new`] and have no setters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingConfig {
  subject: String,
  session: Option<String>,
  bids_dir: PathBuf,
  freesurfer_dir: PathBuf,
  output_dir: PathBuf,
  work_dir: PathBuf,
  n_threads: usize,
  species: Species,
  rerun: bool,
  dry_run: bool,
  mask: Option<PathBuf>,
  lut_dir: PathBuf,

  run_id: String,
  graph_work_dir: PathBuf,
  subject_output_dir: PathBuf,
}

impl ProcessingConfig {
  pub fn new(params: RunParameters) -> DwiResult<Self> {
    let subject = strip_label(&params.subject, "sub-");
    if subject.is_empty() {
      return Err(DwiError::configuration("subject", "subject label is empty"));
    }
    let session = params
      .session
      .as_deref()
      .map(|s| strip_label(s, "ses-"))
      .filter(|s| !s.is_empty());

    if !(1..=MAX_THREADS).contains(&params.n_threads) {
      return Err(DwiError::configuration(
        "n_threads",
        format!("{} is outside 1..={}", params.n_threads, MAX_THREADS),
      ));
    }
    for (name, dir) in [("output_dir", &params.output_dir), ("work_dir", &params.work_dir)] {
      if !dir.is_absolute() {
        return Err(DwiError::configuration(name, format!("{} must be an absolute path", dir.display())));
      }
    }
    if params.rerun && params.output_dir == params.work_dir {
      return Err(DwiError::configuration(
        "rerun",
        "output_dir and work_dir must differ when rerun clears cached work",
      ));
    }
    if let Some(mask) = &params.mask {
      if !mask.is_file() {
        return Err(DwiError::configuration("mask", format!("{} is not a file", mask.display())));
      }
    }

    let run_id = match &session {
      Some(ses) => format!("{}_{}", subject, ses),
      None => subject.clone(),
    };
    let graph_work_dir = params.work_dir.join(format!("graph_work_{}", run_id));
    let mut subject_output_dir = params.output_dir.join(format!("sub-{}", subject));
    if let Some(ses) = &session {
      subject_output_dir = subject_output_dir.join(format!("ses-{}", ses));
    }
    let lut_dir = resolve_lut_dir(params.lut_dir.as_deref());

    Ok(Self {
      subject,
      session,
      bids_dir: params.bids_dir,
      freesurfer_dir: params.freesurfer_dir,
      output_dir: params.output_dir,
      work_dir: params.work_dir,
      n_threads: params.n_threads,
      species: params.species,
      rerun: params.rerun,
      dry_run: params.dry_run,
      mask: params.mask,
      lut_dir,
      run_id,
      graph_work_dir,
      subject_output_dir,
    })
  }

  pub fn subject(&self) -> &str {
    &self.subject
  }

  pub fn session(&self) -> Option<&str> {
    self.session.as_deref()
  }

  pub fn bids_dir(&self) -> &Path {
    &self.bids_dir
  }

  pub fn freesurfer_dir(&self) -> &Path {
    &self.freesurfer_dir
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  pub fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  pub fn n_threads(&self) -> usize {
    self.n_threads
  }

  pub fn species(&self) -> Species {
    self.species
  }

  pub fn rerun(&self) -> bool {
    self.rerun
  }

  pub fn dry_run(&self) -> bool {
    self.dry_run
  }

  pub fn mask(&self) -> Option<&Path> {
    self.mask.as_deref()
  }

  pub fn lut_dir(&self) -> &Path {
    &self.lut_dir
  }

  /// `<subject>` or `<subject>_<session>`.
  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  /// `<work>/graph_work_<run_id>`.
  pub fn graph_work_dir(&self) -> &Path {
    &self.graph_work_dir
  }

  /// `<output>/sub-<subject>[/ses-<session>]`.
  pub fn subject_output_dir(&self) -> &Path {
    &self.subject_output_dir
  }

  pub fn script_path(&self) -> PathBuf {
    self.output_dir.join(format!("{}_pipeline.sh", self.run_id))
  }

  /// Fails when the LUT directory is needed but not present.
  pub fn require_lut_dir(&self) -> DwiResult<&Path> {
    if self.lut_dir.is_dir() {
      Ok(&self.lut_dir)
    } else {
      Err(DwiError::configuration(
        "lut_dir",
        format!(
          "MRtrix3 label-conversion tables not found at {}; set MRTRIX_LUTS",
          self.lut_dir.display()
        ),
      ))
    }
  }
}

fn strip_label(raw: &str, prefix: &str) -> String {
  let trimmed = raw.trim();
  trimmed.strip_prefix(prefix).unwrap_or(trimmed).to_string()
}

/// Explicit directory, then the first common install location that exists,
/// then the first common location as a default.
pub fn resolve_lut_dir(explicit: Option<&Path>) -> PathBuf {
  if let Some(dir) = explicit.filter(|d| d.is_dir()) {
    return dir.to_path_buf();
  }
  if let Some(dir) = explicit {
    tracing::warn!(lut_dir = %dir.display(), "Configured LUT directory does not exist, searching common locations.");
  }
  COMMON_LUT_DIRS
    .iter()
    .map(PathBuf::from)
    .find(|d| d.is_dir())
    .unwrap_or_else(|| PathBuf::from(COMMON_LUT_DIRS[0]))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  fn params() -> RunParameters {
    RunParameters::new("sub-01", "/data", "/freesurfer", "/out", "/tmp/work")
  }

  #[test]
  fn derived_fields_without_session() {
    let config = ProcessingConfig::new(params()).unwrap();
    assert_eq!(config.subject(), "01");
    assert_eq!(config.run_id(), "01");
    assert_eq!(config.graph_work_dir(), Path::new("/tmp/work/graph_work_01"));
    assert_eq!(config.subject_output_dir(), Path::new("/out/sub-01"));
    assert_eq!(config.script_path(), Path::new("/out/01_pipeline.sh"));
    assert_eq!(config.n_threads(), 4);
  }

  #[test]
  fn derived_fields_with_session() {
    let mut p = params();
    p.session = Some("ses-pre".into());
    let config = ProcessingConfig::new(p).unwrap();
    assert_eq!(config.run_id(), "01_pre");
    assert_eq!(config.graph_work_dir(), Path::new("/tmp/work/graph_work_01_pre"));
    assert_eq!(config.subject_output_dir(), Path::new("/out/sub-01/ses-pre"));
  }

  #[test]
  fn validation_failures() {
    let cases: Vec<Box<dyn Fn(&mut RunParameters)>> = vec![
      Box::new(|p: &mut RunParameters| p.n_threads = 0),
      Box::new(|p: &mut RunParameters| p.n_threads = 33),
      Box::new(|p: &mut RunParameters| p.output_dir = "relative/out".into()),
      Box::new(|p: &mut RunParameters| p.work_dir = "work".into()),
      Box::new(|p: &mut RunParameters| {
        p.rerun = true;
        p.work_dir = p.output_dir.clone();
      }),
      Box::new(|p: &mut RunParameters| p.mask = Some("/definitely/not/here/mask.nii.gz".into())),
      Box::new(|p: &mut RunParameters| p.subject = "sub-".into()),
    ];
    for mutate in cases {
      let mut p = params();
      mutate(&mut p);
      let err = ProcessingConfig::new(p).unwrap_err();
      assert_eq!(err.kind(), ErrorKind::Configuration);
    }
  }

  #[test]
  fn deserializes_with_defaults() {
    let p: RunParameters = serde_json::from_str(
      r#"{"subject":"02","bids_dir":"/d","freesurfer_dir":"/f","output_dir":"/o","work_dir":"/w","species":"nhp"}"#,
    )
    .unwrap();
    assert_eq!(p.n_threads, DEFAULT_THREADS);
    assert_eq!(p.species, Species::Nhp);
    assert!(!p.rerun);
  }

  #[test]
  fn explicit_lut_dir_wins_when_present() {
    let tmp = tempfile::tempdir().unwrap();
    assert_eq!(resolve_lut_dir(Some(tmp.path())), tmp.path());
  }

  #[test]
  fn flags() {
    assert!(parse_flag("X", Some("TRUE".into())).unwrap());
    assert!(!parse_flag("X", None).unwrap());
    assert!(parse_flag("X", Some("maybe".into())).is_err());
  }
}
