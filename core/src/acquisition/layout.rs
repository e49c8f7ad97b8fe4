// dwi-connectome/src/acquisition/layout.rs

//! Input files discovered for one subject/session, and the collaborator that
//! discovers them.

use super::detect::{detect_distortion_strategy, FileAvailability};
use super::enums::DistortionStrategy;
use crate::error::{DwiError, DwiResult};
use crate::freesurfer::FreeSurferDerivatives;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{event, Level};

/// A DWI image with its gradient table and sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DwiSeries {
  pub image: PathBuf,
  pub bval: PathBuf,
  pub bvec: PathBuf,
  pub sidecar: PathBuf,
}

impl DwiSeries {
  /// Companion files share the image's stem: `x_dwi.nii.gz` -> `x_dwi.bval`, `.bvec`, `.json`.
  pub fn from_image(image: impl Into<PathBuf>) -> Self {
    let image = image.into();
    let stem = strip_nifti_extension(&image);
    Self {
      bval: with_suffix(&stem, ".bval"),
      bvec: with_suffix(&stem, ".bvec"),
      sidecar: with_suffix(&stem, ".json"),
      image,
    }
  }

  fn missing_files(&self, role: &str) -> Vec<String> {
    [&self.image, &self.bval, &self.bvec, &self.sidecar]
      .into_iter()
      .filter(|p| !p.is_file())
      .map(|p| format!("Missing {} file: {}", role, p.display()))
      .collect()
  }
}

/// Phase-difference fieldmap and its magnitude images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldmapSet {
  pub phasediff: PathBuf,
  pub phasediff_sidecar: PathBuf,
  pub magnitude1: Option<PathBuf>,
  pub magnitude2: Option<PathBuf>,
}

impl FieldmapSet {
  pub fn has_magnitude(&self) -> bool {
    self.magnitude1.is_some() || self.magnitude2.is_some()
  }

  fn missing_files(&self) -> Vec<String> {
    [Some(&self.phasediff), Some(&self.phasediff_sidecar), self.magnitude1.as_ref(), self.magnitude2.as_ref()]
      .into_iter()
      .flatten()
      .filter(|p| !p.is_file())
      .map(|p| format!("Missing fieldmap file: {}", p.display()))
      .collect()
  }

  /// First available magnitude image.
  pub fn magnitude(&self) -> Option<&Path> {
    self.magnitude1.as_deref().or(self.magnitude2.as_deref())
  }
}

/// Optional FreeSurfer-derived label volumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParcellationFiles {
  /// Desikan-Killiany `aparc+aseg`.
  pub desikan_killiany: Option<PathBuf>,
  /// Destrieux `aparc.a2009s+aseg`.
  pub destrieux: Option<PathBuf>,
}

/// Immutable description of the inputs for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionLayout {
  subject: String,
  session: Option<String>,
  primary_dwi: DwiSeries,
  reverse_dwi: Option<DwiSeries>,
  anat_t1w: PathBuf,
  fieldmap: Option<FieldmapSet>,
  parcellations: ParcellationFiles,
  fs_brain: Option<PathBuf>,
  distortion_strategy: DistortionStrategy,
}

impl AcquisitionLayout {
  pub fn builder(subject: impl Into<String>) -> AcquisitionLayoutBuilder {
    AcquisitionLayoutBuilder {
      subject: subject.into(),
      ..Default::default()
    }
  }

  pub fn subject(&self) -> &str {
    &self.subject
  }

  pub fn session(&self) -> Option<&str> {
    self.session.as_deref()
  }

  pub fn primary_dwi(&self) -> &DwiSeries {
    &self.primary_dwi
  }

  pub fn reverse_dwi(&self) -> Option<&DwiSeries> {
    self.reverse_dwi.as_ref()
  }

  pub fn anat_t1w(&self) -> &Path {
    &self.anat_t1w
  }

  pub fn fieldmap(&self) -> Option<&FieldmapSet> {
    self.fieldmap.as_ref()
  }

  pub fn parcellations(&self) -> &ParcellationFiles {
    &self.parcellations
  }

  pub fn fs_brain(&self) -> Option<&Path> {
    self.fs_brain.as_deref()
  }

  /// Fixed at construction from which optional files were supplied.
  pub fn distortion_strategy(&self) -> DistortionStrategy {
    self.distortion_strategy
  }

  pub fn file_availability(&self) -> FileAvailability {
    FileAvailability {
      primary_dwi: true,
      reverse_dwi: self.reverse_dwi.is_some(),
      phasediff: self.fieldmap.is_some(),
      magnitude: self.fieldmap.as_ref().is_some_and(FieldmapSet::has_magnitude),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct AcquisitionLayoutBuilder {
  subject: String,
  session: Option<String>,
  primary_dwi: Option<DwiSeries>,
  reverse_dwi: Option<DwiSeries>,
  anat_t1w: Option<PathBuf>,
  fieldmap: Option<FieldmapSet>,
  parcellations: ParcellationFiles,
  fs_brain: Option<PathBuf>,
}

impl AcquisitionLayoutBuilder {
  pub fn session(mut self, session: impl Into<String>) -> Self {
    self.session = Some(session.into());
    self
  }

  pub fn primary_dwi(mut self, series: DwiSeries) -> Self {
    self.primary_dwi = Some(series);
    self
  }

  pub fn reverse_dwi(mut self, series: DwiSeries) -> Self {
    self.reverse_dwi = Some(series);
    self
  }

  pub fn anat_t1w(mut self, path: impl Into<PathBuf>) -> Self {
    self.anat_t1w = Some(path.into());
    self
  }

  pub fn fieldmap(mut self, fieldmap: FieldmapSet) -> Self {
    self.fieldmap = Some(fieldmap);
    self
  }

  pub fn desikan_killiany(mut self, path: impl Into<PathBuf>) -> Self {
    self.parcellations.desikan_killiany = Some(path.into());
    self
  }

  pub fn destrieux(mut self, path: impl Into<PathBuf>) -> Self {
    self.parcellations.destrieux = Some(path.into());
    self
  }

  pub fn fs_brain(mut self, path: impl Into<PathBuf>) -> Self {
    self.fs_brain = Some(path.into());
    self
  }

  /// Copies parcellation and brain paths from a FreeSurfer probe.
  pub fn freesurfer(mut self, fs: &FreeSurferDerivatives) -> Self {
    self.parcellations.desikan_killiany = fs.aparc_aseg().map(Path::to_path_buf);
    self.parcellations.destrieux = fs.aparc_a2009s_aseg().map(Path::to_path_buf);
    self.fs_brain = fs.brain().map(Path::to_path_buf);
    self
  }

  pub fn build(self) -> DwiResult<AcquisitionLayout> {
    let mut problems = Vec::new();
    if self.primary_dwi.is_none() {
      problems.push(format!("No primary DWI series found for sub-{}", self.subject));
    }
    if self.anat_t1w.is_none() {
      problems.push(format!("No T1w anatomical image found for sub-{}", self.subject));
    }
    let (Some(primary_dwi), Some(anat_t1w)) = (self.primary_dwi, self.anat_t1w) else {
      return Err(DwiError::bids("mandatory inputs missing", problems));
    };

    let mut layout = AcquisitionLayout {
      subject: self.subject,
      session: self.session,
      primary_dwi,
      reverse_dwi: self.reverse_dwi,
      anat_t1w,
      fieldmap: self.fieldmap,
      parcellations: self.parcellations,
      fs_brain: self.fs_brain,
      distortion_strategy: DistortionStrategy::None,
    };
    layout.distortion_strategy = detect_distortion_strategy(layout.file_availability());
    Ok(layout)
  }
}

/// Supplies the layout for a subject/session. Discovery conventions live
/// entirely behind this trait.
#[async_trait]
pub trait LayoutSource: Send + Sync {
  async fn discover(
    &self,
    subject: &str,
    session: Option<&str>,
    freesurfer: &FreeSurferDerivatives,
  ) -> anyhow::Result<AcquisitionLayout>;
}

/// Conventional BIDS directory discovery: `sub-<s>[/ses-<t>]/{dwi,anat,fmap}`.
#[derive(Debug, Clone)]
pub struct BidsDirectorySource {
  bids_dir: PathBuf,
}

const PRIMARY_DWI_SUFFIXES: &[&str] = &["_dir-AP_dwi", "_acq-AP_dwi", "_dir-ap_dwi"];
const REVERSE_DWI_SUFFIXES: &[&str] = &["_dir-PA_dwi", "_acq-PA_dwi", "_dir-pa_dwi"];

impl BidsDirectorySource {
  pub fn new(bids_dir: impl Into<PathBuf>) -> Self {
    Self { bids_dir: bids_dir.into() }
  }

  fn modality_dir(&self, subject: &str, session: Option<&str>, modality: &str) -> PathBuf {
    let mut dir = self.bids_dir.join(format!("sub-{}", subject));
    if let Some(ses) = session {
      dir = dir.join(format!("ses-{}", ses));
    }
    dir.join(modality)
  }
}

#[async_trait]
impl LayoutSource for BidsDirectorySource {
  async fn discover(
    &self,
    subject: &str,
    session: Option<&str>,
    freesurfer: &FreeSurferDerivatives,
  ) -> anyhow::Result<AcquisitionLayout> {
    let dwi_dir = self.modality_dir(subject, session, "dwi");
    let anat_dir = self.modality_dir(subject, session, "anat");
    let fmap_dir = self.modality_dir(subject, session, "fmap");

    let dwi_files = nifti_files(&dwi_dir)?;
    let primary = find_by_suffixes(&dwi_files, PRIMARY_DWI_SUFFIXES)
      .or_else(|| {
        let unlabelled: Vec<PathBuf> = dwi_files
          .iter()
          .filter(|f| !has_suffix(f, REVERSE_DWI_SUFFIXES))
          .cloned()
          .collect();
        let fallback = find_by_suffixes(&unlabelled, &["_dwi"]);
        if let Some(path) = &fallback {
          event!(Level::INFO, file = %path.display(), "No dir-AP label found, using unlabelled DWI as primary.");
        }
        fallback
      })
      .map(DwiSeries::from_image);
    let reverse = find_by_suffixes(&dwi_files, REVERSE_DWI_SUFFIXES)
      .filter(|path| primary.as_ref().map_or(true, |p| &p.image != path))
      .map(DwiSeries::from_image);
    let anat = find_by_suffixes(&nifti_files(&anat_dir)?, &["_T1w"]);

    let fmap_files = nifti_files(&fmap_dir)?;
    let fieldmap = find_by_suffixes(&fmap_files, &["_phasediff"]).map(|phasediff| FieldmapSet {
      phasediff_sidecar: with_suffix(&strip_nifti_extension(&phasediff), ".json"),
      phasediff,
      magnitude1: find_by_suffixes(&fmap_files, &["_magnitude1"]),
      magnitude2: find_by_suffixes(&fmap_files, &["_magnitude2"]),
    });

    // Every series that was found must be complete.
    let mut problems = Vec::new();
    match &primary {
      Some(series) => problems.extend(series.missing_files("DWI")),
      None if reverse.is_some() => problems.push(format!(
        "Only a reverse phase-encoded DWI series was found in {}; a dir-AP or unlabelled series is required",
        dwi_dir.display()
      )),
      None => {}
    }
    if let Some(series) = &reverse {
      problems.extend(series.missing_files("reverse DWI"));
    }
    if let Some(fmap) = &fieldmap {
      problems.extend(fmap.missing_files());
    }
    if !problems.is_empty() {
      return Err(DwiError::bids("incomplete DWI or fieldmap inputs", problems).into());
    }

    let mut builder = AcquisitionLayout::builder(subject).freesurfer(freesurfer);
    if let Some(ses) = session {
      builder = builder.session(ses);
    }
    if let Some(series) = primary {
      builder = builder.primary_dwi(series);
    }
    if let Some(series) = reverse {
      builder = builder.reverse_dwi(series);
    }
    if let Some(path) = anat {
      builder = builder.anat_t1w(path);
    }
    if let Some(fmap) = fieldmap {
      builder = builder.fieldmap(fmap);
    }
    Ok(builder.build()?)
  }
}

/// Sorted NIfTI files in `dir`; an absent directory is simply empty.
fn nifti_files(dir: &Path) -> DwiResult<Vec<PathBuf>> {
  if !dir.is_dir() {
    return Ok(Vec::new());
  }
  let entries = std::fs::read_dir(dir).map_err(|e| DwiError::io(dir, e))?;
  let mut files = Vec::new();
  for entry in entries {
    let path = entry.map_err(|e| DwiError::io(dir, e))?.path();
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name.ends_with(".nii.gz") || name.ends_with(".nii") {
      files.push(path);
    }
  }
  files.sort();
  Ok(files)
}

fn find_by_suffixes(files: &[PathBuf], suffixes: &[&str]) -> Option<PathBuf> {
  suffixes.iter().find_map(|suffix| {
    files
      .iter()
      .find(|f| strip_nifti_extension(f).to_string_lossy().ends_with(suffix))
      .cloned()
  })
}

fn has_suffix(file: &Path, suffixes: &[&str]) -> bool {
  let stem = strip_nifti_extension(file);
  let stem = stem.to_string_lossy();
  suffixes.iter().any(|suffix| stem.ends_with(suffix))
}

fn strip_nifti_extension(path: &Path) -> PathBuf {
  let text = path.to_string_lossy();
  let stem = text
    .strip_suffix(".nii.gz")
    .or_else(|| text.strip_suffix(".nii"))
    .unwrap_or(&text);
  PathBuf::from(stem)
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
  let mut s = stem.as_os_str().to_owned();
  s.push(suffix);
  PathBuf::from(s)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  fn series(name: &str) -> DwiSeries {
    DwiSeries::from_image(format!("/bids/sub-01/dwi/{}.nii.gz", name))
  }

  #[test]
  fn companion_paths_follow_the_image() {
    let s = series("sub-01_dir-AP_dwi");
    assert_eq!(s.bval, PathBuf::from("/bids/sub-01/dwi/sub-01_dir-AP_dwi.bval"));
    assert_eq!(s.bvec, PathBuf::from("/bids/sub-01/dwi/sub-01_dir-AP_dwi.bvec"));
    assert_eq!(s.sidecar, PathBuf::from("/bids/sub-01/dwi/sub-01_dir-AP_dwi.json"));
  }

  #[test]
  fn mandatory_inputs_are_reported_together() {
    let err = AcquisitionLayout::builder("01").build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BidsValidation);
    assert_eq!(err.detail_lines().len(), 2);

    let err = AcquisitionLayout::builder("01")
      .primary_dwi(series("sub-01_dir-AP_dwi"))
      .build()
      .unwrap_err();
    assert_eq!(err.detail_lines(), vec!["No T1w anatomical image found for sub-01".to_string()]);
  }

  #[test]
  fn strategy_is_fixed_at_construction() {
    let base = || {
      AcquisitionLayout::builder("01")
        .primary_dwi(series("sub-01_dir-AP_dwi"))
        .anat_t1w("/bids/sub-01/anat/sub-01_T1w.nii.gz")
    };
    let fmap = FieldmapSet {
      phasediff: "/bids/sub-01/fmap/sub-01_phasediff.nii.gz".into(),
      phasediff_sidecar: "/bids/sub-01/fmap/sub-01_phasediff.json".into(),
      magnitude1: Some("/bids/sub-01/fmap/sub-01_magnitude1.nii.gz".into()),
      magnitude2: None,
    };

    let none = base().build().unwrap();
    assert_eq!(none.distortion_strategy(), DistortionStrategy::None);

    let fieldmap = base().fieldmap(fmap.clone()).build().unwrap();
    assert_eq!(fieldmap.distortion_strategy(), DistortionStrategy::Fieldmap);

    let rpe = base().fieldmap(fmap).reverse_dwi(series("sub-01_dir-PA_dwi")).build().unwrap();
    assert_eq!(rpe.distortion_strategy(), DistortionStrategy::RpePair);
  }
}
