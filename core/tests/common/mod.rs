// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use dwi_connectome::acquisition::{AcquisitionLayout, DwiSeries, FieldmapSet, LayoutSource};
use dwi_connectome::engine::{Invocation, ToolRunner};
use dwi_connectome::{FreeSurferDerivatives, ProcessingConfig, RunParameters};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::Level;

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub const SINGLE_SHELL_BVALS: &str = "0 1000 1000 995 1005 0 998";
pub const MULTI_SHELL_BVALS: &str = "0 1000 995 2000 1998 3000 0";
pub const AP_SIDECAR: &str = r#"{"PhaseEncodingDirection": "j-", "TotalReadoutTime": 0.0936}"#;
pub const PA_SIDECAR: &str = r#"{"PhaseEncodingDirection": "j", "TotalReadoutTime": 0.0936}"#;
pub const PHASEDIFF_SIDECAR: &str = r#"{"EchoTime1": 0.00492, "EchoTime2": 0.00738}"#;

/// What to lay down in a fixture.
#[derive(Debug, Clone)]
pub struct FixtureSpec {
  pub bvals: &'static str,
  pub reverse: bool,
  pub fieldmap: bool,
  pub destrieux: bool,
  pub freesurfer_brain: bool,
}

impl Default for FixtureSpec {
  fn default() -> Self {
    Self {
      bvals: SINGLE_SHELL_BVALS,
      reverse: true,
      fieldmap: false,
      destrieux: false,
      freesurfer_brain: true,
    }
  }
}

/// BIDS, FreeSurfer, LUT, output and work directories under one temp root.
pub struct Fixture {
  pub root: TempDir,
  pub bids: PathBuf,
  pub freesurfer: PathBuf,
  pub luts: PathBuf,
  pub output: PathBuf,
  pub work: PathBuf,
}

pub fn touch(path: &Path, contents: &str) {
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, contents).unwrap();
}

impl Fixture {
  pub fn new(spec: FixtureSpec) -> Self {
    let root = tempfile::tempdir().unwrap();
    let bids = root.path().join("bids");
    let freesurfer = root.path().join("freesurfer");
    let luts = root.path().join("luts");
    let output = root.path().join("out");
    let work = root.path().join("work");

    let dwi = bids.join("sub-01/dwi");
    touch(&dwi.join("sub-01_dir-AP_dwi.nii.gz"), "");
    touch(&dwi.join("sub-01_dir-AP_dwi.bval"), spec.bvals);
    touch(&dwi.join("sub-01_dir-AP_dwi.bvec"), "0 1 0\n");
    touch(&dwi.join("sub-01_dir-AP_dwi.json"), AP_SIDECAR);
    if spec.reverse {
      touch(&dwi.join("sub-01_dir-PA_dwi.nii.gz"), "");
      touch(&dwi.join("sub-01_dir-PA_dwi.bval"), spec.bvals);
      touch(&dwi.join("sub-01_dir-PA_dwi.bvec"), "0 1 0\n");
      touch(&dwi.join("sub-01_dir-PA_dwi.json"), PA_SIDECAR);
    }
    touch(&bids.join("sub-01/anat/sub-01_T1w.nii.gz"), "");
    if spec.fieldmap {
      let fmap = bids.join("sub-01/fmap");
      touch(&fmap.join("sub-01_phasediff.nii.gz"), "");
      touch(&fmap.join("sub-01_phasediff.json"), PHASEDIFF_SIDECAR);
      touch(&fmap.join("sub-01_magnitude1.nii.gz"), "");
    }

    let mri = freesurfer.join("sub-01/mri");
    touch(&mri.join("aparc+aseg.mgz"), "");
    if spec.freesurfer_brain {
      touch(&mri.join("brain.mgz"), "");
    }
    if spec.destrieux {
      touch(&mri.join("aparc.a2009s+aseg.mgz"), "");
    }

    for lut in ["FreeSurferColorLUT.txt", "fs_default.txt", "fs_a2009s.txt"] {
      touch(&luts.join(lut), "");
    }

    Self {
      root,
      bids,
      freesurfer,
      luts,
      output,
      work,
    }
  }

  pub fn params(&self) -> RunParameters {
    let mut params = RunParameters::new("sub-01", &self.bids, &self.freesurfer, &self.output, &self.work);
    params.lut_dir = Some(self.luts.clone());
    params
  }

  pub fn config(&self) -> ProcessingConfig {
    ProcessingConfig::new(self.params()).unwrap()
  }

  pub fn config_with(&self, adjust: impl FnOnce(&mut RunParameters)) -> ProcessingConfig {
    let mut params = self.params();
    adjust(&mut params);
    ProcessingConfig::new(params).unwrap()
  }
}

/// Records every invocation and writes its declared outputs instead of
/// spawning tools. Optionally fails one step.
#[derive(Debug, Default)]
pub struct RecordingRunner {
  pub invocations: Mutex<Vec<Invocation>>,
  pub fail_on: Option<String>,
}

impl RecordingRunner {
  pub fn failing_on(step: &str) -> Self {
    Self {
      invocations: Mutex::new(Vec::new()),
      fail_on: Some(step.to_string()),
    }
  }

  pub fn steps(&self) -> Vec<String> {
    self.invocations.lock().iter().map(|i| i.step.clone()).collect()
  }

  pub fn count(&self) -> usize {
    self.invocations.lock().len()
  }

  pub fn reset(&self) {
    self.invocations.lock().clear();
  }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
  async fn run(&self, invocation: &Invocation) -> anyhow::Result<()> {
    self.invocations.lock().push(invocation.clone());
    if self.fail_on.as_deref() == Some(invocation.step.as_str()) {
      anyhow::bail!("{} exited with status 1", invocation.commands[0][0]);
    }
    for output in &invocation.outputs {
      touch(output, invocation.step.as_str());
    }
    Ok(())
  }
}

/// Hands back a fixed layout regardless of subject.
pub struct StaticLayoutSource(pub AcquisitionLayout);

#[async_trait]
impl LayoutSource for StaticLayoutSource {
  async fn discover(
    &self,
    _subject: &str,
    _session: Option<&str>,
    _freesurfer: &FreeSurferDerivatives,
  ) -> anyhow::Result<AcquisitionLayout> {
    Ok(self.0.clone())
  }
}

/// In-memory layout for assembly tests; no files need to exist.
pub fn layout(reverse: bool, fieldmap: bool, destrieux: bool) -> AcquisitionLayout {
  let mut builder = AcquisitionLayout::builder("01")
    .primary_dwi(DwiSeries::from_image("/bids/sub-01/dwi/sub-01_dir-AP_dwi.nii.gz"))
    .anat_t1w("/bids/sub-01/anat/sub-01_T1w.nii.gz")
    .desikan_killiany("/fs/sub-01/mri/aparc+aseg.mgz");
  if reverse {
    builder = builder.reverse_dwi(DwiSeries::from_image("/bids/sub-01/dwi/sub-01_dir-PA_dwi.nii.gz"));
  }
  if fieldmap {
    builder = builder.fieldmap(FieldmapSet {
      phasediff: "/bids/sub-01/fmap/sub-01_phasediff.nii.gz".into(),
      phasediff_sidecar: "/bids/sub-01/fmap/sub-01_phasediff.json".into(),
      magnitude1: Some("/bids/sub-01/fmap/sub-01_magnitude1.nii.gz".into()),
      magnitude2: None,
    });
  }
  if destrieux {
    builder = builder.destrieux("/fs/sub-01/mri/aparc.a2009s+aseg.mgz");
  }
  builder.build().unwrap()
}
