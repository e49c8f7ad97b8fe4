// tests/discovery_tests.rs
mod common;

use common::*;
use dwi_connectome::acquisition::{AcquisitionLayout, LayoutSource};
use dwi_connectome::{BidsDirectorySource, DistortionStrategy, DwiError, ErrorKind, FreeSurferDerivatives};

async fn discover(fixture: &Fixture) -> Result<AcquisitionLayout, DwiError> {
  let freesurfer = FreeSurferDerivatives::probe(&fixture.freesurfer, "01", None);
  BidsDirectorySource::new(&fixture.bids)
    .discover("01", None, &freesurfer)
    .await
    .map_err(DwiError::from)
}

fn remove(fixture: &Fixture, relative: &str) {
  std::fs::remove_file(fixture.bids.join(relative)).unwrap();
}

#[tokio::test]
async fn labelled_pair_is_rpe() {
  setup_tracing();
  let fixture = Fixture::new(FixtureSpec::default());
  let layout = discover(&fixture).await.unwrap();
  assert!(layout.primary_dwi().image.ends_with("sub-01_dir-AP_dwi.nii.gz"));
  assert!(layout.reverse_dwi().unwrap().image.ends_with("sub-01_dir-PA_dwi.nii.gz"));
  assert_eq!(layout.distortion_strategy(), DistortionStrategy::RpePair);
}

#[tokio::test]
async fn reverse_only_dataset_is_not_paired_with_itself() {
  setup_tracing();
  let fixture = Fixture::new(FixtureSpec::default());
  for ext in ["nii.gz", "bval", "bvec", "json"] {
    remove(&fixture, &format!("sub-01/dwi/sub-01_dir-AP_dwi.{}", ext));
  }

  let err = discover(&fixture).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BidsValidation);
  assert!(err.detail_lines().iter().any(|l| l.contains("Only a reverse phase-encoded")));
}

#[tokio::test]
async fn unlabelled_primary_ignores_reverse_series() {
  setup_tracing();
  let fixture = Fixture::new(FixtureSpec::default());
  let dwi = fixture.bids.join("sub-01/dwi");
  for ext in ["nii.gz", "bval", "bvec", "json"] {
    std::fs::rename(
      dwi.join(format!("sub-01_dir-AP_dwi.{}", ext)),
      dwi.join(format!("sub-01_dwi.{}", ext)),
    )
    .unwrap();
  }

  let layout = discover(&fixture).await.unwrap();
  assert!(layout.primary_dwi().image.ends_with("sub-01_dwi.nii.gz"));
  assert_ne!(layout.reverse_dwi().unwrap().image, layout.primary_dwi().image);
  assert_eq!(layout.distortion_strategy(), DistortionStrategy::RpePair);
}

#[tokio::test]
async fn incomplete_reverse_series_is_rejected() {
  setup_tracing();
  let fixture = Fixture::new(FixtureSpec::default());
  remove(&fixture, "sub-01/dwi/sub-01_dir-PA_dwi.bval");
  remove(&fixture, "sub-01/dwi/sub-01_dir-PA_dwi.bvec");

  let err = discover(&fixture).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BidsValidation);
  let lines = err.detail_lines();
  assert_eq!(lines.len(), 2);
  assert!(lines.iter().all(|l| l.starts_with("Missing reverse DWI file")));
}

#[tokio::test]
async fn fieldmap_without_sidecar_is_rejected() {
  setup_tracing();
  let fixture = Fixture::new(FixtureSpec {
    reverse: false,
    fieldmap: true,
    ..FixtureSpec::default()
  });
  assert_eq!(
    discover(&fixture).await.unwrap().distortion_strategy(),
    DistortionStrategy::Fieldmap
  );

  remove(&fixture, "sub-01/fmap/sub-01_phasediff.json");
  let err = discover(&fixture).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BidsValidation);
  assert!(err.detail_lines()[0].contains("sub-01_phasediff.json"));
}
