// dwi-connectome/src/acquisition/detect.rs

//! Classification of an acquisition into `(ShellType, DistortionStrategy)`.

use super::enums::{DistortionStrategy, ShellType};
use crate::error::{DwiError, DwiResult};
use tracing::{event, Level};

/// Constants for shell detection.
///
/// Both values are empirical: volumes at or below `threshold` count as b=0, and
/// remaining b-values are snapped to the nearest multiple of `granularity` to
/// absorb scanner jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellDetection {
  pub threshold: f64,
  pub granularity: f64,
}

impl Default for ShellDetection {
  fn default() -> Self {
    Self {
      threshold: 50.0,
      granularity: 50.0,
    }
  }
}

impl ShellDetection {
  /// Sorted, de-duplicated diffusion-weighted shells.
  pub fn unique_shells(&self, bvals: &[f64]) -> Vec<f64> {
    let mut shells: Vec<f64> = bvals
      .iter()
      .copied()
      .filter(|b| *b > self.threshold)
      .map(|b| (b / self.granularity).round() * self.granularity)
      .collect();
    shells.sort_by(|a, b| a.total_cmp(b));
    shells.dedup();
    shells
  }

  /// Single vs multi shell. Fails when nothing is diffusion-weighted.
  pub fn classify(&self, bvals: &[f64]) -> DwiResult<ShellType> {
    let shells = self.unique_shells(bvals);
    match shells.len() {
      0 => Err(DwiError::MissingMetadata {
        source_name: format!(
          "b-value sequence of {} volume(s) (no value above {})",
          bvals.len(),
          self.threshold
        ),
        fields: vec!["diffusion-weighted b-values".to_string()],
      }),
      1 => Ok(ShellType::SingleShell),
      _ => Ok(ShellType::MultiShell),
    }
  }
}

/// Shell type with the default detection constants.
pub fn detect_shell_type(bvals: &[f64]) -> DwiResult<ShellType> {
  ShellDetection::default().classify(bvals)
}

/// Which optional correction inputs were found on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAvailability {
  pub primary_dwi: bool,
  pub reverse_dwi: bool,
  pub phasediff: bool,
  pub magnitude: bool,
}

/// Priority is fixed: a reverse-PE pair beats a fieldmap, and having neither is
/// a degraded path rather than an error.
pub fn detect_distortion_strategy(files: FileAvailability) -> DistortionStrategy {
  if files.primary_dwi && files.reverse_dwi {
    event!(Level::INFO, "Reverse phase-encoded DWI present, using RPE_PAIR correction.");
    DistortionStrategy::RpePair
  } else if files.phasediff && files.magnitude {
    event!(Level::INFO, "Phase-difference fieldmap present, using FIELDMAP correction.");
    DistortionStrategy::Fieldmap
  } else {
    event!(
      Level::WARN,
      "No reverse phase-encoded DWI or fieldmap found, proceeding without distortion correction."
    );
    DistortionStrategy::None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;
  use proptest::prelude::*;

  #[test]
  fn jittered_single_shell() {
    assert_eq!(detect_shell_type(&[0.0, 0.0, 995.0, 1005.0, 998.0]).unwrap(), ShellType::SingleShell);
  }

  #[test]
  fn two_shells() {
    assert_eq!(detect_shell_type(&[0.0, 995.0, 1998.0]).unwrap(), ShellType::MultiShell);
    assert_eq!(
      ShellDetection::default().unique_shells(&[0.0, 995.0, 1998.0, 2010.0]),
      vec![1000.0, 2000.0]
    );
  }

  #[test]
  fn empty_and_b0_only_fail() {
    for bvals in [vec![], vec![0.0, 5.0, 50.0]] {
      let err = detect_shell_type(&bvals).unwrap_err();
      assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    }
  }

  #[test]
  fn constants_are_tunable() {
    let coarse = ShellDetection {
      threshold: 100.0,
      granularity: 500.0,
    };
    assert_eq!(coarse.classify(&[0.0, 80.0, 1000.0, 1200.0]).unwrap(), ShellType::SingleShell);
  }

  #[test]
  fn distortion_priority() {
    let rpe = FileAvailability {
      primary_dwi: true,
      reverse_dwi: true,
      phasediff: true,
      magnitude: true,
    };
    assert_eq!(detect_distortion_strategy(rpe), DistortionStrategy::RpePair);

    let fmap = FileAvailability {
      reverse_dwi: false,
      ..rpe
    };
    assert_eq!(detect_distortion_strategy(fmap), DistortionStrategy::Fieldmap);

    let none = FileAvailability {
      primary_dwi: true,
      ..Default::default()
    };
    assert_eq!(detect_distortion_strategy(none), DistortionStrategy::None);

    let phasediff_only = FileAvailability {
      primary_dwi: true,
      phasediff: true,
      ..Default::default()
    };
    assert_eq!(detect_distortion_strategy(phasediff_only), DistortionStrategy::None);
  }

  proptest! {
    #[test]
    fn one_rounded_value_is_single_shell(
      shell in 2u32..100,
      jitter in proptest::collection::vec(-20.0f64..20.0, 1..40),
      b0s in 0usize..5,
    ) {
      let centre = f64::from(shell) * 50.0;
      let mut bvals: Vec<f64> = vec![0.0; b0s];
      bvals.extend(jitter.iter().map(|j| centre + j));
      prop_assert_eq!(detect_shell_type(&bvals).unwrap(), ShellType::SingleShell);
    }

    #[test]
    fn two_distinct_rounded_values_are_multi_shell(low in 2u32..40, gap in 1u32..40) {
      let a = f64::from(low) * 50.0;
      let b = f64::from(low + gap) * 50.0;
      prop_assert_eq!(detect_shell_type(&[0.0, a, b, a]).unwrap(), ShellType::MultiShell);
    }

    #[test]
    fn nothing_above_threshold_fails(bvals in proptest::collection::vec(0.0f64..=50.0, 0..30)) {
      prop_assert!(detect_shell_type(&bvals).is_err());
    }
  }
}
