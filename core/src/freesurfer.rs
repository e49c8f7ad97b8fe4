// dwi-connectome/src/freesurfer.rs

//! Presence check for FreeSurfer `recon-all` outputs.

use crate::error::{DwiError, DwiResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{event, Level};

pub const APARC_ASEG: &str = "aparc+aseg.mgz";
pub const APARC_A2009S_ASEG: &str = "aparc.a2009s+aseg.mgz";
pub const BRAIN: &str = "brain.mgz";

/// What was found for one subject under a FreeSurfer derivatives directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeSurferDerivatives {
  subject_dir: PathBuf,
  subject_dir_found: bool,
  aparc_aseg: Option<PathBuf>,
  aparc_a2009s_aseg: Option<PathBuf>,
  brain: Option<PathBuf>,
}

impl FreeSurferDerivatives {
  /// Tries `sub-X`, then `sub-X_ses-Y` and `sub-Xses-Y` when a session is given.
  /// The first existing directory wins; if none exists the probe reports the
  /// first candidate with nothing present.
  pub fn probe(fs_dir: &Path, subject: &str, session: Option<&str>) -> Self {
    let mut candidates = vec![fs_dir.join(format!("sub-{}", subject))];
    if let Some(ses) = session {
      candidates.push(fs_dir.join(format!("sub-{}_ses-{}", subject, ses)));
      candidates.push(fs_dir.join(format!("sub-{}ses-{}", subject, ses)));
    }

    let found = candidates.iter().find(|c| c.is_dir()).cloned();
    let subject_dir_found = found.is_some();
    let subject_dir = found.unwrap_or_else(|| candidates.swap_remove(0));
    let mri = subject_dir.join("mri");
    let present = |name: &str| {
      let path = mri.join(name);
      path.is_file().then_some(path)
    };

    let derivatives = Self {
      aparc_aseg: present(APARC_ASEG),
      aparc_a2009s_aseg: present(APARC_A2009S_ASEG),
      brain: present(BRAIN),
      subject_dir,
      subject_dir_found,
    };
    event!(
      Level::DEBUG,
      subject_dir = %derivatives.subject_dir.display(),
      found = subject_dir_found,
      dk = derivatives.aparc_aseg.is_some(),
      destrieux = derivatives.aparc_a2009s_aseg.is_some(),
      brain = derivatives.brain.is_some(),
      "FreeSurfer derivatives probed."
    );
    derivatives
  }

  pub fn subject_dir(&self) -> &Path {
    &self.subject_dir
  }

  pub fn aparc_aseg(&self) -> Option<&Path> {
    self.aparc_aseg.as_deref()
  }

  pub fn aparc_a2009s_aseg(&self) -> Option<&Path> {
    self.aparc_a2009s_aseg.as_deref()
  }

  pub fn brain(&self) -> Option<&Path> {
    self.brain.as_deref()
  }

  /// `aparc+aseg` and `brain` are both required. Every missing one is listed.
  pub fn require_mandatory(&self) -> DwiResult<()> {
    let mut missing = Vec::new();
    if !self.subject_dir_found {
      missing.push(format!("subject directory {}", self.subject_dir.display()));
    }
    if self.aparc_aseg.is_none() {
      missing.push(APARC_ASEG.to_string());
    }
    if self.brain.is_none() {
      missing.push(BRAIN.to_string());
    }
    if missing.is_empty() {
      Ok(())
    } else {
      Err(DwiError::FreeSurfer {
        subject_dir: self.subject_dir.clone(),
        missing,
      })
    }
  }
}
