// dwi-connectome/src/workflow/atlas.rs

//! Which atlas-based connectomes can be produced from the available
//! parcellation derivatives.

use crate::acquisition::AcquisitionLayout;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{event, Level};

/// MRtrix3 lookup table mapping FreeSurfer label values to the originals.
pub const FREESURFER_COLOR_LUT: &str = "FreeSurferColorLUT.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Atlas {
  DesikanKilliany,
  Destrieux,
}

impl Atlas {
  /// Short label used in step and file names.
  pub fn label(&self) -> &'static str {
    match self {
      Atlas::DesikanKilliany => "dk",
      Atlas::Destrieux => "destrieux",
    }
  }

  /// Target lookup table for `labelconvert`.
  pub fn target_lut(&self) -> &'static str {
    match self {
      Atlas::DesikanKilliany => "fs_default.txt",
      Atlas::Destrieux => "fs_a2009s.txt",
    }
  }
}

impl fmt::Display for Atlas {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// An atlas together with the label volume it will be built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AtlasSource {
  pub atlas: Atlas,
  pub parcellation: PathBuf,
}

/// DK whenever `aparc+aseg` is present, Destrieux only when
/// `aparc.a2009s+aseg` is present. Ordered DK first.
pub fn available_atlases(layout: &AcquisitionLayout) -> Vec<AtlasSource> {
  let parcellations = layout.parcellations();
  let mut atlases = Vec::new();
  if let Some(dk) = &parcellations.desikan_killiany {
    atlases.push(AtlasSource {
      atlas: Atlas::DesikanKilliany,
      parcellation: dk.clone(),
    });
  }
  match &parcellations.destrieux {
    Some(destrieux) => atlases.push(AtlasSource {
      atlas: Atlas::Destrieux,
      parcellation: destrieux.clone(),
    }),
    None => event!(Level::INFO, "Destrieux parcellation not present, skipping its connectome."),
  }
  atlases
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::acquisition::DwiSeries;

  fn layout() -> crate::acquisition::AcquisitionLayoutBuilder {
    AcquisitionLayout::builder("01")
      .primary_dwi(DwiSeries::from_image("/b/sub-01_dir-AP_dwi.nii.gz"))
      .anat_t1w("/b/sub-01_T1w.nii.gz")
  }

  #[test]
  fn dk_only() {
    let atlases = available_atlases(&layout().desikan_killiany("/fs/aparc+aseg.mgz").build().unwrap());
    assert_eq!(atlases.len(), 1);
    assert_eq!(atlases[0].atlas, Atlas::DesikanKilliany);
  }

  #[test]
  fn both_present_keeps_order() {
    let atlases = available_atlases(
      &layout()
        .destrieux("/fs/aparc.a2009s+aseg.mgz")
        .desikan_killiany("/fs/aparc+aseg.mgz")
        .build()
        .unwrap(),
    );
    let labels: Vec<_> = atlases.iter().map(|a| a.atlas.label()).collect();
    assert_eq!(labels, vec!["dk", "destrieux"]);
  }

  #[test]
  fn nothing_present() {
    assert!(available_atlases(&layout().build().unwrap()).is_empty());
    assert_eq!(Atlas::Destrieux.target_lut(), "fs_a2009s.txt");
  }
}
