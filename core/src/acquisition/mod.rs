// dwi-connectome/src/acquisition/mod.rs

//! Everything known about the input data before any graph is built: which files
//! exist, what their sidecars say, and which processing variant they imply.

pub mod detect;
pub mod enums;
pub mod layout;
pub mod metadata;

pub use detect::{detect_distortion_strategy, detect_shell_type, FileAvailability, ShellDetection};
pub use enums::{DistortionStrategy, ShellType, Species};
pub use layout::{
  AcquisitionLayout, AcquisitionLayoutBuilder, BidsDirectorySource, DwiSeries, FieldmapSet, LayoutSource,
  ParcellationFiles,
};
pub use metadata::{
  extract_delta_te, extract_phase_encoding_direction, extract_total_readout_time, parse_bvals, read_bvals,
  AcquisitionMetadata, PhaseAxis, PhaseEncodingDirection, SidecarRecord,
};
