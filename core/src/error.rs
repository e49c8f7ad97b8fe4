// dwi-connectome/src/error.rs
use anyhow::Error as AnyhowError;
use std::path::PathBuf;
use thiserror::Error;

/// Every way a subject/session run can fail. All variants are fatal to the run.
#[derive(Debug, Error)]
pub enum DwiError {
  #[error("Configuration error in '{context}': {message}")]
  Configuration { context: String, message: String },

  #[error("Missing metadata field(s) {fields:?} in {source_name}")]
  MissingMetadata { source_name: String, fields: Vec<String> },

  #[error("BIDS validation failed: {message} ({} problem(s))", problems.len())]
  BidsValidation { message: String, problems: Vec<String> },

  #[error("FreeSurfer derivatives unusable under {subject_dir}: missing {missing:?}")]
  FreeSurfer { subject_dir: PathBuf, missing: Vec<String> },

  #[error("Workflow build error at step '{step}': {message}")]
  WorkflowBuild { step: String, message: String },

  #[error("Workflow execution failed at node '{node}': {report}")]
  WorkflowExecution { node: String, report: String },

  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Malformed JSON in {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("Internal error. Source: {source}")]
  Internal {
    #[source]
    source: AnyhowError,
  },
}

/// Coarse classification of a [`DwiError`], used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Configuration,
  MissingMetadata,
  BidsValidation,
  FreeSurfer,
  WorkflowBuild,
  WorkflowExecution,
  Other,
}

impl DwiError {
  pub fn configuration(context: impl Into<String>, message: impl Into<String>) -> Self {
    DwiError::Configuration {
      context: context.into(),
      message: message.into(),
    }
  }

  pub fn missing_metadata<S: Into<String>>(source_name: impl Into<String>, fields: impl IntoIterator<Item = S>) -> Self {
    DwiError::MissingMetadata {
      source_name: source_name.into(),
      fields: fields.into_iter().map(Into::into).collect(),
    }
  }

  pub fn bids(message: impl Into<String>, problems: Vec<String>) -> Self {
    DwiError::BidsValidation {
      message: message.into(),
      problems,
    }
  }

  pub fn build(step: impl Into<String>, message: impl Into<String>) -> Self {
    DwiError::WorkflowBuild {
      step: step.into(),
      message: message.into(),
    }
  }

  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    DwiError::Io {
      path: path.into(),
      source,
    }
  }

  pub fn internal(message: impl std::fmt::Display) -> Self {
    DwiError::Internal {
      source: anyhow::anyhow!("{}", message),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      DwiError::Configuration { .. } => ErrorKind::Configuration,
      DwiError::MissingMetadata { .. } => ErrorKind::MissingMetadata,
      DwiError::BidsValidation { .. } => ErrorKind::BidsValidation,
      DwiError::FreeSurfer { .. } => ErrorKind::FreeSurfer,
      DwiError::WorkflowBuild { .. } => ErrorKind::WorkflowBuild,
      DwiError::WorkflowExecution { .. } => ErrorKind::WorkflowExecution,
      DwiError::Io { .. } | DwiError::Json { .. } | DwiError::Internal { .. } => ErrorKind::Other,
    }
  }

  /// Process exit status for this failure. A FreeSurfer failure always gets its own code.
  pub fn exit_code(&self) -> i32 {
    match self.kind() {
      ErrorKind::FreeSurfer => 2,
      ErrorKind::Configuration => 3,
      ErrorKind::MissingMetadata => 4,
      ErrorKind::BidsValidation => 5,
      ErrorKind::WorkflowBuild => 6,
      ErrorKind::WorkflowExecution => 7,
      ErrorKind::Other => 1,
    }
  }

  /// One line per actionable problem, for operator-facing output.
  pub fn detail_lines(&self) -> Vec<String> {
    match self {
      DwiError::BidsValidation { problems, .. } => problems.clone(),
      DwiError::FreeSurfer { subject_dir, missing } => missing
        .iter()
        .map(|m| format!("Missing mandatory FreeSurfer file: {} in {}", m, subject_dir.join("mri").display()))
        .collect(),
      DwiError::MissingMetadata { source_name, fields } => fields
        .iter()
        .map(|f| format!("Field '{}' absent from {}", f, source_name))
        .collect(),
      other => vec![other.to_string()],
    }
  }
}

// Collaborators (layout sources, tool runners) may hand back anyhow errors.
// Unwrap a DwiError they carry instead of burying it under Internal.
impl From<AnyhowError> for DwiError {
  fn from(err: AnyhowError) -> Self {
    match err.downcast::<DwiError>() {
      Ok(dwi_err) => dwi_err,
      Err(other) => DwiError::Internal { source: other },
    }
  }
}

pub type DwiResult<T, E = DwiError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn freesurfer_exit_code_is_distinct() {
    let fs = DwiError::FreeSurfer {
      subject_dir: PathBuf::from("/fs/sub-01"),
      missing: vec!["brain.mgz".into()],
    };
    let others = [
      DwiError::configuration("x", "y"),
      DwiError::missing_metadata("dwi.json", ["TotalReadoutTime"]),
      DwiError::bids("x", vec![]),
      DwiError::build("mask", "x"),
      DwiError::WorkflowExecution {
        node: "tckgen".into(),
        report: "exit 1".into(),
      },
    ];
    for other in &others {
      assert_ne!(fs.exit_code(), other.exit_code());
    }
  }

  #[test]
  fn anyhow_wrapping_a_dwi_error_is_unwrapped() {
    let wrapped: AnyhowError = DwiError::bids("no dwi", vec!["Missing DWI file".into()]).into();
    let back: DwiError = wrapped.into();
    assert_eq!(back.kind(), ErrorKind::BidsValidation);

    let plain: DwiError = anyhow::anyhow!("disk on fire").into();
    assert_eq!(plain.kind(), ErrorKind::Other);
  }
}
