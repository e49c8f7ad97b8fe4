// dwi-connectome/src/core/control.rs

//! Signals for stage flow and the outcome of a full pipeline run.

/// Returned by a stage handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageControl {
  Continue,
  /// Halt the pipeline after this stage. Later stages do not run.
  Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
  /// Every stage ran or was skipped by its condition.
  Completed,
  /// A handler returned [`StageControl::Stop`].
  Stopped { at: String },
}
