// dwi-connectome/src/pipeline/definition.rs

//! The `StagePipeline` struct and its structural configuration.

use crate::core::stage::{SkipCondition, StageDef, StageHandler};
use crate::error::DwiError;
use std::collections::HashMap;

/// Stages run in declaration order. `Err` must absorb [`DwiError`] so that
/// pipeline-level failures (a stage without a handler) surface in the same
/// type as handler failures.
pub struct StagePipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<DwiError> + Send + Sync + 'static,
{
  pub(crate) stages: Vec<StageDef<TData>>,
  pub(crate) handlers: HashMap<String, StageHandler<TData, Err>>,
}

impl<TData, Err> StagePipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<DwiError> + Send + Sync + 'static,
{
  pub fn new(stage_names: &[&str]) -> Self {
    Self {
      stages: stage_names.iter().map(|name| StageDef::new(*name)).collect(),
      handlers: HashMap::new(),
    }
  }

  pub fn stage_names(&self) -> Vec<&str> {
    self.stages.iter().map(|s| s.name.as_str()).collect()
  }

  pub fn has_handler(&self, stage: &str) -> bool {
    self.handlers.contains_key(stage)
  }

  pub(crate) fn stage_mut(&mut self, stage: &str) -> Result<&mut StageDef<TData>, DwiError> {
    self
      .stages
      .iter_mut()
      .find(|s| s.name == stage)
      .ok_or_else(|| DwiError::internal(format!("stage '{}' is not part of the pipeline", stage)))
  }

  pub fn set_skip_condition(&mut self, stage: &str, skip_if: Option<SkipCondition<TData>>) -> Result<(), DwiError> {
    self.stage_mut(stage)?.skip_if = skip_if;
    Ok(())
  }
}
