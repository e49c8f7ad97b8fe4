// dwi-connectome/src/core/stage.rs

//! A single named stage of the pipeline and the handler type bound to it.

use super::context_data::ContextData;
use super::control::StageControl;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Evaluated before the stage runs. `true` skips it.
pub type SkipCondition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;

/// An async stage body. It receives a clone of the shared state and must drop
/// any lock guard before awaiting.
pub type StageHandler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<StageControl, Err>> + Send>> + Send + Sync,
>;

#[derive(Clone)]
pub struct StageDef<TData: 'static + Send + Sync> {
  pub name: String,
  pub skip_if: Option<SkipCondition<TData>>,
}

impl<TData: 'static + Send + Sync> StageDef<TData> {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      skip_if: None,
    }
  }
}

impl<TData: 'static + Send + Sync> std::fmt::Debug for StageDef<TData> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StageDef")
      .field("name", &self.name)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}
