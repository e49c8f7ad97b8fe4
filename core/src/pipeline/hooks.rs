// dwi-connectome/src/pipeline/hooks.rs

//! Handler registration.

use crate::core::context_data::ContextData;
use crate::core::control::StageControl;
use crate::core::stage::StageHandler;
use crate::error::DwiError;
use crate::pipeline::definition::StagePipeline;
use std::future::Future;
use tracing::{event, Level};

impl<TData, Err> StagePipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<DwiError> + Send + Sync + 'static,
{
  /// Binds the body of `stage`. A stage has exactly one handler; binding
  /// again replaces it.
  pub fn on_stage<F, HandlerErr>(
    &mut self,
    stage: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) -> Result<(), DwiError>
  where
    F: Future<Output = Result<StageControl, HandlerErr>> + Send + 'static,
    HandlerErr: Into<Err> + Send + Sync + 'static,
  {
    self.stage_mut(stage)?;
    let handler: StageHandler<TData, Err> = Box::new(move |ctx| {
      let fut = handler_fn(ctx);
      Box::pin(async move { fut.await.map_err(Into::into) })
    });
    if self.handlers.insert(stage.to_string(), handler).is_some() {
      event!(Level::DEBUG, stage, "Replaced stage handler.");
    }
    Ok(())
  }
}
