// dwi-connectome/src/pipeline/execution.rs

//! `StagePipeline::run`.

use crate::core::context_data::ContextData;
use crate::core::control::{RunOutcome, StageControl};
use crate::error::DwiError;
use crate::pipeline::definition::StagePipeline;
use tracing::{event, instrument, Instrument, Level};

impl<TData, Err> StagePipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<DwiError> + Send + Sync + 'static,
{
  /// Runs every stage in order. The first handler error ends the run and is
  /// returned as is. A stage with no handler is an error.
  #[instrument(
    name = "StagePipeline::run",
    skip_all,
    fields(num_stages = self.stages.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx: ContextData<TData>) -> Result<RunOutcome, Err> {
    event!(Level::DEBUG, "Pipeline starting.");

    for (idx, stage) in self.stages.iter().enumerate() {
      let name = stage.name.as_str();
      let stage_span = tracing::info_span!("stage", stage = name, index = idx);

      if let Some(skip) = &stage.skip_if {
        if skip(ctx.clone()) {
          event!(parent: &stage_span, Level::INFO, "Stage skipped by its condition.");
          continue;
        }
      }

      let Some(handler) = self.handlers.get(name) else {
        event!(parent: &stage_span, Level::ERROR, "Stage has no handler.");
        return Err(Err::from(DwiError::internal(format!("stage '{}' has no handler", name))));
      };

      match handler(ctx.clone()).instrument(stage_span.clone()).await {
        Ok(StageControl::Continue) => {}
        Ok(StageControl::Stop) => {
          event!(parent: &stage_span, Level::INFO, "Pipeline stopped by stage.");
          return Ok(RunOutcome::Stopped { at: name.to_string() });
        }
        Err(e) => {
          event!(parent: &stage_span, Level::ERROR, error = %e, "Stage failed.");
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, "Pipeline completed.");
    Ok(RunOutcome::Completed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  type Log = Vec<&'static str>;

  fn pipeline() -> StagePipeline<Log, DwiError> {
    let mut p = StagePipeline::new(&["a", "b", "c"]);
    for name in ["a", "b", "c"] {
      p.on_stage(name, move |ctx: ContextData<Log>| async move {
        ctx.write().push(name);
        Ok::<_, DwiError>(StageControl::Continue)
      })
      .unwrap();
    }
    p
  }

  #[tokio::test]
  async fn runs_in_order_and_honours_skip() {
    let mut p = pipeline();
    p.set_skip_condition("b", Some(Arc::new(|_: ContextData<Log>| true))).unwrap();
    let ctx = ContextData::new(Log::new());
    assert_eq!(p.run(ctx.clone()).await.unwrap(), RunOutcome::Completed);
    assert_eq!(*ctx.read(), vec!["a", "c"]);
  }

  #[tokio::test]
  async fn stop_and_error_end_the_run() {
    let mut p = pipeline();
    p.on_stage("b", |_ctx: ContextData<Log>| async { Ok::<_, DwiError>(StageControl::Stop) })
      .unwrap();
    let ctx = ContextData::new(Log::new());
    assert_eq!(
      p.run(ctx.clone()).await.unwrap(),
      RunOutcome::Stopped { at: "b".into() }
    );
    assert_eq!(*ctx.read(), vec!["a"]);

    p.on_stage("a", |_ctx: ContextData<Log>| async {
      Err::<StageControl, _>(DwiError::configuration("a", "boom"))
    })
    .unwrap();
    assert!(p.run(ContextData::new(Log::new())).await.is_err());
  }

  #[tokio::test]
  async fn missing_handler_is_an_error() {
    let p: StagePipeline<Log, DwiError> = StagePipeline::new(&["only"]);
    assert!(!p.has_handler("only"));
    assert!(p.run(ContextData::new(Log::new())).await.is_err());
    let mut p = p;
    assert!(p
      .on_stage("nope", |_ctx: ContextData<Log>| async { Ok::<_, DwiError>(StageControl::Continue) })
      .is_err());
  }
}
