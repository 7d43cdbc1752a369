// core/src/pipeline/execution.rs

//! `Pipeline::run()`, executing steps in order against one shared context.

use super::step::{PipelineResult, StepControl};
use super::StepContext;
use crate::error::PipelineError;
use crate::pipeline::definition::Pipeline;
use tracing::{event, Instrument, Level};

impl<T, E> Pipeline<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Runs every step in order. A handler error aborts the run and is returned as is;
  /// a non-optional step without handlers yields `PipelineError::HandlerMissing`.
  pub async fn run(&self, ctx: StepContext<T>) -> Result<PipelineResult, E> {
    event!(Level::DEBUG, pipeline = self.name, num_steps = self.steps.len(), "Pipeline execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if let Some(skip) = &step_def.skip_if {
        let skipped = {
          let guard = ctx.read();
          skip(&*guard)
        };
        if skipped {
          event!(Level::DEBUG, pipeline = self.name, step_name, "Step skipped due to 'skip_if' condition.");
          continue;
        }
      }

      let handlers = match self.handlers.get(step_name) {
        Some(handlers) if !handlers.is_empty() => handlers,
        _ if step_def.optional => {
          event!(Level::DEBUG, pipeline = self.name, step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        _ => {
          event!(Level::ERROR, pipeline = self.name, step_name, "Non-optional step has no handlers.");
          return Err(E::from(PipelineError::HandlerMissing {
            step_name: step_def.name.clone(),
          }));
        }
      };

      let step_span = tracing::info_span!(
        "pipeline_step",
        pipeline = self.name,
        step_name,
        step_index = step_idx,
        optional = step_def.optional
      );

      for handler in handlers {
        match handler(ctx.clone()).instrument(step_span.clone()).await {
          Ok(StepControl::Continue) => {}
          Ok(StepControl::Stop) => {
            event!(Level::INFO, pipeline = self.name, step_name, "Pipeline stopped by a handler.");
            return Ok(PipelineResult::Stopped);
          }
          Err(e) => {
            event!(Level::WARN, pipeline = self.name, step_name, error = %e, "Step handler failed.");
            return Err(e);
          }
        }
      }
    }

    event!(Level::DEBUG, pipeline = self.name, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }
}
