// core/src/pipeline/definition.rs

//! The `Pipeline<T, E>` struct and the methods used to build it.

use super::step::{Handler, SkipCondition, StepControl, StepDef};
use super::StepContext;
use crate::error::PipelineError;
use std::collections::HashMap;
use std::future::Future;

/// An ordered list of named steps over a shared flow state `T`. Handlers return
/// `Result<StepControl, E>`; framework failures are converted through `From<PipelineError>`.
pub struct Pipeline<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub(crate) name: &'static str,
  pub(crate) steps: Vec<StepDef<T>>,
  pub(crate) handlers: HashMap<String, Vec<Handler<T, E>>>,
}

impl<T, E> Pipeline<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(step_name, optional)` pairs.
  pub fn new(name: &'static str, step_defs: &[(&str, bool)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(step_name, optional)| StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
        skip_if: None,
      })
      .collect();

    Self {
      name,
      steps,
      handlers: HashMap::new(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  /// Panics on an unknown step name; that is a wiring mistake, not a runtime condition.
  fn step_mut(&mut self, step_name: &str) -> &mut StepDef<T> {
    let pipeline = self.name;
    self
      .steps
      .iter_mut()
      .find(|s| s.name == step_name)
      .unwrap_or_else(|| panic!("Pipeline '{}' setup error: step '{}' is not defined.", pipeline, step_name))
  }

  pub fn set_optional(&mut self, step_name: &str, optional: bool) {
    self.step_mut(step_name).optional = optional;
  }

  pub fn skip_if(&mut self, step_name: &str, condition: impl Fn(&T) -> bool + Send + Sync + 'static) {
    let condition: SkipCondition<T> = std::sync::Arc::new(condition);
    self.step_mut(step_name).skip_if = Some(condition);
  }

  /// Registers a handler for a step. Several handlers on one step run in registration order.
  pub fn on<F, HandlerErr>(&mut self, step_name: &str, handler_fn: impl Fn(StepContext<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<StepControl, HandlerErr>> + Send + 'static,
    HandlerErr: Into<E> + Send + Sync + 'static,
  {
    self.step_mut(step_name);
    let handler: Handler<T, E> = Box::new(move |ctx| {
      let fut = handler_fn(ctx);
      Box::pin(async move { fut.await.map_err(Into::into) })
    });
    self.handlers.entry(step_name.to_string()).or_default().push(handler);
  }
}
