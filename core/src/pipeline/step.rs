// core/src/pipeline/step.rs

//! Step definitions and the signals a step handler returns.

use super::StepContext;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Signal from a handler indicating whether the flow should continue or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  Continue,
  /// Halt the flow; no further handlers or steps run.
  Stop,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  Completed,
  /// A handler returned `StepControl::Stop`.
  Stopped,
}

/// Evaluated against the flow state before a step; `true` skips the step.
pub type SkipCondition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync + 'static>;

pub type HandlerFuture<E> = Pin<Box<dyn Future<Output = Result<StepControl, E>> + Send>>;

pub type Handler<T, E> = Box<dyn Fn(StepContext<T>) -> HandlerFuture<E> + Send + Sync>;

#[derive(Clone)]
pub struct StepDef<T: 'static + Send + Sync> {
  pub name: String,
  /// An optional step without handlers is skipped instead of failing the run.
  pub optional: bool,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: 'static + Send + Sync> std::fmt::Debug for StepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}
