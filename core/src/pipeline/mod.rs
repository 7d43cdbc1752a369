// core/src/pipeline/mod.rs

//! Named-step pipelines. The registration and verification flows are expressed as
//! pipelines whose handlers share one [`StepContext`].

pub mod context;
pub mod definition;
pub mod execution;
pub mod step;

pub use context::StepContext;
pub use definition::Pipeline;
pub use step::{Handler, PipelineResult, SkipCondition, StepControl, StepDef};
