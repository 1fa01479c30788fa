pub mod orchestrator;
pub mod sampler;

pub use orchestrator::{Pipeline, PipelineOutcome, ScoreRequest};
