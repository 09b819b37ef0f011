//! Request types and the open-loop Poisson load generator.

mod load_generator;
mod request;

pub use load_generator::{LoadGenConfig, LoadGenHandle, spawn_load_generator};
pub use request::{PipelineItem, PullFeedback, Request};
