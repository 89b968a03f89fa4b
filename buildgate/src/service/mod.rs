//! The public surface of the orchestration core.

mod facade;
mod requests;

#[cfg(test)]
mod integration_tests;

pub use facade::BuildService;
pub use requests::{StartRequest, SubPipelineStart};
