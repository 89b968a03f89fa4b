//! Testing utilities for the orchestration core.
//!
//! This module provides:
//! - In-memory collaborators with inspection helpers
//! - Pipeline model fixtures
//! - A harness wiring everything into [`crate::ports::Collaborators`]

mod fixtures;
mod mocks;

pub use fixtures::{ModelFixture, TestHarness};
pub use mocks::{
    AllowAllPermissions, CancelRecord, InMemoryBuildDetailStore, InMemoryBuildRuntime,
    InMemoryPipelineRepository, InMemoryStartupParamStore, LogLine, RecordingLogSink,
    RejectingInterceptor, ReviewDecision, SlowInterceptor,
};
