//! Interceptor chain for ordered launch checks.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::build::{PipelineInfo, StartType};
use crate::model::PipelineModel;

/// Verdict of a launch check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptResult {
    /// Whether the launch may proceed.
    pub ok: bool,
    /// Status code reported to the caller on rejection.
    pub status: i32,
    /// Rejection message.
    pub message: String,
}

impl InterceptResult {
    /// Lets the launch proceed.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            status: 0,
            message: String::new(),
        }
    }

    /// Vetoes the launch.
    #[must_use]
    pub fn reject(status: i32, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status,
            message: message.into(),
        }
    }
}

/// What an interceptor sees of a pending launch.
#[derive(Debug, Clone, Copy)]
pub struct InterceptContext<'a> {
    /// The pipeline being launched, with its pinned version.
    pub pipeline: &'a PipelineInfo,
    /// The model after quality rules were filled in.
    pub model: &'a PipelineModel,
    /// How the build is being started.
    pub start_type: StartType,
}

/// A pre-start check.
#[async_trait]
pub trait LaunchInterceptor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Returns the interceptor's priority (lower = earlier execution).
    fn priority(&self) -> i32 {
        0
    }

    /// Inspects the pending launch.
    async fn intercept(&self, ctx: &InterceptContext<'_>) -> InterceptResult;
}

/// An ordered set of launch interceptors.
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn LaunchInterceptor>>,
}

impl InterceptorChain {
    /// Creates a new empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Adds an interceptor to the chain.
    pub fn add(&mut self, interceptor: Arc<dyn LaunchInterceptor>) {
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.priority());
    }

    /// Adds an interceptor, builder style.
    #[must_use]
    pub fn with(mut self, interceptor: Arc<dyn LaunchInterceptor>) -> Self {
        self.add(interceptor);
        self
    }

    /// Runs every interceptor in priority order and stops at the first
    /// rejection.
    pub async fn filter(&self, ctx: &InterceptContext<'_>) -> InterceptResult {
        for interceptor in &self.interceptors {
            let result = interceptor.intercept(ctx).await;
            if !result.ok {
                warn!(
                    interceptor = interceptor.name(),
                    pipeline_id = %ctx.pipeline.pipeline_id,
                    status = result.status,
                    message = %result.message,
                    "launch rejected"
                );
                return result;
            }
            debug!(interceptor = interceptor.name(), pipeline_id = %ctx.pipeline.pipeline_id, "launch check passed");
        }
        InterceptResult::ok()
    }

    /// Returns the number of interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.interceptors.iter().map(|i| i.name()).collect();
        f.debug_struct("InterceptorChain").field("interceptors", &names).finish()
    }
}
