//! Error types for the build orchestration core.
//!
//! Every public operation returns [`BuildError`]. Its variants map onto a
//! small taxonomy ([`ErrorKind`]) that transport layers use to pick a
//! status code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, BuildError>;

/// The main error type for build orchestration.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A pipeline, build, model, or element could not be found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// The acting user lacks a permission on the pipeline.
    #[error("Permission denied: user '{user}' may not {permission} pipeline '{pipeline_id}'")]
    PermissionDenied {
        /// The acting user.
        user: String,
        /// The pipeline being acted on.
        pipeline_id: String,
        /// The permission that was checked.
        permission: String,
    },

    /// The request is not acceptable for the pipeline as configured.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Another launch of the same pipeline holds the throttle token.
    #[error("Pipeline '{pipeline_id}' was started too frequently, try again later")]
    RateLimited {
        /// The throttled pipeline.
        pipeline_id: String,
    },

    /// A launch interceptor vetoed the start.
    #[error("Pipeline start rejected [{status}]: {message}")]
    InterceptionRejected {
        /// Interceptor status code.
        status: i32,
        /// Human readable reason.
        message: String,
    },

    /// The request conflicts with the current build state.
    #[error("{0}")]
    Conflict(#[from] ConflictError),

    /// A distributed lock could not be acquired in time.
    #[error("Timed out acquiring lock '{key}' after {timeout_ms}ms")]
    LockTimeout {
        /// The lock key.
        key: String,
        /// How long the caller waited.
        timeout_ms: u64,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An unexpected persistence or transport failure.
    #[error("Unexpected failure: {0}")]
    Unexpected(#[from] anyhow::Error),
}

/// Coarse classification of [`BuildError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Something referenced does not exist.
    NotFound,
    /// Authorization failure.
    PermissionDenied,
    /// Invalid request.
    Validation,
    /// Throttle token unavailable.
    RateLimited,
    /// Interceptor veto.
    InterceptionRejected,
    /// State conflict.
    Conflict,
    /// Lock acquisition timed out.
    Timeout,
    /// Anything else.
    Fatal,
}

impl BuildError {
    /// Creates a permission denied error.
    #[must_use]
    pub fn permission_denied(
        user: impl Into<String>,
        pipeline_id: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            user: user.into(),
            pipeline_id: pipeline_id.into(),
            permission: permission.into(),
        }
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(pipeline_id: impl Into<String>) -> Self {
        Self::RateLimited {
            pipeline_id: pipeline_id.into(),
        }
    }

    /// Creates an interception rejected error.
    #[must_use]
    pub fn rejected(status: i32, message: impl Into<String>) -> Self {
        Self::InterceptionRejected {
            status,
            message: message.into(),
        }
    }

    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Validation(_) => ErrorKind::Validation,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::InterceptionRejected { .. } => ErrorKind::InterceptionRejected,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::LockTimeout { .. } => ErrorKind::Timeout,
            Self::Serialization(_) | Self::Unexpected(_) => ErrorKind::Fatal,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::NotFound(err) => {
                map.insert("resource".to_string(), serde_json::json!(err.resource));
                map.insert("id".to_string(), serde_json::json!(err.id));
            }
            Self::InterceptionRejected { status, .. } => {
                map.insert("status".to_string(), serde_json::json!(status));
            }
            Self::Conflict(ConflictError::AlreadyCancelledByOther { user, .. }) => {
                map.insert("cancel_user".to_string(), serde_json::json!(user));
            }
            _ => {}
        }

        map
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// What kind of resource was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// A pipeline definition.
    Pipeline,
    /// A pipeline model at some version.
    Model,
    /// A build instance.
    Build,
    /// A task or container targeted by a retry.
    Task,
    /// A manual review element.
    ReviewElement,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipeline => write!(f, "pipeline"),
            Self::Model => write!(f, "pipeline model"),
            Self::Build => write!(f, "build"),
            Self::Task => write!(f, "task"),
            Self::ReviewElement => write!(f, "review element"),
        }
    }
}

/// Error raised when a referenced resource does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("The {resource} '{id}' does not exist")]
pub struct NotFoundError {
    /// The kind of resource.
    pub resource: Resource,
    /// Its identifier.
    pub id: String,
}

impl NotFoundError {
    /// Creates a new not found error.
    #[must_use]
    pub fn new(resource: Resource, id: impl Into<String>) -> Self {
        Self {
            resource,
            id: id.into(),
        }
    }

    /// A missing pipeline.
    #[must_use]
    pub fn pipeline(id: impl Into<String>) -> Self {
        Self::new(Resource::Pipeline, id)
    }

    /// A missing model.
    #[must_use]
    pub fn model(id: impl Into<String>) -> Self {
        Self::new(Resource::Model, id)
    }

    /// A missing build.
    #[must_use]
    pub fn build(id: impl Into<String>) -> Self {
        Self::new(Resource::Build, id)
    }
}

/// Errors describing a request the pipeline does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required start parameter was not supplied.
    #[error("Parameter '{0}' is required to start the pipeline")]
    MissingRequiredParameter(String),

    /// The pipeline has no enabled manual trigger.
    #[error("Pipeline '{0}' cannot be started manually")]
    ManualStartNotAllowed(String),

    /// The pipeline has no enabled remote trigger.
    #[error("Pipeline '{0}' cannot be started remotely")]
    RemoteStartNotAllowed(String),

    /// A container targeted by a job retry has no elements to resume from.
    #[error("Container '{0}' has no elements to retry from")]
    EmptyRetryContainer(String),

    /// A declared parameter uses a key reserved for bookkeeping.
    #[error("Parameter id '{0}' is reserved")]
    ReservedParameterId(String),

    /// The pipeline model has no trigger container in stage 0.
    #[error("Pipeline model '{0}' has no trigger container")]
    MissingTriggerContainer(String),

    /// Walking a sub-pipeline parent chain exceeded the configured depth.
    #[error("Parent chain of build '{build_id}' exceeds {max_depth} levels")]
    ParentChainTooDeep {
        /// The build the shutdown started from.
        build_id: String,
        /// The configured limit.
        max_depth: u32,
    },
}

/// Errors caused by the current state of a build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    /// Retry was requested for a build that did not fail.
    #[error("Build '{build_id}' is {status}, only failed builds can be retried")]
    RetryOfNonFailedBuild {
        /// The build.
        build_id: String,
        /// Its current status.
        status: String,
    },

    /// Somebody else already cancelled the build.
    #[error("Build '{build_id}' was already cancelled by '{user}'")]
    AlreadyCancelledByOther {
        /// The build.
        build_id: String,
        /// The user the cancel is attributed to.
        user: String,
    },

    /// The acting user is not in the resolved reviewer list.
    #[error("User '{user}' is not a reviewer of element '{element_id}'")]
    ReviewerNotAuthorized {
        /// The acting user.
        user: String,
        /// The review element.
        element_id: String,
    },
}
