//! Review request and descriptor types.

use serde::{Deserialize, Serialize};

use crate::model::ManualReviewParam;

/// A reviewer's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAction {
    /// Let the build continue.
    Process,
    /// Stop the build.
    Abort,
}

/// A decision submitted by a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// The decision.
    pub action: ReviewAction,
    /// Parameter overrides.
    #[serde(default)]
    pub params: Vec<ManualReviewParam>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest: Option<String>,
}

impl ReviewRequest {
    /// Approves without overrides.
    #[must_use]
    pub fn process() -> Self {
        Self {
            action: ReviewAction::Process,
            params: Vec::new(),
            suggest: None,
        }
    }

    /// Rejects without overrides.
    #[must_use]
    pub fn abort() -> Self {
        Self {
            action: ReviewAction::Abort,
            params: Vec::new(),
            suggest: None,
        }
    }

    /// Adds a parameter override.
    #[must_use]
    pub fn with_param(mut self, param: ManualReviewParam) -> Self {
        self.params.push(param);
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_suggest(mut self, suggest: impl Into<String>) -> Self {
        self.suggest = Some(suggest.into());
        self
    }
}

/// What a reviewer is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDescriptor {
    /// Owning project.
    pub project_id: String,
    /// Pipeline id.
    pub pipeline_id: String,
    /// Build waiting for the review.
    pub build_id: String,
    /// Resolved reviewers.
    pub reviewers: Vec<String>,
    /// Description with variables substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Parameters with variables substituted.
    pub params: Vec<ManualReviewParam>,
}
