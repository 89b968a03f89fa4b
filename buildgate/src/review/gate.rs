//! Review gate.
//!
//! Reviewer lists are resolved against the build's current variables on
//! every call and never cached, so changes to the variables take effect
//! immediately.

use std::collections::HashMap;
use tracing::{info, warn};

use super::{ReviewAction, ReviewDescriptor, ReviewRequest};
use crate::build::BuildInstance;
use crate::errors::{ConflictError, NotFoundError, Resource, Result};
use crate::model::{ElementKind, ManualReviewParam};
use crate::params::{parse_env, split_user_list};
use crate::ports::Collaborators;

struct ResolvedReview {
    build: BuildInstance,
    variables: HashMap<String, String>,
    reviewers: Vec<String>,
    desc: Option<String>,
    params: Vec<ManualReviewParam>,
}

/// Authorizes reviewers and forwards their decisions.
#[derive(Debug, Clone)]
pub struct ReviewGate {
    collab: Collaborators,
}

impl ReviewGate {
    /// Creates a gate.
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    /// Describes a paused review task to one of its reviewers.
    pub async fn describe(&self, user: &str, build_id: &str, element_id: &str) -> Result<ReviewDescriptor> {
        let review = self.resolve(user, build_id, element_id).await?;

        let params = review
            .params
            .iter()
            .map(|param| substitute_param(param, &review.variables))
            .collect();

        Ok(ReviewDescriptor {
            project_id: review.build.project_id,
            pipeline_id: review.build.pipeline_id,
            build_id: review.build.build_id,
            desc: review.desc.as_deref().map(|desc| parse_env(desc, &review.variables)),
            reviewers: review.reviewers,
            params,
        })
    }

    /// Forwards a reviewer's decision to the engine.
    ///
    /// Parameter overrides have their variables substituted. An abort is
    /// also recorded as the build's cancel user.
    pub async fn decide(&self, user: &str, build_id: &str, element_id: &str, request: ReviewRequest) -> Result<()> {
        let review = self.resolve(user, build_id, element_id).await?;

        let request = ReviewRequest {
            params: request
                .params
                .iter()
                .map(|param| substitute_param(param, &review.variables))
                .collect(),
            ..request
        };

        self.collab
            .runtime
            .manual_decide_task(build_id, element_id, user, &request)
            .await?;

        if request.action == ReviewAction::Abort {
            self.collab.build_details.update_cancel_user(build_id, user).await?;
        }

        info!(
            build_id = %build_id,
            element_id = %element_id,
            user = %user,
            action = ?request.action,
            "review decided"
        );
        Ok(())
    }

    async fn resolve(&self, user: &str, build_id: &str, element_id: &str) -> Result<ResolvedReview> {
        let build = self
            .collab
            .runtime
            .get_build_info(build_id)
            .await?
            .ok_or_else(|| NotFoundError::build(build_id))?;

        let model = self
            .collab
            .repository
            .get_model(&build.pipeline_id, Some(build.version))
            .await?
            .ok_or_else(|| NotFoundError::model(format!("{}@{}", build.pipeline_id, build.version)))?;

        let (review_users, desc, params) = model
            .find_executable_element(element_id)
            .and_then(|element| match &element.kind {
                ElementKind::ManualReview {
                    review_users,
                    desc,
                    params,
                } => Some((review_users.clone(), desc.clone(), params.clone())),
                _ => None,
            })
            .ok_or_else(|| NotFoundError::new(Resource::ReviewElement, element_id))?;

        let variables = self.collab.runtime.get_all_variables(build_id).await?;
        let reviewers = split_user_list(&review_users, &variables);

        if !reviewers.iter().any(|reviewer| reviewer == user) {
            warn!(build_id = %build_id, element_id = %element_id, user = %user, "user is not a reviewer");
            return Err(ConflictError::ReviewerNotAuthorized {
                user: user.to_string(),
                element_id: element_id.to_string(),
            }
            .into());
        }

        Ok(ResolvedReview {
            build,
            variables,
            reviewers,
            desc,
            params,
        })
    }
}

fn substitute_param(param: &ManualReviewParam, variables: &HashMap<String, String>) -> ManualReviewParam {
    ManualReviewParam {
        value: parse_env(&param.value, variables),
        ..param.clone()
    }
}
