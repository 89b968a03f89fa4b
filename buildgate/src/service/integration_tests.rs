//! End-to-end tests of the service over the in-memory collaborators.

use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{BuildService, StartRequest, SubPipelineStart};
use crate::build::{BuildStatus, ChannelCode, ParamMap, PipelineInfo, ReservedKey, StartType};
use crate::cancellation::WorkerResult;
use crate::config::BuildCoreConfig;
use crate::errors::{BuildError, ConflictError, ValidationError};
use crate::interceptors::InterceptorChain;
use crate::model::{BuildFormProperty, ManualReviewParam};
use crate::ports::MockPermissionService;
use crate::review::ReviewRequest;
use crate::testing::{ModelFixture, RejectingInterceptor, SlowInterceptor, TestHarness};

fn pipeline() -> PipelineInfo {
    PipelineInfo::new("proj", "p-1", "demo", "owner")
}

fn model() -> ModelFixture {
    ModelFixture::new("demo")
        .with_param(BuildFormProperty::new("env", json!("dev")).required())
        .with_param(BuildFormProperty::new("notify", json!(false)))
        .with_job("job-1", &["t-1", "t-2"])
        .with_review("job-2", "review-1", &["${approvers}"], None, vec![])
}

fn service(harness: &TestHarness, chain: InterceptorChain) -> BuildService {
    BuildService::new(harness.collaborators(), chain, BuildCoreConfig::default())
}

fn published() -> (TestHarness, BuildService) {
    let harness = TestHarness::new();
    harness.publish(pipeline(), model().build());
    let service = service(&harness, InterceptorChain::new());
    (harness, service)
}

fn user_params(snapshot: &ParamMap) -> ParamMap {
    snapshot
        .iter()
        .filter(|(key, _)| !ReservedKey::is_reserved(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[tokio::test]
async fn test_concurrent_starts_admit_one() {
    let harness = TestHarness::new();
    harness.publish(pipeline(), model().build());
    let chain = InterceptorChain::new().with(Arc::new(SlowInterceptor::new(Duration::from_millis(100))));
    let service = service(&harness, chain);

    let starts = (0..5).map(|_| {
        let service = service.clone();
        async move {
            service
                .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
                .await
        }
    });
    let results = join_all(starts).await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let throttled = results
        .iter()
        .filter(|r| matches!(r, Err(BuildError::RateLimited { .. })))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(throttled, 4);
    assert_eq!(harness.runtime.start_count(), 1);
}

#[tokio::test]
async fn test_manual_start_snapshots_per_build() {
    let (harness, service) = published();

    let first = service
        .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap();
    let second = service
        .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "staging"))
        .await
        .unwrap();

    let first_snapshot = harness.param_store.snapshot(&first).unwrap();
    let second_snapshot = harness.param_store.snapshot(&second).unwrap();
    assert_eq!(first_snapshot["env"], json!("prod"));
    assert_eq!(second_snapshot["env"], json!("staging"));
    assert_eq!(second_snapshot["notify"], json!(false));
    assert_eq!(second_snapshot["pipeline.start.type"], json!("MANUAL"));

    let params = service.build_parameters("alice", "proj", "p-1", &first).await.unwrap();
    assert!(params.iter().any(|p| p.key == "env" && p.value == json!("prod")));
}

#[tokio::test]
async fn test_manual_start_requires_parameters() {
    let (harness, service) = published();
    let err = service
        .start_manual(StartRequest::new("alice", "proj", "p-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Validation(ValidationError::MissingRequiredParameter(_))));
    assert_eq!(harness.runtime.start_count(), 0);
}

#[tokio::test]
async fn test_start_on_wrong_channel_is_not_found() {
    let (_, service) = published();
    let err = service
        .start_manual(
            StartRequest::new("alice", "proj", "p-1")
                .with_value("env", "prod")
                .with_channel(ChannelCode::Gitci),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::NotFound(_)));
}

#[tokio::test]
async fn test_remote_start_needs_remote_trigger() {
    let (_, manual_only) = published();
    let err = manual_only
        .start_remote(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Validation(ValidationError::RemoteStartNotAllowed(_))));

    let harness = TestHarness::new();
    harness.publish(pipeline(), model().with_remote_trigger().build());
    let remote = service(&harness, InterceptorChain::new());
    let build_id = remote
        .start_remote(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap();
    assert_eq!(harness.runtime.build(&build_id).unwrap().trigger, StartType::Remote);
}

#[tokio::test]
async fn test_webhook_start_names_webhook_user() {
    let (harness, service) = published();
    let build_id = service
        .start_webhook(
            StartRequest::new("owner", "proj", "p-1")
                .with_value("env", "prod")
                .with_webhook_user("pusher"),
        )
        .await
        .unwrap();

    let snapshot = harness.param_store.snapshot(&build_id).unwrap();
    assert_eq!(snapshot["pipeline.start.user.id"], json!("owner"));
    assert_eq!(snapshot["pipeline.start.user.name"], json!("pusher"));
    assert_eq!(snapshot["pipeline.start.type"], json!("WEB_HOOK"));
}

#[tokio::test]
async fn test_interceptor_veto_surfaces() {
    let harness = TestHarness::new();
    harness.publish(pipeline(), model().build());
    let chain = InterceptorChain::new().with(Arc::new(RejectingInterceptor::new(2101, "queue full")));
    let service = service(&harness, chain);

    let err = service
        .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap_err();
    match err {
        BuildError::InterceptionRejected { status, message } => {
            assert_eq!(status, 2101);
            assert_eq!(message, "queue full");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.runtime.start_count(), 0);
}

#[tokio::test]
async fn test_permission_denied_blocks_start() {
    let mut permissions = MockPermissionService::new();
    permissions
        .expect_validate()
        .times(1)
        .returning(|user, _, pipeline_id, permission| {
            Err(BuildError::permission_denied(user, pipeline_id, permission.to_string()))
        });

    let harness = TestHarness::new().with_permissions(Arc::new(permissions));
    harness.publish(pipeline(), model().build());
    let service = service(&harness, InterceptorChain::new());

    let err = service
        .start_manual(StartRequest::new("mallory", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::PermissionDenied { ref user, .. } if user == "mallory"));
    assert_eq!(harness.runtime.start_count(), 0);

    // Internal callers bypass the check.
    service
        .start_manual(
            StartRequest::new("mallory", "proj", "p-1")
                .with_value("env", "prod")
                .without_permission_check(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_full_retry_reuses_user_parameters() {
    let (harness, service) = published();
    let original = service
        .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap();

    let err = service
        .retry("alice", "proj", "p-1", &original, None, true)
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Conflict(ConflictError::RetryOfNonFailedBuild { .. })));

    harness.runtime.set_status(&original, BuildStatus::Failed);
    let retried = service
        .retry("bob", "proj", "p-1", &original, None, true)
        .await
        .unwrap();

    let before = harness.param_store.snapshot(&original).unwrap();
    let after = harness.param_store.snapshot(&retried).unwrap();
    assert_eq!(user_params(&after), user_params(&before));
    assert!(!after.contains_key("pipeline.retry.count"));
    assert_eq!(after["pipeline.retry.build.id"], json!(original));
    assert_eq!(after["pipeline.start.user.id"], json!("bob"));
    assert_ne!(retried, original);
}

#[tokio::test]
async fn test_task_retry_of_empty_container() {
    let harness = TestHarness::new();
    harness.publish(pipeline(), model().with_empty_job("job-empty").build());
    let service = service(&harness, InterceptorChain::new());
    let build_id = harness.runtime.insert_build("p-1", 1, BuildStatus::Failed);

    let err = service
        .retry("alice", "proj", "p-1", &build_id, Some("job-empty"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Validation(ValidationError::EmptyRetryContainer(_))));
    assert_eq!(harness.runtime.start_count(), 0);
}

#[tokio::test]
async fn test_timer_start() {
    let (harness, service) = published();

    let missing = service
        .start_timer("owner", "proj", "p-gone", ParamMap::new(), true)
        .await
        .unwrap();
    assert!(missing.is_none());

    let build_id = service
        .start_timer("owner", "proj", "p-1", ParamMap::new(), true)
        .await
        .unwrap()
        .unwrap();
    let build = harness.runtime.build(&build_id).unwrap();
    assert_eq!(build.trigger, StartType::TimeTrigger);
    assert_eq!(build.start_user, "owner");
    assert_eq!(harness.runtime.launched(&build_id).unwrap()["env"], json!("dev"));
}

#[tokio::test]
async fn test_timer_starts_are_not_throttled() {
    let harness = TestHarness::new();
    harness.publish(pipeline(), model().build());
    let chain = InterceptorChain::new().with(Arc::new(SlowInterceptor::new(Duration::from_millis(50))));
    let service = service(&harness, chain);

    let starts = (0..3).map(|_| service.start_timer("owner", "proj", "p-1", ParamMap::new(), false));
    let results = join_all(starts).await;

    assert!(results.iter().all(|r| matches!(r, Ok(Some(_)))));
    assert_eq!(harness.runtime.start_count(), 3);
}

#[tokio::test]
async fn test_sub_pipeline_chain_and_service_shutdown() {
    let (harness, service) = published();
    let parent = service
        .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap();
    harness.runtime.set_status(&parent, BuildStatus::Running);

    let child = service
        .start_sub_pipeline(
            SubPipelineStart::new("alice", "proj", "p-1", "p-1", &parent, "t-2")
                .with_params(ParamMap::from([("env".to_string(), json!("child"))])),
        )
        .await
        .unwrap();
    harness.runtime.set_status(&child, BuildStatus::Running);

    let grandchild = service
        .start_sub_pipeline(SubPipelineStart::new("alice", "proj", "p-1", "p-1", &child, "t-1"))
        .await
        .unwrap();
    harness.runtime.set_status(&grandchild, BuildStatus::Running);

    let child_build = harness.runtime.build(&child).unwrap();
    assert!(child_build.is_sub_pipeline());
    assert_eq!(child_build.start_user, "owner");
    assert_eq!(child_build.parent_build_id.as_deref(), Some(parent.as_str()));
    assert_eq!(
        harness.param_store.snapshot(&child).unwrap()["pipeline.start.user.name"],
        json!("alice")
    );
    assert_eq!(
        harness.runtime.sub_build_links(),
        vec![
            (parent.clone(), "t-2".to_string(), child.clone()),
            (child.clone(), "t-1".to_string(), grandchild.clone()),
        ]
    );

    service
        .service_shutdown("proj", "p-1", &grandchild, ChannelCode::Bs)
        .await
        .unwrap();

    assert_eq!(harness.runtime.build(&parent).unwrap().status, BuildStatus::Failed);
    assert_eq!(harness.runtime.build(&child).unwrap().status, BuildStatus::Running);
    assert_eq!(harness.runtime.build(&grandchild).unwrap().status, BuildStatus::Running);
}

#[tokio::test]
async fn test_double_user_shutdown() {
    let (harness, service) = published();
    let build_id = service
        .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
        .await
        .unwrap();

    service
        .user_shutdown("alice", "proj", "p-1", &build_id, ChannelCode::Bs, true)
        .await
        .unwrap();
    service
        .user_shutdown("alice", "proj", "p-1", &build_id, ChannelCode::Bs, true)
        .await
        .unwrap();
    let err = service
        .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Bs, true)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Conflict(ConflictError::AlreadyCancelledByOther { .. })));
    assert_eq!(harness.runtime.cancellations().len(), 1);
    assert_eq!(harness.runtime.build(&build_id).unwrap().status, BuildStatus::Canceled);
}

#[tokio::test]
async fn test_review_through_service() {
    let (harness, service) = published();
    let build_id = harness.runtime.insert_build("p-1", 1, BuildStatus::Running);
    harness.runtime.set_variables(
        &build_id,
        HashMap::from([("approvers".to_string(), "carol,dave".to_string())]),
    );

    let descriptor = service
        .review_describe("dave", "p-1", &build_id, "review-1")
        .await
        .unwrap();
    assert_eq!(descriptor.reviewers, vec!["carol", "dave"]);

    service
        .review_decide(
            "carol",
            "p-1",
            &build_id,
            "review-1",
            ReviewRequest::process().with_param(ManualReviewParam::new("approved", "yes")),
        )
        .await
        .unwrap();
    assert_eq!(harness.runtime.decisions().len(), 1);
}

#[tokio::test]
async fn test_startup_info_uses_latest_parameters() {
    let harness = TestHarness::new();
    harness.publish(pipeline(), model().with_latest_parameters().with_element_skip().build());
    let service = service(&harness, InterceptorChain::new());

    let last = harness.runtime.insert_build("p-1", 1, BuildStatus::Succeed);
    harness.param_store.insert(&last, r#"{"env": "staging", "notify": "True"}"#);

    let info = service
        .manual_startup_info("alice", "proj", "p-1", ChannelCode::Bs, true)
        .await
        .unwrap();
    assert!(info.can_manual_startup);
    assert!(info.can_element_skip);
    let defaults: HashMap<&str, serde_json::Value> = info
        .params
        .iter()
        .map(|p| (p.id.as_str(), p.default_value.clone()))
        .collect();
    assert_eq!(defaults["env"], json!("staging"));
    assert_eq!(defaults["notify"], json!(true));
}

#[tokio::test]
async fn test_worker_build_finish_through_service() {
    let (harness, service) = published();
    let build_id = harness.runtime.insert_build("p-1", 1, BuildStatus::Running);

    service
        .worker_build_finish(&build_id, "job-1", &WorkerResult::success())
        .await
        .unwrap();

    let events = harness.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].build_id(), build_id);
}
