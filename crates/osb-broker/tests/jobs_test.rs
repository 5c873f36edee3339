// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the step-chain jobs, run one task at a time.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use osb_async::{JobError, QueueStore, queues};
use osb_broker::jobs::{
    CHECK_CHILDREN_STATUSES, CHECK_PARENT_STATUS, EXECUTE_PROVISIONING_STEP, INSTANCE_ID_ARG,
    STEP_NAME_ARG, check_task, step_task,
};
use osb_broker::service::ServiceError;
use osb_broker::{Error, InstanceStatus, Phase};
use serde_json::json;

use common::{FlakyStorage, Harness, TestManager, instance};

// ============================================================================
// Provisioning
// ============================================================================

#[tokio::test]
async fn test_provisioning_runs_each_step_once_in_order() {
    let harness = Harness::new(TestManager::new(&["create", "configure", "verify"])).await;

    let started = harness.broker.provision(instance("i1")).await.unwrap();
    assert_eq!(started.status, InstanceStatus::Provisioning);

    let pending = harness.store.list(queues::PENDING).await.unwrap();
    assert_eq!(pending.len(), 1);
    let first = osb_async::Task::from_json(&pending[0]).unwrap();
    assert_eq!(first.job_name(), EXECUTE_PROVISIONING_STEP);
    assert_eq!(first.arg(STEP_NAME_ARG), Some("create"));
    assert_eq!(first.arg(INSTANCE_ID_ARG), Some("i1"));

    let drained = harness.drain().await;
    assert!(drained.failures.is_empty());
    assert!(drained.deferred.is_empty());

    assert_eq!(
        harness.recorder.entries(),
        vec!["i1:create", "i1:configure", "i1:verify"]
    );
    let done = harness.stored("i1").await.unwrap();
    assert_eq!(done.status, InstanceStatus::Provisioned);
    assert_eq!(done.status_reason, None);
    assert_eq!(done.details["steps"], json!(["create", "configure", "verify"]));
    assert_eq!(done.details["plan"], json!("Small"));
    assert_eq!(done.secure_details, json!({"last_secret": "verify-secret"}));
}

#[tokio::test]
async fn test_step_returns_exactly_one_follow_up() {
    let harness = Harness::new(TestManager::new(&["create", "configure"])).await;
    harness.broker.provision(instance("i1")).await.unwrap();

    let follow_ups = harness
        .run(step_task(Phase::Provisioning, "i1", "create"))
        .await
        .unwrap();
    assert_eq!(follow_ups.len(), 1);
    assert_eq!(follow_ups[0].arg(STEP_NAME_ARG), Some("configure"));
    assert_eq!(
        harness.stored("i1").await.unwrap().status,
        InstanceStatus::Provisioning
    );

    let last = harness
        .run(step_task(Phase::Provisioning, "i1", "configure"))
        .await
        .unwrap();
    assert!(last.is_empty());
    assert_eq!(
        harness.stored("i1").await.unwrap().status,
        InstanceStatus::Provisioned
    );
}

#[tokio::test]
async fn test_empty_chain_completes_without_tasks() {
    let harness = Harness::new(TestManager::new(&[])).await;

    let done = harness.broker.provision(instance("i1")).await.unwrap();
    assert_eq!(done.status, InstanceStatus::Provisioned);
    assert_eq!(harness.store.len(queues::PENDING).await.unwrap(), 0);
}

#[tokio::test]
async fn test_provision_rejects_unknown_plan_and_duplicates() {
    let harness = Harness::new(TestManager::new(&["create"])).await;

    let mut bad = instance("i1");
    bad.plan_id = "huge".to_string();
    assert!(matches!(
        harness.broker.provision(bad).await,
        Err(Error::Service(ServiceError::UnknownPlan { .. }))
    ));
    assert!(harness.stored("i1").await.is_none());

    harness.broker.provision(instance("i1")).await.unwrap();
    assert!(matches!(
        harness.broker.provision(instance("i1")).await,
        Err(Error::InvalidRequest(_))
    ));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_step_marks_instance_and_stops_chain() {
    let harness =
        Harness::new(TestManager::new(&["create", "configure", "verify"]).failing_at("configure"))
            .await;
    harness.broker.provision(instance("i1")).await.unwrap();

    let drained = harness.drain().await;
    assert_eq!(drained.failures.len(), 1);
    assert!(!drained.failures[0].is_fatal());

    assert_eq!(harness.recorder.entries(), vec!["i1:create", "i1:configure"]);
    let failed = harness.stored("i1").await.unwrap();
    assert_eq!(failed.status, InstanceStatus::ProvisioningFailed);
    let reason = failed.status_reason.unwrap();
    assert!(reason.contains("configure"), "reason: {reason}");
    // Output of the steps that succeeded is kept.
    assert_eq!(failed.details["steps"], json!(["create"]));
}

#[tokio::test]
async fn test_unknown_step_fails_instance() {
    let harness = Harness::new(TestManager::new(&["create"])).await;
    harness.broker.provision(instance("i1")).await.unwrap();

    let err = harness
        .run(step_task(Phase::Provisioning, "i1", "bogus"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Failed(_)));

    let failed = harness.stored("i1").await.unwrap();
    assert_eq!(failed.status, InstanceStatus::ProvisioningFailed);
    assert_eq!(failed.status_reason.as_deref(), Some("unknown step bogus"));
    assert!(harness.recorder.entries().is_empty());
}

#[tokio::test]
async fn test_missing_instance_or_args_fail_without_writes() {
    let harness = Harness::new(TestManager::new(&["create"])).await;

    let err = harness
        .run(step_task(Phase::Provisioning, "ghost", "create"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Failed(_)));
    assert!(harness.stored("ghost").await.is_none());

    let no_step = check_task(EXECUTE_PROVISIONING_STEP, "ghost");
    assert!(matches!(
        harness.run(no_step).await,
        Err(JobError::Failed(_))
    ));
}

#[tokio::test]
async fn test_unrecordable_failure_is_fatal() {
    let storage = Arc::new(FlakyStorage::new());
    let harness = Harness::with_storage(
        TestManager::new(&["create"]).failing_at("create"),
        storage.clone(),
    )
    .await;
    harness.broker.provision(instance("i1")).await.unwrap();

    storage.fail_writes.store(true, Ordering::SeqCst);
    let drained = harness.drain().await;

    assert_eq!(drained.failures.len(), 1);
    assert!(drained.failures[0].is_fatal());
    // The failed status never made it to storage.
    assert_eq!(
        harness.stored("i1").await.unwrap().status,
        InstanceStatus::Provisioning
    );
}

// ============================================================================
// Updating and deprovisioning
// ============================================================================

#[tokio::test]
async fn test_update_promotes_parameters() {
    let harness = Harness::new(TestManager::new(&["create"]).with_update(&["resize", "restart"])).await;
    harness.broker.provision(instance("i1")).await.unwrap();
    harness.drain().await;

    let updating = harness
        .broker
        .update("i1", json!({"size": 4}))
        .await
        .unwrap();
    assert_eq!(updating.status, InstanceStatus::Updating);
    assert_eq!(updating.updating_parameters, Some(json!({"size": 4})));

    let drained = harness.drain().await;
    assert!(drained.failures.is_empty());

    let updated = harness.stored("i1").await.unwrap();
    assert_eq!(updated.status, InstanceStatus::Updated);
    assert_eq!(updated.provisioning_parameters, json!({"size": 4}));
    assert_eq!(updated.updating_parameters, None);
    assert_eq!(
        harness.recorder.entries(),
        vec!["i1:create", "i1:resize", "i1:restart"]
    );
}

#[tokio::test]
async fn test_update_refused_when_unsupported_or_not_ready() {
    let harness = Harness::new(TestManager::new(&["create"])).await;
    harness.broker.provision(instance("i1")).await.unwrap();

    // Still provisioning.
    assert!(matches!(
        harness.broker.update("i1", json!({})).await,
        Err(Error::InvalidState { .. })
    ));

    harness.drain().await;
    assert!(matches!(
        harness.broker.update("i1", json!({})).await,
        Err(Error::Service(ServiceError::UpdateNotSupported(_)))
    ));
    let unchanged = harness.stored("i1").await.unwrap();
    assert_eq!(unchanged.status, InstanceStatus::Provisioned);
    assert_eq!(unchanged.updating_parameters, None);

    assert!(matches!(
        harness.broker.update("ghost", json!({})).await,
        Err(Error::InstanceNotFound(_))
    ));
}

#[tokio::test]
async fn test_deprovision_deletes_instance() {
    let harness =
        Harness::new(TestManager::new(&["create"]).with_deprovision(&["drain", "drop"])).await;
    harness.broker.provision(instance("i1")).await.unwrap();
    harness.drain().await;

    let deprovisioning = harness.broker.deprovision("i1").await.unwrap().unwrap();
    assert_eq!(deprovisioning.status, InstanceStatus::Deprovisioning);

    let drained = harness.drain().await;
    assert!(drained.failures.is_empty());
    assert!(harness.stored("i1").await.is_none());
    assert!(matches!(
        harness.broker.instance("i1").await,
        Err(Error::InstanceNotFound(_))
    ));
    assert_eq!(
        harness.recorder.entries(),
        vec!["i1:create", "i1:drain", "i1:drop"]
    );
}

#[tokio::test]
async fn test_deprovision_with_empty_chain_deletes_immediately() {
    let harness = Harness::new(TestManager::new(&["create"]).with_deprovision(&[])).await;
    harness.broker.provision(instance("i1")).await.unwrap();
    harness.drain().await;

    assert!(harness.broker.deprovision("i1").await.unwrap().is_none());
    assert!(harness.stored("i1").await.is_none());
}

// ============================================================================
// Parent and children
// ============================================================================

#[tokio::test]
async fn test_child_waits_for_parent_then_sees_it() {
    let harness = Harness::new(TestManager::new(&["create"])).await;

    let child = instance("child").with_parent_alias("db");
    let deferred = harness.broker.provision(child).await.unwrap();
    assert_eq!(deferred.status, InstanceStatus::ProvisioningDeferred);

    // Parent does not exist yet: the check reschedules itself.
    let drained = harness.drain().await;
    assert_eq!(drained.deferred.len(), 1);
    let recheck = drained.deferred[0].clone();
    assert_eq!(recheck.job_name(), CHECK_PARENT_STATUS);
    let delay = recheck.execute_time().unwrap() - Utc::now();
    assert!(delay > chrono::Duration::seconds(55), "delay: {delay}");
    assert!(harness.recorder.entries().is_empty());

    harness
        .broker
        .provision(instance("parent").with_alias("db"))
        .await
        .unwrap();
    harness.drain().await;
    assert_eq!(
        harness.stored("parent").await.unwrap().status,
        InstanceStatus::Provisioned
    );

    let follow_ups = harness.run(recheck).await.unwrap();
    assert_eq!(follow_ups.len(), 1);
    assert_eq!(follow_ups[0].job_name(), EXECUTE_PROVISIONING_STEP);
    assert_eq!(
        harness.stored("child").await.unwrap().status,
        InstanceStatus::Provisioning
    );

    harness.submit(follow_ups).await;
    harness.drain().await;
    let child = harness.stored("child").await.unwrap();
    assert_eq!(child.status, InstanceStatus::Provisioned);
    assert_eq!(child.details["parent"], json!("parent"));
    assert!(child.parent.is_none());
}

#[tokio::test]
async fn test_child_fails_when_parent_failed() {
    let harness = Harness::new(TestManager::new(&["create"]).failing_at("create")).await;
    harness
        .broker
        .provision(instance("parent").with_alias("db"))
        .await
        .unwrap();
    harness.drain().await;
    assert_eq!(
        harness.stored("parent").await.unwrap().status,
        InstanceStatus::ProvisioningFailed
    );

    harness
        .broker
        .provision(instance("child").with_parent_alias("db"))
        .await
        .unwrap();
    let drained = harness.drain().await;
    assert!(drained.deferred.is_empty());
    assert_eq!(drained.failures.len(), 1);

    let child = harness.stored("child").await.unwrap();
    assert_eq!(child.status, InstanceStatus::ProvisioningFailed);
    assert_eq!(
        child.status_reason.as_deref(),
        Some("parent instance failed to provision")
    );
}

#[tokio::test]
async fn test_parent_deprovision_waits_for_children() {
    let harness = Harness::new(TestManager::new(&["create"])).await;
    harness
        .broker
        .provision(instance("parent").with_alias("db"))
        .await
        .unwrap();
    harness.drain().await;
    harness
        .broker
        .provision(instance("child").with_parent_alias("db"))
        .await
        .unwrap();
    let drained = harness.drain().await;
    assert!(drained.deferred.is_empty());

    let parent = harness.broker.deprovision("parent").await.unwrap().unwrap();
    assert_eq!(parent.status, InstanceStatus::Deprovisioning);

    let drained = harness.drain().await;
    assert_eq!(drained.deferred.len(), 1);
    let recheck = drained.deferred[0].clone();
    assert_eq!(recheck.job_name(), CHECK_CHILDREN_STATUSES);
    assert!(harness.stored("parent").await.is_some());

    harness.broker.deprovision("child").await.unwrap();
    harness.drain().await;
    assert!(harness.stored("child").await.is_none());

    let follow_ups = harness.run(recheck).await.unwrap();
    assert_eq!(follow_ups.len(), 1);
    harness.submit(follow_ups).await;
    harness.drain().await;
    assert!(harness.stored("parent").await.is_none());
    assert_eq!(
        harness.recorder.entries(),
        vec![
            "parent:create",
            "child:create",
            "child:teardown",
            "parent:teardown"
        ]
    );
}

#[tokio::test]
async fn test_stale_dependency_checks_are_dropped() {
    let harness = Harness::new(TestManager::new(&["create"])).await;
    harness.broker.provision(instance("i1")).await.unwrap();
    harness.drain().await;

    for job in [CHECK_PARENT_STATUS, CHECK_CHILDREN_STATUSES] {
        let follow_ups = harness.run(check_task(job, "i1")).await.unwrap();
        assert!(follow_ups.is_empty());
    }
    assert_eq!(
        harness.stored("i1").await.unwrap().status,
        InstanceStatus::Provisioned
    );
}
