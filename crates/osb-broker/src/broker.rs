// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Entry points for provisioning, updating and deprovisioning instances.
//!
//! Every operation records the new status and enqueues the first task of
//! the run, then returns. Callers poll [`Broker::instance`] for the outcome.
//! If the first task cannot be enqueued the instance is moved to the failed
//! status of the phase, since nothing would ever drive it forward.

use osb_async::{Task, TaskSubmitter};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::jobs::{CHECK_CHILDREN_STATUSES, CHECK_PARENT_STATUS, Jobs, Phase, check_task};
use crate::model::{Instance, InstanceStatus};

/// Asynchronous service broker operations.
#[derive(Clone)]
pub struct Broker {
    jobs: Jobs,
    submitter: TaskSubmitter,
}

impl Broker {
    /// Create a broker that enqueues through `submitter`.
    pub fn new(jobs: Jobs, submitter: TaskSubmitter) -> Self {
        Self { jobs, submitter }
    }

    /// Start provisioning `instance`.
    ///
    /// An instance with a parent alias waits in
    /// [`InstanceStatus::ProvisioningDeferred`] until the parent is ready.
    pub async fn provision(&self, mut instance: Instance) -> Result<Instance> {
        if instance.instance_id.is_empty() {
            return Err(Error::InvalidRequest("instance ID is empty".to_string()));
        }
        self.jobs.catalog().resolve(&instance)?;
        if self.find(&instance.instance_id).await?.is_some() {
            return Err(Error::InvalidRequest(format!(
                "instance {} already exists",
                instance.instance_id
            )));
        }
        instance.updating_parameters = None;
        instance.status_reason = None;
        instance.parent = None;

        if instance.parent_alias.is_some() {
            instance.status = InstanceStatus::ProvisioningDeferred;
            self.jobs.storage().write_instance(&instance).await?;
            let check = check_task(CHECK_PARENT_STATUS, &instance.instance_id);
            self.submit_or_fail(Phase::Provisioning, instance.clone(), &check)
                .await?;
        } else {
            self.begin(Phase::Provisioning, instance.clone()).await?;
        }

        info!(
            instance_id = %instance.instance_id,
            service_id = %instance.service_id,
            plan_id = %instance.plan_id,
            "Provisioning requested"
        );
        self.instance(&instance.instance_id).await
    }

    /// Start applying `parameters` to a provisioned instance.
    pub async fn update(&self, instance_id: &str, parameters: Value) -> Result<Instance> {
        let mut instance = self.instance(instance_id).await?;
        if !instance.status.is_ready() || instance.status == InstanceStatus::Updating {
            return Err(Error::InvalidState {
                instance_id: instance_id.to_string(),
                status: instance.status,
                operation: "update",
            });
        }
        instance.updating_parameters = Some(parameters);
        self.begin(Phase::Updating, instance).await?;

        info!(instance_id = %instance_id, "Update requested");
        self.instance(instance_id).await
    }

    /// Start tearing an instance down.
    ///
    /// An instance with an alias waits until no other instance names it as
    /// parent. Returns `None` when the instance was deleted right away.
    pub async fn deprovision(&self, instance_id: &str) -> Result<Option<Instance>> {
        let mut instance = self.instance(instance_id).await?;
        if matches!(
            instance.status,
            InstanceStatus::Provisioning | InstanceStatus::Updating | InstanceStatus::Deprovisioning
        ) {
            return Err(Error::InvalidState {
                instance_id: instance_id.to_string(),
                status: instance.status,
                operation: "deprovision",
            });
        }

        if instance.alias.is_some() {
            instance.status = InstanceStatus::Deprovisioning;
            instance.status_reason = None;
            self.jobs.storage().write_instance(&instance).await?;
            let check = check_task(CHECK_CHILDREN_STATUSES, instance_id);
            self.submit_or_fail(Phase::Deprovisioning, instance, &check)
                .await?;
        } else {
            self.begin(Phase::Deprovisioning, instance).await?;
        }

        info!(instance_id = %instance_id, "Deprovisioning requested");
        self.find(instance_id).await
    }

    /// Current state of an instance.
    pub async fn instance(&self, instance_id: &str) -> Result<Instance> {
        self.find(instance_id)
            .await?
            .ok_or_else(|| Error::InstanceNotFound(instance_id.to_string()))
    }

    async fn find(&self, instance_id: &str) -> Result<Option<Instance>> {
        Ok(self.jobs.storage().get_instance(instance_id).await?)
    }

    async fn begin(&self, phase: Phase, instance: Instance) -> Result<()> {
        if let Some(task) = self.jobs.start(phase, instance.clone()).await? {
            self.submit_or_fail(phase, instance, &task).await?;
        }
        Ok(())
    }

    /// Enqueue the task that drives `instance` through `phase`. On failure
    /// the instance is marked failed and the enqueue error returned.
    async fn submit_or_fail(&self, phase: Phase, mut instance: Instance, task: &Task) -> Result<()> {
        let Err(e) = self.submitter.submit(task).await else {
            return Ok(());
        };

        instance.status = phase.failed_status();
        instance.status_reason = Some(format!("failed to enqueue {}: {e}", task.job_name()));
        instance.parent = None;
        match self.jobs.storage().write_instance(&instance).await {
            Ok(()) => warn!(
                instance_id = %instance.instance_id,
                status = %instance.status,
                error = %e,
                "Could not enqueue first task"
            ),
            Err(write_err) => error!(
                instance_id = %instance.instance_id,
                error = %e,
                write_error = %write_err,
                "Could not enqueue first task or record the failure"
            ),
        }
        Err(e.into())
    }
}
