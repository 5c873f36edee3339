// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parent and children checks.
//!
//! Both jobs poll: while the dependency is unresolved they return a copy of
//! themselves delayed by the dependency poll interval.

use osb_async::{JobError, JobResult, Task};
use tracing::{debug, info, warn};

use super::{INSTANCE_ID_ARG, Jobs, Phase, required_arg};
use crate::model::{Instance, InstanceStatus};

impl Jobs {
    async fn load_for_check(&self, task: &Task) -> Result<Instance, JobError> {
        let instance_id = required_arg(task, INSTANCE_ID_ARG)?;
        match self.storage.get_instance(instance_id).await {
            Ok(Some(instance)) => Ok(instance),
            Ok(None) => Err(JobError::failed(format!(
                "instance {instance_id} not found"
            ))),
            Err(e) => Err(JobError::failed(format!(
                "failed to load instance {instance_id}: {e}"
            ))),
        }
    }

    /// Start provisioning once the parent is usable.
    pub(super) async fn check_parent_status(&self, task: Task) -> JobResult {
        let instance = self.load_for_check(&task).await?;
        if instance.status != InstanceStatus::ProvisioningDeferred {
            debug!(
                instance_id = %instance.instance_id,
                status = %instance.status,
                "Instance is no longer waiting for its parent"
            );
            return Ok(Vec::new());
        }
        let Some(alias) = instance.parent_alias.clone() else {
            return self.start_from_job(Phase::Provisioning, instance).await;
        };

        let parent = match self.storage.get_instance_by_alias(&alias).await {
            Ok(parent) => parent,
            Err(e) => {
                warn!(
                    instance_id = %instance.instance_id,
                    parent_alias = %alias,
                    error = %e,
                    "Failed to load parent instance, will retry"
                );
                return Ok(vec![self.recheck(&task)]);
            }
        };

        match parent.map(|parent| parent.status) {
            None
            | Some(InstanceStatus::Provisioning)
            | Some(InstanceStatus::ProvisioningDeferred) => {
                debug!(
                    instance_id = %instance.instance_id,
                    parent_alias = %alias,
                    "Parent instance not provisioned yet"
                );
                Ok(vec![self.recheck(&task)])
            }
            Some(InstanceStatus::ProvisioningFailed) => {
                self.fail(
                    Phase::Provisioning,
                    instance,
                    "parent instance failed to provision".to_string(),
                )
                .await
            }
            Some(status) if status.is_ready() => {
                info!(
                    instance_id = %instance.instance_id,
                    parent_alias = %alias,
                    "Parent instance ready"
                );
                self.start_from_job(Phase::Provisioning, instance).await
            }
            Some(status) => {
                let reason = format!("parent instance is {status}");
                self.fail(Phase::Provisioning, instance, reason).await
            }
        }
    }

    /// Start deprovisioning once no children are left.
    pub(super) async fn check_children_statuses(&self, task: Task) -> JobResult {
        let instance = self.load_for_check(&task).await?;
        if instance.status != InstanceStatus::Deprovisioning {
            debug!(
                instance_id = %instance.instance_id,
                status = %instance.status,
                "Instance is no longer waiting for its children"
            );
            return Ok(Vec::new());
        }
        let Some(alias) = instance.alias.clone() else {
            return self.start_from_job(Phase::Deprovisioning, instance).await;
        };

        match self.storage.count_children(&alias).await {
            Ok(0) => {
                info!(instance_id = %instance.instance_id, "No child instances left");
                self.start_from_job(Phase::Deprovisioning, instance).await
            }
            Ok(children) => {
                debug!(
                    instance_id = %instance.instance_id,
                    children,
                    "Waiting for child instances to be deprovisioned"
                );
                Ok(vec![self.recheck(&task)])
            }
            Err(e) => {
                warn!(
                    instance_id = %instance.instance_id,
                    error = %e,
                    "Failed to count child instances, will retry"
                );
                Ok(vec![self.recheck(&task)])
            }
        }
    }
}
