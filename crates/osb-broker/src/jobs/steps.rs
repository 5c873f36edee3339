// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Running one step of a chain, and starting or finishing a chain.

use osb_async::{JobError, JobResult, Task};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{INSTANCE_ID_ARG, Jobs, STEP_NAME_ARG, required_arg, step_task};
use crate::error::Result;
use crate::model::{Instance, InstanceStatus};
use crate::service::{Plan, ServiceError, StepChain};

/// Which chain of a service a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Bring a new instance up.
    Provisioning,
    /// Apply new parameters to an existing instance.
    Updating,
    /// Tear an instance down.
    Deprovisioning,
}

impl Phase {
    /// Every phase.
    pub const ALL: [Phase; 3] = [Phase::Provisioning, Phase::Updating, Phase::Deprovisioning];

    /// Job that runs steps of this phase.
    pub fn job_name(self) -> &'static str {
        match self {
            Phase::Provisioning => super::EXECUTE_PROVISIONING_STEP,
            Phase::Updating => super::EXECUTE_UPDATING_STEP,
            Phase::Deprovisioning => super::EXECUTE_DEPROVISIONING_STEP,
        }
    }

    /// Status while steps of this phase run.
    pub fn running_status(self) -> InstanceStatus {
        match self {
            Phase::Provisioning => InstanceStatus::Provisioning,
            Phase::Updating => InstanceStatus::Updating,
            Phase::Deprovisioning => InstanceStatus::Deprovisioning,
        }
    }

    /// Status after a step of this phase fails.
    pub fn failed_status(self) -> InstanceStatus {
        match self {
            Phase::Provisioning => InstanceStatus::ProvisioningFailed,
            Phase::Updating => InstanceStatus::UpdatingFailed,
            Phase::Deprovisioning => InstanceStatus::DeprovisioningFailed,
        }
    }
}

impl Jobs {
    /// The chain `phase` runs on `instance`, and the instance's plan.
    pub(crate) fn chain(
        &self,
        phase: Phase,
        instance: &Instance,
    ) -> std::result::Result<(StepChain, Plan), ServiceError> {
        let (service, plan) = self.catalog.resolve(instance)?;
        let chain = match phase {
            Phase::Provisioning => service.manager.provisioner(instance)?,
            Phase::Updating => service.manager.updater(instance)?,
            Phase::Deprovisioning => service.manager.deprovisioner(instance)?,
        };
        Ok((chain, plan.clone()))
    }

    /// Put `instance` into `phase` and return the task for its first step.
    ///
    /// An empty chain completes on the spot and returns `None`. Nothing is
    /// written if the chain cannot be resolved.
    pub(crate) async fn start(&self, phase: Phase, mut instance: Instance) -> Result<Option<Task>> {
        let (chain, _plan) = self.chain(phase, &instance)?;
        let Some(first) = chain.first_step_name() else {
            debug!(
                instance_id = %instance.instance_id,
                phase = ?phase,
                "Step chain is empty, completing immediately"
            );
            self.finish(phase, instance).await?;
            return Ok(None);
        };

        instance.status = phase.running_status();
        instance.status_reason = None;
        instance.parent = None;
        self.storage.write_instance(&instance).await?;
        info!(
            instance_id = %instance.instance_id,
            phase = ?phase,
            steps = chain.len(),
            "Step chain started"
        );
        Ok(Some(step_task(phase, &instance.instance_id, first)))
    }

    /// Mark `instance` as done with `phase`.
    async fn finish(&self, phase: Phase, mut instance: Instance) -> Result<()> {
        instance.parent = None;
        instance.status_reason = None;
        match phase {
            Phase::Provisioning => {
                instance.status = InstanceStatus::Provisioned;
                self.storage.write_instance(&instance).await?;
            }
            Phase::Updating => {
                if let Some(parameters) = instance.updating_parameters.take() {
                    instance.provisioning_parameters = parameters;
                }
                instance.status = InstanceStatus::Updated;
                self.storage.write_instance(&instance).await?;
            }
            Phase::Deprovisioning => {
                self.storage.delete_instance(&instance.instance_id).await?;
            }
        }
        info!(
            instance_id = %instance.instance_id,
            phase = ?phase,
            "Step chain completed"
        );
        Ok(())
    }

    /// [`Jobs::start`] from inside a job: any error takes the failure path.
    pub(super) async fn start_from_job(&self, phase: Phase, instance: Instance) -> JobResult {
        match self.start(phase, instance.clone()).await {
            Ok(first) => Ok(first.into_iter().collect()),
            Err(e) => self.fail(phase, instance, e.to_string()).await,
        }
    }

    /// Record that `phase` failed on `instance`.
    ///
    /// If even that cannot be written the job is fatal: the task stays
    /// claimed and the worker stops.
    pub(super) async fn fail(
        &self,
        phase: Phase,
        mut instance: Instance,
        reason: String,
    ) -> JobResult {
        instance.status = phase.failed_status();
        instance.status_reason = Some(reason.clone());
        instance.parent = None;

        match self.storage.write_instance(&instance).await {
            Ok(()) => {
                warn!(
                    instance_id = %instance.instance_id,
                    status = %instance.status,
                    reason = %reason,
                    "Step chain failed"
                );
                Err(JobError::failed(reason))
            }
            Err(e) => {
                error!(
                    instance_id = %instance.instance_id,
                    status = %instance.status,
                    reason = %reason,
                    error = %e,
                    "Failed to persist failed status"
                );
                Err(JobError::fatal(format!(
                    "could not mark instance {} as {}: {e}",
                    instance.instance_id, instance.status
                )))
            }
        }
    }

    /// Load the parent of `instance` into [`Instance::parent`].
    async fn load_parent(&self, instance: &mut Instance) -> Result<()> {
        let Some(alias) = &instance.parent_alias else {
            return Ok(());
        };
        match self.storage.get_instance_by_alias(alias).await? {
            Some(parent) => instance.parent = Some(Box::new(parent)),
            None => warn!(
                instance_id = %instance.instance_id,
                parent_alias = %alias,
                "Parent instance not found"
            ),
        }
        Ok(())
    }

    /// Job body for the three step jobs.
    pub(super) async fn execute_step(
        &self,
        phase: Phase,
        cancel: CancellationToken,
        task: Task,
    ) -> JobResult {
        let instance_id = required_arg(&task, INSTANCE_ID_ARG)?;
        let step_name = required_arg(&task, STEP_NAME_ARG)?;

        let mut instance = match self.storage.get_instance(instance_id).await {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                return Err(JobError::failed(format!(
                    "instance {instance_id} not found"
                )));
            }
            Err(e) => {
                return Err(JobError::failed(format!(
                    "failed to load instance {instance_id}: {e}"
                )));
            }
        };

        let (chain, plan) = match self.chain(phase, &instance) {
            Ok(resolved) => resolved,
            Err(e) => return self.fail(phase, instance, e.to_string()).await,
        };
        let Some(step) = chain.get_step(step_name) else {
            let reason = format!("unknown step {step_name}");
            return self.fail(phase, instance, reason).await;
        };
        if let Err(e) = self.load_parent(&mut instance).await {
            let reason = format!("failed to load parent instance: {e}");
            return self.fail(phase, instance, reason).await;
        }

        debug!(
            instance_id = %instance_id,
            step = %step_name,
            phase = ?phase,
            "Executing step"
        );
        let output = match step.execute(&cancel, instance.clone(), &plan).await {
            Ok(output) => output,
            // Leave the status alone so the step reruns after recovery.
            Err(e) if cancel.is_cancelled() => {
                return Err(JobError::failed(format!("step {step_name} interrupted: {e}")));
            }
            Err(e) => {
                let reason = format!("step {step_name} failed: {e}");
                return self.fail(phase, instance, reason).await;
            }
        };

        instance.details = output.details;
        instance.secure_details = output.secure_details;
        instance.parent = None;

        let Some(next) = chain.next_step_name(step_name) else {
            return match self.finish(phase, instance.clone()).await {
                Ok(()) => Ok(Vec::new()),
                Err(e) => {
                    let reason = format!("failed to complete {step_name}: {e}");
                    self.fail(phase, instance, reason).await
                }
            };
        };

        if let Err(e) = self.storage.write_instance(&instance).await {
            let reason = format!("failed to save output of step {step_name}: {e}");
            return self.fail(phase, instance, reason).await;
        }
        Ok(vec![step_task(phase, instance_id, next)])
    }
}
