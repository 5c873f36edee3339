// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step-chain jobs run by the task engine.
//!
//! A provisioning, updating or deprovisioning run is a sequence of tasks, one
//! per step. Each task names the step to run and the instance to run it on;
//! a successful step returns the task for the next step as its follow-up, so
//! the engine's atomic commit moves the run forward exactly one step at a
//! time.
//!
//! | Job | Args | Purpose |
//! |-----|------|---------|
//! | `executeProvisioningStep` | `stepName`, `instanceID` | run one provisioning step |
//! | `executeUpdatingStep` | `stepName`, `instanceID` | run one updating step |
//! | `executeDeprovisioningStep` | `stepName`, `instanceID` | run one deprovisioning step |
//! | `checkParentStatus` | `instanceID` | wait for the parent to be provisioned |
//! | `checkChildrenStatuses` | `instanceID` | wait for all children to be gone |

mod dependencies;
mod steps;

pub use self::steps::Phase;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use osb_async::{Engine, JobError, Task};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::service::Catalog;
use crate::storage::Storage;

/// Runs one provisioning step.
pub const EXECUTE_PROVISIONING_STEP: &str = "executeProvisioningStep";
/// Runs one updating step.
pub const EXECUTE_UPDATING_STEP: &str = "executeUpdatingStep";
/// Runs one deprovisioning step.
pub const EXECUTE_DEPROVISIONING_STEP: &str = "executeDeprovisioningStep";
/// Polls the parent of a deferred instance.
pub const CHECK_PARENT_STATUS: &str = "checkParentStatus";
/// Polls the children of an instance being deprovisioned.
pub const CHECK_CHILDREN_STATUSES: &str = "checkChildrenStatuses";

/// Task argument naming the step to run.
pub const STEP_NAME_ARG: &str = "stepName";
/// Task argument naming the instance.
pub const INSTANCE_ID_ARG: &str = "instanceID";

/// The broker's job functions and what they need to run.
#[derive(Clone)]
pub struct Jobs {
    storage: Arc<dyn Storage>,
    catalog: Arc<Catalog>,
    dependency_poll_interval: Duration,
}

impl Jobs {
    /// Create jobs over `storage` and `catalog`.
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<Catalog>,
        dependency_poll_interval: Duration,
    ) -> Self {
        Self {
            storage,
            catalog,
            dependency_poll_interval,
        }
    }

    /// Instance storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Service catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Register all five jobs on `engine`.
    pub async fn register(&self, engine: &Engine) -> osb_async::Result<()> {
        for phase in Phase::ALL {
            let jobs = self.clone();
            engine
                .register_job(
                    phase.job_name(),
                    move |cancel: CancellationToken, task: Task| {
                        let jobs = jobs.clone();
                        async move { jobs.execute_step(phase, cancel, task).await }
                    },
                )
                .await?;
        }

        let jobs = self.clone();
        engine
            .register_job(
                CHECK_PARENT_STATUS,
                move |_cancel: CancellationToken, task: Task| {
                    let jobs = jobs.clone();
                    async move { jobs.check_parent_status(task).await }
                },
            )
            .await?;

        let jobs = self.clone();
        engine
            .register_job(
                CHECK_CHILDREN_STATUSES,
                move |_cancel: CancellationToken, task: Task| {
                    let jobs = jobs.clone();
                    async move { jobs.check_children_statuses(task).await }
                },
            )
            .await?;

        debug!(worker_id = %engine.worker_id(), "Registered broker jobs");
        Ok(())
    }

    /// The same check again after the dependency poll interval.
    fn recheck(&self, task: &Task) -> Task {
        Task::delayed(
            task.job_name(),
            task.args().clone(),
            self.dependency_poll_interval,
        )
    }
}

/// Task running `step_name` of `phase` on `instance_id`.
pub fn step_task(phase: Phase, instance_id: &str, step_name: &str) -> Task {
    Task::new(
        phase.job_name(),
        HashMap::from([
            (STEP_NAME_ARG.to_string(), step_name.to_string()),
            (INSTANCE_ID_ARG.to_string(), instance_id.to_string()),
        ]),
    )
}

/// Task running a dependency check on `instance_id`.
pub fn check_task(job_name: &str, instance_id: &str) -> Task {
    Task::new(
        job_name,
        HashMap::from([(INSTANCE_ID_ARG.to_string(), instance_id.to_string())]),
    )
}

fn required_arg<'a>(task: &'a Task, name: &str) -> Result<&'a str, JobError> {
    task.arg(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| JobError::failed(format!("task {} is missing argument {name}", task.id())))
}
