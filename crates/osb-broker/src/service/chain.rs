// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ordered, named steps of a provisioning, updating or deprovisioning run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{Plan, ServiceError};
use crate::model::Instance;

/// What a step hands back to the broker.
///
/// Only these two fields are merged into the stored instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Non-sensitive details.
    pub details: Value,
    /// Sensitive details, encrypted at rest.
    pub secure_details: Value,
}

impl StepOutput {
    /// Output carrying `details` and `secure_details`.
    pub fn new(details: Value, secure_details: Value) -> Self {
        Self {
            details,
            secure_details,
        }
    }
}

/// A step failed. The message becomes the instance's status reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StepError(pub String);

impl StepError {
    /// Build a step error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        StepError(message.into())
    }
}

/// One unit of work in a chain.
///
/// A step receives its own copy of the instance; the parent, if any, is
/// already loaded into [`Instance::parent`]. It should return the full
/// details it wants stored, since they replace the previous ones.
#[async_trait]
pub trait Step: Send + Sync + 'static {
    /// Run the step.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        instance: Instance,
        plan: &Plan,
    ) -> Result<StepOutput, StepError>;
}

#[async_trait]
impl<F, Fut> Step for F
where
    F: Fn(CancellationToken, Instance, Plan) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
{
    async fn execute(
        &self,
        cancel: &CancellationToken,
        instance: Instance,
        plan: &Plan,
    ) -> Result<StepOutput, StepError> {
        (self)(cancel.clone(), instance, plan.clone()).await
    }
}

/// Named steps in execution order.
#[derive(Clone, Default)]
pub struct StepChain {
    order: Vec<String>,
    steps: HashMap<String, Arc<dyn Step>>,
}

impl StepChain {
    /// A chain with no steps. Running it completes immediately.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building a chain.
    pub fn builder() -> StepChainBuilder {
        StepChainBuilder::default()
    }

    /// Name of the first step, if any.
    pub fn first_step_name(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    /// The step called `name`.
    pub fn get_step(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(name).cloned()
    }

    /// Name of the step after `current`. `None` for the last step and for
    /// names not in the chain.
    pub fn next_step_name(&self, current: &str) -> Option<&str> {
        let position = self.order.iter().position(|name| name == current)?;
        self.order.get(position + 1).map(String::as_str)
    }

    /// Step names in order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for StepChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepChain")
            .field("steps", &self.order)
            .finish()
    }
}

/// Builder for [`StepChain`].
#[derive(Default)]
pub struct StepChainBuilder {
    steps: Vec<(String, Arc<dyn Step>)>,
}

impl StepChainBuilder {
    /// Append a step.
    pub fn step(mut self, name: impl Into<String>, step: impl Step) -> Self {
        self.steps.push((name.into(), Arc::new(step)));
        self
    }

    /// Finish the chain. Step names must be unique.
    pub fn build(self) -> Result<StepChain, ServiceError> {
        let mut chain = StepChain::empty();
        for (name, step) in self.steps {
            if chain.steps.contains_key(&name) {
                return Err(ServiceError::DuplicateStep(name));
            }
            chain.order.push(name.clone());
            chain.steps.insert(name, step);
        }
        Ok(chain)
    }
}
