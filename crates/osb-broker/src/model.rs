// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service instances and bindings as the broker persists them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Waiting for the parent instance to finish provisioning.
    ProvisioningDeferred,
    /// Provisioning steps are running.
    Provisioning,
    /// All provisioning steps completed.
    Provisioned,
    /// A provisioning step failed.
    ProvisioningFailed,
    /// Updating steps are running.
    Updating,
    /// All updating steps completed.
    Updated,
    /// An updating step failed.
    UpdatingFailed,
    /// Deprovisioning steps are running.
    Deprovisioning,
    /// A deprovisioning step failed.
    DeprovisioningFailed,
}

impl InstanceStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::ProvisioningDeferred => "provisioning_deferred",
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Provisioned => "provisioned",
            InstanceStatus::ProvisioningFailed => "provisioning_failed",
            InstanceStatus::Updating => "updating",
            InstanceStatus::Updated => "updated",
            InstanceStatus::UpdatingFailed => "updating_failed",
            InstanceStatus::Deprovisioning => "deprovisioning",
            InstanceStatus::DeprovisioningFailed => "deprovisioning_failed",
        }
    }

    /// Whether a step chain failed in this state.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            InstanceStatus::ProvisioningFailed
                | InstanceStatus::UpdatingFailed
                | InstanceStatus::DeprovisioningFailed
        )
    }

    /// Whether the instance is usable: provisioning finished and it is not
    /// being torn down.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Provisioned
                | InstanceStatus::Updating
                | InstanceStatus::Updated
                | InstanceStatus::UpdatingFailed
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioned (or provisioning) service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance ID assigned by the platform.
    pub instance_id: String,
    /// Name other instances use to refer to this one as their parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Catalog service ID.
    pub service_id: String,
    /// Catalog plan ID.
    pub plan_id: String,
    /// Parameters supplied at provisioning time.
    #[serde(default)]
    pub provisioning_parameters: Value,
    /// Parameters of an update in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updating_parameters: Option<Value>,
    /// Alias of the instance this one depends on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_alias: Option<String>,
    /// Parent instance, loaded before a step runs. Never persisted.
    #[serde(skip)]
    pub parent: Option<Box<Instance>>,
    /// Lifecycle state.
    pub status: InstanceStatus,
    /// Why the instance is in a failed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// Non-sensitive details produced by steps.
    #[serde(default)]
    pub details: Value,
    /// Sensitive details produced by steps. Storage encrypts these at rest.
    #[serde(skip)]
    pub secure_details: Value,
    /// When the instance was first written.
    pub created_at: DateTime<Utc>,
}

impl Instance {
    /// A new instance about to be provisioned.
    pub fn new(
        instance_id: impl Into<String>,
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        provisioning_parameters: Value,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            alias: None,
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            provisioning_parameters,
            updating_parameters: None,
            parent_alias: None,
            parent: None,
            status: InstanceStatus::Provisioning,
            status_reason: None,
            details: Value::Null,
            secure_details: Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Set the alias children use to find this instance.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Make this instance depend on the instance aliased `parent_alias`.
    pub fn with_parent_alias(mut self, parent_alias: impl Into<String>) -> Self {
        self.parent_alias = Some(parent_alias.into());
        self
    }
}

/// Lifecycle state of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    /// Credentials were issued.
    Bound,
    /// Issuing credentials failed.
    BindingFailed,
}

/// Credentials issued against an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Binding ID assigned by the platform.
    pub binding_id: String,
    /// Instance the binding belongs to.
    pub instance_id: String,
    /// Parameters supplied at bind time.
    #[serde(default)]
    pub parameters: Value,
    /// Lifecycle state.
    pub status: BindingStatus,
    /// Why binding failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// Non-sensitive binding details.
    #[serde(default)]
    pub details: Value,
    /// Credentials. Storage encrypts these at rest.
    #[serde(skip)]
    pub secure_details: Value,
    /// When the binding was created.
    pub created_at: DateTime<Utc>,
}

impl Binding {
    /// A new, bound binding.
    pub fn new(
        binding_id: impl Into<String>,
        instance_id: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            binding_id: binding_id.into(),
            instance_id: instance_id.into(),
            parameters,
            status: BindingStatus::Bound,
            status_reason: None,
            details: Value::Null,
            secure_details: Value::Null,
            created_at: Utc::now(),
        }
    }
}
