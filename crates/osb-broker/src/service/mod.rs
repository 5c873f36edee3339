// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service catalog and the managers that turn instances into step chains.

mod chain;

pub use self::chain::{Step, StepChain, StepChainBuilder, StepError, StepOutput};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::model::Instance;

/// Catalog and chain-resolution errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// No service with this ID is in the catalog.
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// The service has no plan with this ID.
    #[error("Service {service_id} has no plan {plan_id}")]
    UnknownPlan {
        /// Service looked up.
        service_id: String,
        /// Plan that was missing.
        plan_id: String,
    },

    /// A service with this ID is already in the catalog.
    #[error("Service already registered: {0}")]
    DuplicateService(String),

    /// Two steps in one chain share a name.
    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    /// The service's manager does not support updates.
    #[error("Service {0} does not support updates")]
    UpdateNotSupported(String),

    /// The manager could not build a chain.
    #[error("Service module error: {0}")]
    Module(String),
}

/// A plan of a catalog service.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Plan ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form settings the steps read, such as sizes or versions.
    pub properties: Value,
}

impl Plan {
    /// A plan with no properties.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            properties: Value::Null,
        }
    }

    /// Set the plan properties.
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}

/// Builds the step chains for one service.
///
/// Chains are resolved on every step, so a manager may vary them per
/// instance, for example by plan.
pub trait ServiceManager: Send + Sync {
    /// Steps that provision `instance`.
    fn provisioner(&self, instance: &Instance) -> Result<StepChain, ServiceError>;

    /// Steps that apply `instance.updating_parameters`.
    fn updater(&self, instance: &Instance) -> Result<StepChain, ServiceError> {
        Err(ServiceError::UpdateNotSupported(instance.service_id.clone()))
    }

    /// Steps that tear `instance` down.
    fn deprovisioner(&self, instance: &Instance) -> Result<StepChain, ServiceError>;
}

/// A service offered by the broker.
#[derive(Clone)]
pub struct Service {
    /// Service ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Available plans.
    pub plans: Vec<Plan>,
    /// Chain builder for this service.
    pub manager: Arc<dyn ServiceManager>,
}

impl Service {
    /// A service with no plans.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        manager: Arc<dyn ServiceManager>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            plans: Vec::new(),
            manager,
        }
    }

    /// Add a plan.
    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plans.push(plan);
        self
    }

    /// The plan with ID `plan_id`.
    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == plan_id)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("plans", &self.plans)
            .finish_non_exhaustive()
    }
}

/// Services known to the broker, by ID.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    services: HashMap<String, Service>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. IDs are unique.
    pub fn add_service(&mut self, service: Service) -> Result<(), ServiceError> {
        if self.services.contains_key(&service.id) {
            return Err(ServiceError::DuplicateService(service.id));
        }
        self.services.insert(service.id.clone(), service);
        Ok(())
    }

    /// The service with ID `service_id`.
    pub fn service(&self, service_id: &str) -> Result<&Service, ServiceError> {
        self.services
            .get(service_id)
            .ok_or_else(|| ServiceError::UnknownService(service_id.to_string()))
    }

    /// The service and plan an instance was created from.
    pub fn resolve(&self, instance: &Instance) -> Result<(&Service, &Plan), ServiceError> {
        let service = self.service(&instance.service_id)?;
        let plan = service
            .plan(&instance.plan_id)
            .ok_or_else(|| ServiceError::UnknownPlan {
                service_id: instance.service_id.clone(),
                plan_id: instance.plan_id.clone(),
            })?;
        Ok((service, plan))
    }

    /// Service IDs, sorted.
    pub fn service_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.services.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Nothing;

    impl ServiceManager for Nothing {
        fn provisioner(&self, _instance: &Instance) -> Result<StepChain, ServiceError> {
            Ok(StepChain::empty())
        }

        fn deprovisioner(&self, _instance: &Instance) -> Result<StepChain, ServiceError> {
            Ok(StepChain::empty())
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .add_service(
                Service::new("pg", "Postgres", Arc::new(Nothing))
                    .with_plan(Plan::new("small", "Small").with_properties(json!({"cpu": 1}))),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_resolve() {
        let catalog = catalog();
        let instance = Instance::new("i1", "pg", "small", json!({}));
        let (service, plan) = catalog.resolve(&instance).unwrap();
        assert_eq!(service.name, "Postgres");
        assert_eq!(plan.properties, json!({"cpu": 1}));

        let bad_plan = Instance::new("i1", "pg", "huge", json!({}));
        assert!(matches!(
            catalog.resolve(&bad_plan),
            Err(ServiceError::UnknownPlan { .. })
        ));
        let bad_service = Instance::new("i1", "mysql", "small", json!({}));
        assert!(matches!(
            catalog.resolve(&bad_service),
            Err(ServiceError::UnknownService(_))
        ));
    }

    #[test]
    fn test_duplicate_service() {
        let mut catalog = catalog();
        let err = catalog
            .add_service(Service::new("pg", "Again", Arc::new(Nothing)))
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateService(ref id) if id == "pg"));
        assert_eq!(catalog.service_ids(), vec!["pg"]);
    }

    #[test]
    fn test_updates_are_opt_in() {
        let instance = Instance::new("i1", "pg", "small", json!({}));
        assert!(matches!(
            Nothing.updater(&instance),
            Err(ServiceError::UpdateNotSupported(_))
        ));
    }
}
