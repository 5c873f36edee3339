// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for osb-broker integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use osb_async::store::{QueueOp, StoreError, StoreResult};
use osb_async::{
    Engine, EngineConfig, JobError, JobFn, JobResult, MemoryStore, QueueStore, Task, TaskSubmitter,
    queues,
};
use osb_broker::service::ServiceError;
use osb_broker::storage::{StorageError, StorageResult};
use osb_broker::{
    Binding, Broker, Catalog, Instance, Jobs, MemoryStorage, Plan, Service, ServiceManager, Step,
    StepChain, StepError, StepOutput, Storage,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const SERVICE_ID: &str = "svc";
pub const PLAN_ID: &str = "small";

/// Engine tuning with intervals short enough for tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        heartbeat_interval: Duration::from_millis(200),
        cleaning_interval: Duration::from_millis(200),
        pending_concurrency: 3,
        receive_timeout: Duration::from_millis(50),
        max_worker_rejections: None,
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Install a log subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "osb_broker=info,osb_async=info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Step invocations in the order they happened, as `instance:step`.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Appends its name to `details.steps` and stores a secret per step.
struct RecordingStep {
    name: &'static str,
    fail: bool,
    recorder: Recorder,
}

#[async_trait]
impl Step for RecordingStep {
    async fn execute(
        &self,
        _cancel: &CancellationToken,
        instance: Instance,
        plan: &Plan,
    ) -> Result<StepOutput, StepError> {
        self.recorder
            .record(format!("{}:{}", instance.instance_id, self.name));
        if self.fail {
            return Err(StepError::new(format!("{} exploded", self.name)));
        }

        let mut steps = instance.details["steps"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        steps.push(json!(self.name));

        let parent = instance
            .parent
            .as_ref()
            .map(|parent| json!(parent.instance_id))
            .unwrap_or(Value::Null);

        Ok(StepOutput::new(
            json!({"steps": steps, "plan": plan.name, "parent": parent}),
            json!({"last_secret": format!("{}-secret", self.name)}),
        ))
    }
}

/// Service manager whose chains are lists of recording steps.
pub struct TestManager {
    pub provision: Vec<&'static str>,
    pub update: Option<Vec<&'static str>>,
    pub deprovision: Vec<&'static str>,
    pub fail_step: Option<&'static str>,
    pub recorder: Recorder,
}

impl TestManager {
    pub fn new(provision: &[&'static str]) -> Self {
        Self {
            provision: provision.to_vec(),
            update: None,
            deprovision: vec!["teardown"],
            fail_step: None,
            recorder: Recorder::default(),
        }
    }

    pub fn with_update(mut self, steps: &[&'static str]) -> Self {
        self.update = Some(steps.to_vec());
        self
    }

    pub fn with_deprovision(mut self, steps: &[&'static str]) -> Self {
        self.deprovision = steps.to_vec();
        self
    }

    pub fn failing_at(mut self, step: &'static str) -> Self {
        self.fail_step = Some(step);
        self
    }

    fn chain(&self, names: &[&'static str]) -> Result<StepChain, ServiceError> {
        names
            .iter()
            .fold(StepChain::builder(), |builder, name| {
                builder.step(
                    *name,
                    RecordingStep {
                        name: *name,
                        fail: self.fail_step == Some(*name),
                        recorder: self.recorder.clone(),
                    },
                )
            })
            .build()
    }
}

impl ServiceManager for TestManager {
    fn provisioner(&self, _instance: &Instance) -> Result<StepChain, ServiceError> {
        self.chain(&self.provision)
    }

    fn updater(&self, instance: &Instance) -> Result<StepChain, ServiceError> {
        match &self.update {
            Some(steps) => self.chain(steps),
            None => Err(ServiceError::UpdateNotSupported(instance.service_id.clone())),
        }
    }

    fn deprovisioner(&self, _instance: &Instance) -> Result<StepChain, ServiceError> {
        self.chain(&self.deprovision)
    }
}

pub fn catalog(manager: TestManager) -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .add_service(
            Service::new(SERVICE_ID, "Test Service", Arc::new(manager))
                .with_plan(Plan::new(PLAN_ID, "Small")),
        )
        .unwrap();
    catalog
}

pub fn instance(id: &str) -> Instance {
    Instance::new(id, SERVICE_ID, PLAN_ID, json!({"size": 1}))
}

/// Storage whose writes can be switched off.
pub struct FlakyStorage {
    inner: MemoryStorage,
    pub fail_writes: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::default(),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            let err = serde_json::from_str::<Value>("storage offline").unwrap_err();
            return Err(StorageError::Serialization(err));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn write_instance(&self, instance: &Instance) -> StorageResult<()> {
        self.check()?;
        self.inner.write_instance(instance).await
    }

    async fn get_instance(&self, instance_id: &str) -> StorageResult<Option<Instance>> {
        self.inner.get_instance(instance_id).await
    }

    async fn get_instance_by_alias(&self, alias: &str) -> StorageResult<Option<Instance>> {
        self.inner.get_instance_by_alias(alias).await
    }

    async fn count_children(&self, alias: &str) -> StorageResult<usize> {
        self.inner.count_children(alias).await
    }

    async fn delete_instance(&self, instance_id: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete_instance(instance_id).await
    }

    async fn write_binding(&self, binding: &Binding) -> StorageResult<()> {
        self.check()?;
        self.inner.write_binding(binding).await
    }

    async fn get_binding(&self, binding_id: &str) -> StorageResult<Option<Binding>> {
        self.inner.get_binding(binding_id).await
    }

    async fn delete_binding(&self, binding_id: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete_binding(binding_id).await
    }
}

/// Queue store that refuses new tasks once `reject_pushes` is set.
#[derive(Default)]
pub struct OfflineQueue {
    inner: MemoryStore,
    pub reject_pushes: AtomicBool,
}

impl OfflineQueue {
    fn check(&self) -> StoreResult<()> {
        if self.reject_pushes.load(Ordering::SeqCst) {
            return Err(StoreError::Other("queue offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for OfflineQueue {
    async fn push(&self, queue: &str, payload: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.push(queue, payload).await
    }

    async fn blocking_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        self.inner.blocking_move(source, destination, timeout).await
    }

    async fn move_one(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        self.inner.move_one(source, destination).await
    }

    async fn remove(&self, queue: &str, payload: &str) -> StoreResult<()> {
        self.inner.remove(queue, payload).await
    }

    async fn commit(&self, ops: &[QueueOp]) -> StoreResult<()> {
        self.check()?;
        self.inner.commit(ops).await
    }

    async fn list(&self, queue: &str) -> StoreResult<Vec<String>> {
        self.inner.list(queue).await
    }

    async fn len(&self, queue: &str) -> StoreResult<usize> {
        self.inner.len(queue).await
    }

    async fn add_member(&self, set: &str, member: &str) -> StoreResult<()> {
        self.inner.add_member(set, member).await
    }

    async fn remove_member(&self, set: &str, member: &str) -> StoreResult<()> {
        self.inner.remove_member(set, member).await
    }

    async fn members(&self, set: &str) -> StoreResult<Vec<String>> {
        self.inner.members(set).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }
}

/// A broker whose task submissions go to `queue`.
pub fn broker_on(queue: Arc<OfflineQueue>, manager: TestManager) -> (Broker, Arc<dyn Storage>) {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
    let jobs = Jobs::new(
        storage.clone(),
        Arc::new(catalog(manager)),
        Duration::from_secs(60),
    );
    (Broker::new(jobs, TaskSubmitter::new(queue)), storage)
}

/// What [`Harness::drain`] saw.
#[derive(Default)]
pub struct Drained {
    /// Follow-ups scheduled for later, not run.
    pub deferred: Vec<Task>,
    /// Job failures in execution order.
    pub failures: Vec<JobError>,
}

/// Broker jobs on an engine that is never started; tests run jobs by hand.
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<dyn Storage>,
    pub broker: Broker,
    pub recorder: Recorder,
}

impl Harness {
    pub async fn new(manager: TestManager) -> Self {
        Self::with_storage(manager, Arc::new(MemoryStorage::default())).await
    }

    pub async fn with_storage(manager: TestManager, storage: Arc<dyn Storage>) -> Self {
        let recorder = manager.recorder.clone();
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(store.clone(), fast_config());
        let jobs = Jobs::new(
            storage.clone(),
            Arc::new(catalog(manager)),
            Duration::from_secs(60),
        );
        jobs.register(&engine).await.unwrap();
        let broker = Broker::new(jobs, engine.submitter());

        Self {
            engine,
            store,
            storage,
            broker,
            recorder,
        }
    }

    /// Run the job `task` names, in the calling task.
    pub async fn run(&self, task: Task) -> JobResult {
        let job = self
            .engine
            .registry()
            .get(task.job_name())
            .await
            .unwrap_or_else(|| panic!("job {} not registered", task.job_name()));
        job.call(CancellationToken::new(), task).await
    }

    /// Enqueue tasks as the engine would.
    pub async fn submit(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.engine.submit_task(&task).await.unwrap();
        }
    }

    /// Run pending tasks, including immediate follow-ups, until none are left.
    pub async fn drain(&self) -> Drained {
        let mut drained = Drained::default();
        while let Some(payload) = self.store.move_one(queues::PENDING, "claimed").await.unwrap() {
            self.store.remove("claimed", &payload).await.unwrap();
            let task = Task::from_json(&payload).unwrap();
            match self.run(task).await {
                Ok(follow_ups) => {
                    for task in follow_ups {
                        if task.is_deferred() {
                            drained.deferred.push(task);
                        } else {
                            self.engine.submit_task(&task).await.unwrap();
                        }
                    }
                }
                Err(e) => drained.failures.push(e),
            }
        }
        drained
    }

    pub async fn stored(&self, instance_id: &str) -> Option<Instance> {
        self.storage.get_instance(instance_id).await.unwrap()
    }
}
