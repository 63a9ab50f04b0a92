//! Shared fixtures: an in-process upstream whose contents, failures and
//! latency are scripted per test, plus entity builders.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use resilient_gateway::{
    model::{EntityId, Identified, Resource, Task, TaskRequest, Tasks, User, UserRequest, Users},
    settings::CircuitBreakerConfig,
    upstream::UpstreamClient,
    Gateway, UpstreamError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Failure the fake upstream returns instead of answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    ServerError,
    BadRequest,
    ConnectionRefused,
}

impl Failure {
    fn to_error(self) -> UpstreamError {
        match self {
            Failure::Timeout => UpstreamError::Timeout,
            Failure::ServerError => UpstreamError::Status {
                status: 500,
                body: "boom".to_string(),
            },
            Failure::BadRequest => UpstreamError::Status {
                status: 400,
                body: "bad request".to_string(),
            },
            Failure::ConnectionRefused => UpstreamError::Transport("connection refused".to_string()),
        }
    }
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub list: AtomicUsize,
    pub get: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
}

impl CallCounts {
    pub fn reads(&self) -> usize {
        self.list.load(Ordering::SeqCst) + self.get.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.create.load(Ordering::SeqCst)
            + self.update.load(Ordering::SeqCst)
            + self.delete.load(Ordering::SeqCst)
    }
}

/// Scripted upstream backed by an ordered map
pub struct FakeUpstream<R: Resource> {
    store: Mutex<BTreeMap<EntityId, R::Entity>>,
    failure: Mutex<Option<Failure>>,
    latency: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
    to_entity: fn(&R::Request, EntityId) -> R::Entity,
    pub calls: CallCounts,
}

impl<R: Resource> FakeUpstream<R> {
    fn with_builder(to_entity: fn(&R::Request, EntityId) -> R::Entity) -> Self {
        Self {
            store: Mutex::new(BTreeMap::new()),
            failure: Mutex::new(None),
            latency: Mutex::new(None),
            next_id: AtomicUsize::new(1_000),
            to_entity,
            calls: CallCounts::default(),
        }
    }

    pub fn seed(&self, entities: impl IntoIterator<Item = R::Entity>) {
        let mut store = self.store.lock();
        for entity in entities {
            store.insert(entity.id(), entity);
        }
    }

    pub fn fail_with(&self, failure: Failure) {
        *self.failure.lock() = Some(failure);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    async fn answer(&self) -> Result<(), UpstreamError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let failure = *self.failure.lock();
        match failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: Resource> UpstreamClient<R> for FakeUpstream<R> {
    async fn list(&self) -> Result<Vec<R::Entity>, UpstreamError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        Ok(self.store.lock().values().cloned().collect())
    }

    async fn get(&self, id: EntityId) -> Result<R::Entity, UpstreamError> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        self.store
            .lock()
            .get(&id)
            .cloned()
            .ok_or(UpstreamError::NotFound { resource: R::KIND })
    }

    async fn create(&self, request: &R::Request) -> Result<R::Entity, UpstreamError> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as EntityId;
        let entity = (self.to_entity)(request, id);
        self.store.lock().insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn update(&self, request: &R::Request) -> Result<R::Entity, UpstreamError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        let entity = (self.to_entity)(request, 0);
        let mut store = self.store.lock();
        if !store.contains_key(&entity.id()) {
            return Err(UpstreamError::NotFound { resource: R::KIND });
        }
        store.insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: EntityId) -> Result<(), UpstreamError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        match self.store.lock().remove(&id) {
            Some(_) => Ok(()),
            None => Err(UpstreamError::NotFound { resource: R::KIND }),
        }
    }
}

impl FakeUpstream<Tasks> {
    pub fn tasks() -> Arc<Self> {
        Arc::new(Self::with_builder(|request: &TaskRequest, assigned| Task {
            task_id: request.task_id.unwrap_or(assigned),
            task_title: request.task_title.clone(),
            task_description: request.task_description.clone(),
            task_due_date: request.task_due_date,
            user_id: request.user_id,
        }))
    }
}

impl FakeUpstream<Users> {
    pub fn users() -> Arc<Self> {
        Arc::new(Self::with_builder(|request: &UserRequest, assigned| User {
            user_id: request.user_id.unwrap_or(assigned),
            full_name: request.full_name.clone(),
            user_email: request.user_email.clone(),
            role: request.role.clone(),
            task_ids: request.task_ids.clone(),
        }))
    }
}

pub fn task(id: EntityId, title: &str) -> Task {
    Task {
        task_id: id,
        task_title: title.to_string(),
        task_description: None,
        task_due_date: None,
        user_id: None,
    }
}

pub fn task_request(id: Option<EntityId>, title: &str) -> TaskRequest {
    TaskRequest {
        task_id: id,
        task_title: title.to_string(),
        task_description: None,
        task_due_date: None,
        user_id: None,
    }
}

pub fn user(id: EntityId, name: &str) -> User {
    User {
        user_id: id,
        full_name: name.to_string(),
        user_email: format!("{}@example.com", name.to_lowercase()),
        role: Some("USER".to_string()),
        task_ids: Default::default(),
    }
}

pub fn breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        open_timeout_ms: 60_000,
        half_open_max_calls: 1,
        shared_circuit: false,
    }
}

/// Gateway wired to fresh fake upstreams
pub struct Harness {
    pub gateway: Gateway,
    pub tasks: Arc<FakeUpstream<Tasks>>,
    pub users: Arc<FakeUpstream<Users>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(breaker_config())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        let tasks = FakeUpstream::tasks();
        let users = FakeUpstream::users();
        let gateway = Gateway::with_clients(&config, tasks.clone(), users.clone());
        Self {
            gateway,
            tasks,
            users,
        }
    }

    pub fn open_task_circuit(&self) {
        self.gateway
            .breakers
            .circuit_breaker(self.gateway.tasks.circuit())
            .force_open();
    }
}
