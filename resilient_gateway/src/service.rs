//! Per-resource service facade and the process-wide wiring behind it.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    breaker::{BreakerPolicy, CircuitBreakerRegistry},
    cache::{CacheStats, ResourceCache},
    error::ServiceError,
    model::{EntityId, Resource, ResourceKind, Tasks, Users},
    pipeline::{PassThroughWriter, ResilientReader},
    settings::{CircuitBreakerConfig, Settings},
    upstream::{build_http_client, HttpUpstream, UpstreamClient},
};

/// The five CRUD operations for one resource family
pub struct ResourceService<R: Resource> {
    reader: ResilientReader<R>,
    writer: PassThroughWriter<R>,
}

pub type TaskService = ResourceService<Tasks>;
pub type UserService = ResourceService<Users>;

impl<R: Resource> ResourceService<R> {
    pub fn new(
        circuit: impl Into<String>,
        breakers: Arc<CircuitBreakerRegistry>,
        client: Arc<dyn UpstreamClient<R>>,
        cache: Arc<ResourceCache<R::Entity>>,
    ) -> Self {
        Self {
            reader: ResilientReader::new(circuit, breakers, Arc::clone(&client), cache),
            writer: PassThroughWriter::new(client),
        }
    }

    pub async fn list(&self) -> Result<Vec<R::Entity>, ServiceError> {
        self.reader.get_all().await
    }

    pub async fn get_by_id(&self, id: EntityId) -> Result<R::Entity, ServiceError> {
        self.reader.get_one(id).await
    }

    pub async fn create(&self, request: &R::Request) -> Result<R::Entity, ServiceError> {
        self.writer.create(request).await
    }

    pub async fn update(&self, request: &R::Request) -> Result<R::Entity, ServiceError> {
        self.writer.update(request).await
    }

    pub async fn delete(&self, id: EntityId) -> Result<(), ServiceError> {
        self.writer.delete(id).await
    }

    pub fn circuit(&self) -> &str {
        self.reader.circuit()
    }

    pub fn cache(&self) -> &Arc<ResourceCache<R::Entity>> {
        self.reader.cache()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.reader.cache().stats()
    }
}

/// Circuit guarding reads of `kind` under the given breaker configuration
pub fn circuit_for(kind: ResourceKind, config: &CircuitBreakerConfig) -> &'static str {
    if config.shared_circuit {
        ResourceKind::Task.default_circuit()
    } else {
        kind.default_circuit()
    }
}

/// Services, breakers and caches constructed once at process start
#[derive(Clone)]
pub struct Gateway {
    pub tasks: Arc<TaskService>,
    pub users: Arc<UserService>,
    pub breakers: Arc<CircuitBreakerRegistry>,
}

impl Gateway {
    /// Wire HTTP upstream clients from settings
    #[instrument(skip(settings), fields(upstream = %settings.upstream.base_url))]
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = build_http_client(&settings.upstream)?;
        let base_url = settings.upstream.base_url.as_str();

        let tasks: Arc<dyn UpstreamClient<Tasks>> = Arc::new(HttpUpstream::<Tasks>::new(
            http.clone(),
            base_url,
            settings.upstream.tasks.clone(),
        ));
        let users: Arc<dyn UpstreamClient<Users>> = Arc::new(HttpUpstream::<Users>::new(
            http,
            base_url,
            settings.upstream.users.clone(),
        ));

        Ok(Self::with_clients(&settings.circuit_breaker, tasks, users))
    }

    /// Wire arbitrary upstream clients
    pub fn with_clients(
        config: &CircuitBreakerConfig,
        tasks: Arc<dyn UpstreamClient<Tasks>>,
        users: Arc<dyn UpstreamClient<Users>>,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerPolicy::from(config)));

        let task_circuit = circuit_for(ResourceKind::Task, config);
        let user_circuit = circuit_for(ResourceKind::User, config);
        // Register up front so health reports list circuits before first use
        breakers.circuit_breaker(task_circuit);
        breakers.circuit_breaker(user_circuit);

        info!(
            task_circuit,
            user_circuit,
            shared = config.shared_circuit,
            "Gateway services wired"
        );

        Self {
            tasks: Arc::new(TaskService::new(
                task_circuit,
                Arc::clone(&breakers),
                tasks,
                Arc::new(ResourceCache::new(ResourceKind::Task)),
            )),
            users: Arc::new(UserService::new(
                user_circuit,
                Arc::clone(&breakers),
                users,
                Arc::new(ResourceCache::new(ResourceKind::User)),
            )),
            breakers,
        }
    }
}
