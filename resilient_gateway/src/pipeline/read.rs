//! Resilient read pipeline.
//!
//! `permission → upstream call → (success: cache write) | (failure: fallback)`.
//! The upstream step runs on a detached task so a caller that gives up does
//! not revoke the cache write or the breaker outcome of a call in flight.

use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    breaker::{CircuitBreakerRegistry, Permission},
    cache::ResourceCache,
    error::{ServiceError, UpstreamError},
    model::{EntityId, Identified, Resource},
    upstream::UpstreamClient,
};

use super::propagate;

/// Why the guarded upstream step produced no value
#[derive(Debug)]
enum ReadFailure {
    BreakerDenied,
    Upstream(UpstreamError),
}

/// What to do with a `ReadFailure`
enum Recovery {
    Fallback,
    Propagate(ServiceError),
}

impl ReadFailure {
    fn recovery(self) -> Recovery {
        match self {
            ReadFailure::BreakerDenied => Recovery::Fallback,
            ReadFailure::Upstream(err) if err.is_trip_worthy() => {
                warn!(error = %err, "Upstream failure counted by breaker");
                Recovery::Fallback
            }
            ReadFailure::Upstream(err) => Recovery::Propagate(propagate(err)),
        }
    }
}

/// Breaker-gated reads for one resource, backed by its cache
pub struct ResilientReader<R: Resource> {
    circuit: String,
    breakers: Arc<CircuitBreakerRegistry>,
    client: Arc<dyn UpstreamClient<R>>,
    cache: Arc<ResourceCache<R::Entity>>,
}

impl<R: Resource> ResilientReader<R> {
    pub fn new(
        circuit: impl Into<String>,
        breakers: Arc<CircuitBreakerRegistry>,
        client: Arc<dyn UpstreamClient<R>>,
        cache: Arc<ResourceCache<R::Entity>>,
    ) -> Self {
        Self {
            circuit: circuit.into(),
            breakers,
            client,
            cache,
        }
    }

    pub fn circuit(&self) -> &str {
        &self.circuit
    }

    pub fn cache(&self) -> &Arc<ResourceCache<R::Entity>> {
        &self.cache
    }

    /// Every entity from upstream, or the cached snapshots when upstream is unavailable
    #[instrument(skip(self), fields(resource = %R::KIND, circuit = %self.circuit))]
    pub async fn get_all(&self) -> Result<Vec<R::Entity>, ServiceError> {
        let fetched = self
            .guarded(
                |client| async move { client.list().await },
                |cache, entities: &Vec<R::Entity>| cache.put_all(entities),
            )
            .await;

        match fetched {
            Ok(entities) => {
                info!(count = entities.len(), "Fetched and cached entities from upstream");
                Ok(entities)
            }
            Err(failure) => match failure.recovery() {
                Recovery::Fallback => self.fallback_all(),
                Recovery::Propagate(err) => {
                    error!(error = %err, "Error occurred while fetching entities");
                    Err(err)
                }
            },
        }
    }

    /// One entity from upstream, or its cached snapshot when upstream is unavailable
    #[instrument(skip(self), fields(resource = %R::KIND, circuit = %self.circuit))]
    pub async fn get_one(&self, id: EntityId) -> Result<R::Entity, ServiceError> {
        let fetched = self
            .guarded(
                move |client| async move { client.get(id).await },
                |cache, entity: &R::Entity| cache.put(entity.id(), entity.clone()),
            )
            .await;

        match fetched {
            Ok(entity) => {
                info!(id, "Fetched and cached entity from upstream");
                Ok(entity)
            }
            Err(failure) => match failure.recovery() {
                Recovery::Fallback => self.fallback_one(id),
                Recovery::Propagate(err) => {
                    error!(id, error = %err, "Error occurred while fetching entity");
                    Err(err)
                }
            },
        }
    }

    /// Run `call` under the breaker and apply `write` to the cache on success.
    async fn guarded<T, F, Fut, W>(&self, call: F, write: W) -> Result<T, ReadFailure>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn UpstreamClient<R>>) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
        W: FnOnce(&ResourceCache<R::Entity>, &T) + Send + 'static,
    {
        let permit = match self.breakers.attempt(&self.circuit) {
            Permission::Allowed(permit) => permit,
            Permission::Denied => {
                warn!("Fallback triggered: circuit breaker is open");
                return Err(ReadFailure::BreakerDenied);
            }
        };

        let upstream = call(Arc::clone(&self.client));
        let cache = Arc::clone(&self.cache);

        let in_flight = tokio::spawn(async move {
            match upstream.await {
                Ok(value) => {
                    write(cache.as_ref(), &value);
                    permit.record_success();
                    Ok(value)
                }
                Err(err) if err.is_trip_worthy() => {
                    permit.record_failure();
                    Err(err)
                }
                Err(err) => {
                    permit.ignore();
                    Err(err)
                }
            }
        });

        match in_flight.await {
            Ok(result) => result.map_err(ReadFailure::Upstream),
            Err(join_err) => Err(ReadFailure::Upstream(UpstreamError::Aborted(
                join_err.to_string(),
            ))),
        }
    }

    fn fallback_all(&self) -> Result<Vec<R::Entity>, ServiceError> {
        let cached = self.cache.values();
        if cached.is_empty() {
            warn!("Cache is empty. No fallback data available");
            return Err(ServiceError::FallbackUnavailable {
                resource: R::KIND,
                id: None,
            });
        }

        info!(count = cached.len(), "Returning cached entities as fallback");
        Ok(cached)
    }

    fn fallback_one(&self, id: EntityId) -> Result<R::Entity, ServiceError> {
        match self.cache.get(id) {
            Some(entity) => {
                info!(id, "Returning cached entity as fallback");
                Ok(entity)
            }
            None => {
                warn!(id, "No cached entity found");
                Err(ServiceError::FallbackUnavailable {
                    resource: R::KIND,
                    id: Some(id),
                })
            }
        }
    }
}
