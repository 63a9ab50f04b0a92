//! Pass-through write pipeline: no breaker, no cache, failures propagate.

use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    error::ServiceError,
    model::{EntityId, Identified, Resource},
    upstream::UpstreamClient,
};

use super::propagate;

pub struct PassThroughWriter<R: Resource> {
    client: Arc<dyn UpstreamClient<R>>,
}

impl<R: Resource> PassThroughWriter<R> {
    pub fn new(client: Arc<dyn UpstreamClient<R>>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, request), fields(resource = %R::KIND))]
    pub async fn create(&self, request: &R::Request) -> Result<R::Entity, ServiceError> {
        match self.client.create(request).await {
            Ok(created) => {
                info!(id = created.id(), "Successfully created entity");
                Ok(created)
            }
            Err(err) => {
                error!(error = %err, "Error occurred while creating entity");
                Err(propagate(err))
            }
        }
    }

    #[instrument(skip(self, request), fields(resource = %R::KIND))]
    pub async fn update(&self, request: &R::Request) -> Result<R::Entity, ServiceError> {
        match self.client.update(request).await {
            Ok(updated) => {
                info!(id = updated.id(), "Successfully updated entity");
                Ok(updated)
            }
            Err(err) => {
                error!(error = %err, "Error occurred while updating entity");
                Err(propagate(err))
            }
        }
    }

    /// Cached snapshots of the deleted entity are left in place
    #[instrument(skip(self), fields(resource = %R::KIND))]
    pub async fn delete(&self, id: EntityId) -> Result<(), ServiceError> {
        match self.client.delete(id).await {
            Ok(()) => {
                info!(id, "Successfully deleted entity");
                Ok(())
            }
            Err(err) => {
                error!(id, error = %err, "Error occurred while deleting entity");
                Err(propagate(err))
            }
        }
    }
}
