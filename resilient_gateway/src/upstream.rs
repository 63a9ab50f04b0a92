//! Upstream API client: the opaque async executor behind both pipelines.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::{debug, instrument};

use crate::{
    error::UpstreamError,
    model::{EntityId, Resource},
    settings::{KeyedEndpoint, ResourceEndpoints, UpstreamConfig},
};

/// CRUD calls against the upstream API for one resource family
#[async_trait]
pub trait UpstreamClient<R: Resource>: Send + Sync {
    async fn list(&self) -> Result<Vec<R::Entity>, UpstreamError>;
    async fn get(&self, id: EntityId) -> Result<R::Entity, UpstreamError>;
    async fn create(&self, request: &R::Request) -> Result<R::Entity, UpstreamError>;
    async fn update(&self, request: &R::Request) -> Result<R::Entity, UpstreamError>;
    async fn delete(&self, id: EntityId) -> Result<(), UpstreamError>;
}

/// Build the process-wide HTTP client from upstream settings
pub fn build_http_client(config: &UpstreamConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .build()
}

/// `UpstreamClient` speaking JSON over HTTP
pub struct HttpUpstream<R> {
    http: Client,
    base_url: String,
    endpoints: ResourceEndpoints,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> HttpUpstream<R> {
    pub fn new(http: Client, base_url: &str, endpoints: ResourceEndpoints) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            _resource: PhantomData,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(resource = %R::KIND, %method, %url, "Calling upstream");
        self.http.request(method, url)
    }

    fn keyed_request(&self, method: Method, endpoint: &KeyedEndpoint, id: EntityId) -> RequestBuilder {
        match &endpoint.id_param {
            Some(param) => self
                .request(method, &endpoint.path)
                .query(&[(param.as_str(), id)]),
            None => {
                let path = format!("{}/{}", endpoint.path.trim_end_matches('/'), id);
                self.request(method, &path)
            }
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, UpstreamError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound { resource: R::KIND });
        }

        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, UpstreamError> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl<R: Resource> UpstreamClient<R> for HttpUpstream<R> {
    #[instrument(skip(self), fields(resource = %R::KIND))]
    async fn list(&self) -> Result<Vec<R::Entity>, UpstreamError> {
        self.send_json(self.request(Method::GET, &self.endpoints.list))
            .await
    }

    #[instrument(skip(self), fields(resource = %R::KIND))]
    async fn get(&self, id: EntityId) -> Result<R::Entity, UpstreamError> {
        self.send_json(self.keyed_request(Method::GET, &self.endpoints.get, id))
            .await
    }

    #[instrument(skip(self, request), fields(resource = %R::KIND))]
    async fn create(&self, request: &R::Request) -> Result<R::Entity, UpstreamError> {
        self.send_json(self.request(Method::POST, &self.endpoints.create).json(request))
            .await
    }

    #[instrument(skip(self, request), fields(resource = %R::KIND))]
    async fn update(&self, request: &R::Request) -> Result<R::Entity, UpstreamError> {
        self.send_json(self.request(Method::PUT, &self.endpoints.update).json(request))
            .await
    }

    #[instrument(skip(self), fields(resource = %R::KIND))]
    async fn delete(&self, id: EntityId) -> Result<(), UpstreamError> {
        self.send(self.keyed_request(Method::DELETE, &self.endpoints.delete, id))
            .await?;
        Ok(())
    }
}
