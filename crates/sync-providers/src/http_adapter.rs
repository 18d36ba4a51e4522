use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use sync_core::{AdapterError, Metadata, NodeAdapter, QueryRequest, ResourceResponse};

/// Reference `NodeAdapter` against a JSON catalog HTTP API. Not a mandated
/// wire protocol: any system implementing `NodeAdapter` can stand in for
/// it; this is the one concrete client `sync-providers` ships.
///
/// Expected endpoints, relative to `base_url`:
/// - `POST /query`: body is [`QueryRequest`], response is a JSON array of
///   `Metadata`.
/// - `GET /records/{id}`: existence/metadata probe.
/// - `GET /records/{id}/resource`: binary resource body.
/// - `POST /records`, `PUT /records/{id}`, `DELETE /records/{id}`: metadata
///   only create/update/delete.
/// - `PUT /records/{id}/resource` (also used for create): resource-bearing
///   create/update.
pub struct HttpCatalogAdapter {
    system_name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpCatalogAdapter {
    pub fn new(system_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            system_name: system_name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(
        system_name: impl Into<String>,
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            system_name: system_name.into(),
            base_url: base_url.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn transport_err(&self, err: reqwest::Error) -> AdapterError {
        AdapterError::Transport {
            adapter: self.system_name.clone(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireQueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "excludePresentAt")]
    exclude_present_at: &'a [String],
    #[serde(rename = "retryIds")]
    retry_ids: &'a [String],
    #[serde(rename = "modifiedAfter")]
    modified_after: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct BoolResult {
    ok: bool,
}

#[async_trait]
impl NodeAdapter for HttpCatalogAdapter {
    fn system_name(&self) -> &str {
        &self.system_name
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.url("/health"))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    async fn query(
        &self,
        request: QueryRequest,
    ) -> Result<BoxStream<'static, Result<Metadata, AdapterError>>, AdapterError> {
        let wire = WireQueryRequest {
            query: &request.query,
            exclude_present_at: &request.exclude_present_at,
            retry_ids: &request.retry_ids,
            modified_after: request.modified_after,
        };

        let response = self
            .client
            .post(self.url("/query"))
            .json(&wire)
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        if !response.status().is_success() {
            return Err(AdapterError::Rejected {
                adapter: self.system_name.clone(),
                message: format!("query returned status {}", response.status()),
            });
        }

        let records: Vec<Metadata> = response.json().await.map_err(|e| self.transport_err(e))?;
        let items: Vec<Result<Metadata, AdapterError>> = records.into_iter().map(Ok).collect();
        Ok(stream::iter(items).boxed())
    }

    async fn exists(&self, metadata: &Metadata) -> Result<bool, AdapterError> {
        let response = self
            .client
            .get(self.url(&format!("/records/{}", metadata.id)))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        Ok(response.status().is_success())
    }

    async fn read_resource(&self, metadata: &Metadata) -> Result<ResourceResponse, AdapterError> {
        let response = self
            .client
            .get(self.url(&format!("/records/{}/resource", metadata.id)))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        if !response.status().is_success() {
            return Err(AdapterError::ResourceUnreadable {
                metadata_id: metadata.id.clone(),
                message: format!("resource fetch returned status {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let size = response.content_length();
        let metadata_id = metadata.id.clone();
        let system_name = self.system_name.clone();

        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|b| sync_core::adapter::bytes_compat::Bytes::from(b.to_vec()))
                    .map_err(|e| AdapterError::ResourceUnreadable {
                        metadata_id: metadata_id.clone(),
                        message: format!("{system_name}: {e}"),
                    })
            })
            .boxed();

        Ok(ResourceResponse {
            content_type,
            size,
            body,
        })
    }

    async fn create_request(&self, metadata: &Metadata) -> Result<bool, AdapterError> {
        self.post_bool("/records", metadata).await
    }

    async fn update_request(&self, metadata: &Metadata) -> Result<bool, AdapterError> {
        let path = format!("/records/{}", metadata.id);
        let response = self
            .client
            .put(self.url(&path))
            .json(metadata)
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        self.decode_bool(response).await
    }

    async fn delete_request(&self, metadata: &Metadata) -> Result<bool, AdapterError> {
        let path = format!("/records/{}", metadata.id);
        let response = self
            .client
            .delete(self.url(&path))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        self.decode_bool(response).await
    }

    async fn create_resource(
        &self,
        metadata: &Metadata,
        resource: ResourceResponse,
    ) -> Result<bool, AdapterError> {
        self.put_resource(metadata, resource).await
    }

    async fn update_resource(
        &self,
        metadata: &Metadata,
        resource: ResourceResponse,
    ) -> Result<bool, AdapterError> {
        self.put_resource(metadata, resource).await
    }
}

impl HttpCatalogAdapter {
    async fn post_bool(&self, path: &str, metadata: &Metadata) -> Result<bool, AdapterError> {
        let response = self
            .client
            .post(self.url(path))
            .json(metadata)
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        self.decode_bool(response).await
    }

    async fn put_resource(
        &self,
        metadata: &Metadata,
        resource: ResourceResponse,
    ) -> Result<bool, AdapterError> {
        let metadata_id = metadata.id.clone();
        let body_bytes: Vec<u8> = resource
            .body
            .fold(Ok(Vec::new()), |acc: Result<Vec<u8>, AdapterError>, chunk| async move {
                let mut acc = acc?;
                acc.extend_from_slice(&chunk?);
                Ok(acc)
            })
            .await?;

        let mut request = self
            .client
            .put(self.url(&format!("/records/{}/resource", metadata.id)))
            .body(body_bytes);
        if let Some(content_type) = resource.content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = request.send().await.map_err(|e| AdapterError::ResourceUnreadable {
            metadata_id,
            message: e.to_string(),
        })?;
        self.decode_bool(response).await
    }

    async fn decode_bool(&self, response: reqwest::Response) -> Result<bool, AdapterError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Rejected {
                adapter: self.system_name.clone(),
                message: format!("status {status}: {message}"),
            });
        }

        match response.json::<BoolResult>().await {
            Ok(parsed) => Ok(parsed.ok),
            Err(err) => {
                warn!(adapter = %self.system_name, error = %err, "response had no decodable body, treating 2xx as success");
                Ok(true)
            }
        }
    }
}
