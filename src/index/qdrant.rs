//! Qdrant REST backend.

use async_trait::async_trait;
use futures_util::{TryStreamExt, pin_mut};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

use super::VectorIndex;
use super::filters::{SearchOptions, document_filter};
use super::payload::{build_payload, current_timestamp_rfc3339};
use super::scroller::stream_point_ids;
use super::types::{IndexError, IndexedChunk, QueryResponse, QueryResponseResult, SearchHit};
use crate::config::get_config;

/// Payload fields that receive a keyword index for filtering.
const KEYWORD_FIELDS: [&str; 5] = ["chatType", "deptName", "user", "chatThreadId", "documentId"];

/// Lightweight HTTP client bound to one Qdrant collection.
pub struct QdrantIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
}

impl QdrantIndex {
    /// Client for `collection` at `url`.
    pub fn new(url: &str, api_key: Option<String>, collection: &str) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("kbcore/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            collection: collection.to_string(),
        })
    }

    /// Client configured from the environment.
    pub fn from_config() -> Result<Self, IndexError> {
        let config = get_config();
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            &config.qdrant_collection_name,
        )
    }

    async fn collection_exists(&self) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn create_collection(&self, dimension: usize) -> Result<(), IndexError> {
        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;
        self.check(response).await?;
        tracing::info!(collection = %self.collection, dimension, "Collection created");
        self.ensure_payload_indexes().await
    }

    async fn ensure_payload_indexes(&self) -> Result<(), IndexError> {
        for field in KEYWORD_FIELDS {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .query(&[("wait", true)])
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            if status.is_success() || status == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, "Payload index ensured");
            } else {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, error = %error, "Failed to ensure payload index");
            }
        }
        Ok(())
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    /// Map non-success statuses, turning 404 into [`IndexError::IndexNotFound`].
    pub(crate) async fn check(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, IndexError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(IndexError::IndexNotFound(self.collection.clone()));
        }
        let body = response.text().await.unwrap_or_default();
        let error = IndexError::UnexpectedStatus { status, body };
        tracing::error!(collection = %self.collection, error = %error, "Qdrant request failed");
        Err(error)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn ensure(&self, dimension: usize) -> Result<bool, IndexError> {
        if self.collection_exists().await? {
            return Ok(false);
        }
        self.create_collection(dimension).await?;
        Ok(true)
    }

    async fn recreate(&self, dimension: usize) -> Result<(), IndexError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{}", self.collection))
            .send()
            .await?;
        match self.check(response).await {
            Ok(_) | Err(IndexError::IndexNotFound(_)) => {}
            Err(error) => return Err(error),
        }
        self.create_collection(dimension).await
    }

    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let now = current_timestamp_rfc3339();
        let points: Vec<Value> = chunks
            .iter()
            .map(|chunk| {
                json!({
                    "id": chunk.id,
                    "vector": chunk.vector,
                    "payload": build_payload(chunk, &now),
                })
            })
            .collect();
        let count = points.len();
        let response = self
            .request(Method::PUT, &format!("collections/{}/points", self.collection))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        self.check(response).await?;
        tracing::debug!(collection = %self.collection, points = count, "Points upserted");
        Ok(count)
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), IndexError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": document_filter(document_id) }))
            .send()
            .await?;
        self.check(response).await?;
        tracing::debug!(collection = %self.collection, document_id, "Document points deleted");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let mut body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let (Some(filter), Some(object)) = (options.to_qdrant(), body.as_object_mut()) {
            object.insert("filter".into(), filter);
        }
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;
        let response = self.check(response).await?;

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| {
                let payload = point.payload.unwrap_or_default();
                SearchHit::from_payload(stringify_point_id(point.id), point.score, &payload)
            })
            .collect())
    }

    async fn document_chunk_ids(&self, document_id: &str) -> Result<Vec<String>, IndexError> {
        let stream = stream_point_ids(self, document_filter(document_id));
        pin_mut!(stream);
        let mut ids = Vec::new();
        while let Some(id) = stream.try_next().await? {
            ids.push(id);
        }
        Ok(ids)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
