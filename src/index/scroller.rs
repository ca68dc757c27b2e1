//! Streaming helper for iterating the Qdrant scroll endpoint.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Value, json};

use super::qdrant::{QdrantIndex, stringify_point_id};
use super::types::{IndexError, ScrollResponse};

const DEFAULT_SCROLL_LIMIT: usize = 256;

/// Stream the ids of every point matching `filter`, page by page.
pub fn stream_point_ids(
    index: &QdrantIndex,
    filter: Value,
) -> impl Stream<Item = Result<String, IndexError>> + '_ {
    try_stream! {
        let mut offset: Option<Value> = None;
        loop {
            let body = json!({
                "with_payload": false,
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter.clone(),
                "offset": offset.clone().unwrap_or(Value::Null),
            });

            let response = index
                .request(
                    Method::POST,
                    &format!("collections/{}/points/scroll", index.collection),
                )
                .json(&body)
                .send()
                .await?;
            let response = index.check(response).await?;

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                if let Some(id) = point.id {
                    yield stringify_point_id(id);
                }
            }

            match result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }
    }
}
