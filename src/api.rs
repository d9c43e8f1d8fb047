//! JSON request and response shapes for the ingest and search operations.

use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancelSignal;
use crate::error::EngineError;
use crate::models::{ EmbeddingVector, IngestOutcome, Persistence, ScoredResult, SearchLimit };
use crate::search::SemanticSearch;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub id: Option<String>,
    pub text: String,
}

impl IngestRequest {
    /// Accepts `{ "id"?: string | number, "text": string }`. The text may
    /// also be sent as `data`.
    pub fn from_json(body: &Value) -> Result<Self, EngineError> {
        let text = body
            .get("text")
            .filter(|text| !text.is_null())
            .or_else(|| body.get("data"))
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                EngineError::InvalidInput("'text' must be a non-empty string".to_string())
            })?;

        let id = match body.get("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if id.trim().is_empty() => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => {
                return Err(EngineError::InvalidInput("'id' must be a string or number".to_string()));
            }
        };

        Ok(Self { id, text: text.to_string() })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: SearchLimit,
}

impl SearchRequest {
    pub fn from_json(body: &Value) -> Result<Self, EngineError> {
        let query = body
            .get("query")
            .and_then(Value::as_str)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| {
                EngineError::InvalidInput("'query' must be a non-empty string".to_string())
            })?;

        Ok(Self {
            query: query.to_string(),
            limit: SearchLimit::from_json(body.get("limit")),
        })
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        ErrorBody {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub embedding: EmbeddingVector,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<ErrorBody>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        let (id, warning) = match outcome.persistence {
            Persistence::Stored { id } => (Some(id), None),
            Persistence::Failed { reason } =>
                (None, Some(ErrorBody::from(&EngineError::PersistenceFailed(reason)))),
        };
        IngestResponse {
            persisted: warning.is_none(),
            id,
            embedding: outcome.embedding,
            warning,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredResult>,
}

pub async fn handle_ingest(
    engine: &SemanticSearch,
    body: &Value,
    cancel: &CancelSignal
) -> Result<IngestResponse, ErrorBody> {
    let request = IngestRequest::from_json(body).map_err(|e| ErrorBody::from(&e))?;
    engine
        .ingest_with_cancel(request.id.as_deref(), &request.text, cancel).await
        .map(IngestResponse::from)
        .map_err(|e| ErrorBody::from(&e))
}

pub async fn handle_search(
    engine: &SemanticSearch,
    body: &Value,
    cancel: &CancelSignal
) -> Result<SearchResponse, ErrorBody> {
    let request = SearchRequest::from_json(body).map_err(|e| ErrorBody::from(&e))?;
    engine
        .search_with_cancel(&request.query, request.limit, cancel).await
        .map(|results| SearchResponse { results })
        .map_err(|e| ErrorBody::from(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::search::tests::setup_test_system;
    use serde_json::json;

    #[test]
    fn test_ingest_request_shapes() {
        let request = IngestRequest::from_json(&json!({ "id": 12, "data": "late parcel" })).unwrap();
        assert_eq!(request, IngestRequest {
            id: Some("12".to_string()),
            text: "late parcel".to_string(),
        });

        let request = IngestRequest::from_json(&json!({ "id": "", "text": "x" })).unwrap();
        assert_eq!(request.id, None);

        let request = IngestRequest::from_json(&json!({ "text": null, "data": "lost parcel" })).unwrap();
        assert_eq!(request.text, "lost parcel");

        for bad in [json!({}), json!({ "text": 5 }), json!({ "text": "  " }), json!("text")] {
            let err = IngestRequest::from_json(&bad).unwrap_err();
            assert_eq!(err.kind(), "invalid_input");
        }
        assert!(IngestRequest::from_json(&json!({ "id": [1], "text": "x" })).is_err());
    }

    #[test]
    fn test_search_request_shapes() {
        let request = SearchRequest::from_json(&json!({ "query": "refund" })).unwrap();
        assert_eq!(request.limit.get(), 5);

        let request = SearchRequest::from_json(&json!({ "query": "refund", "limit": -1 })).unwrap();
        assert_eq!(request.limit.get(), 5);

        let request = SearchRequest::from_json(&json!({ "query": "refund", "limit": 3 })).unwrap();
        assert_eq!(request.limit.get(), 3);

        assert!(SearchRequest::from_json(&json!({ "query": null })).is_err());
    }

    #[test]
    fn test_persistence_failure_is_reported_with_embedding() {
        let response = IngestResponse::from(IngestOutcome {
            embedding: EmbeddingVector::new(vec![0.5, 0.5]),
            persistence: Persistence::Failed { reason: "disk full".to_string() },
        });
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["embedding"], json!([0.5, 0.5]));
        assert_eq!(body["persisted"], json!(false));
        assert_eq!(body["warning"]["kind"], json!("persistence_failed"));
        assert!(body.get("id").is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_handlers() {
        let (system, _store, _temp_dir) = setup_test_system().await;

        let never = CancelSignal::never();
        let ingested = handle_ingest(&system, &json!({ "id": "n", "text": "north" }), &never).await.unwrap();
        assert_eq!(ingested.id.as_deref(), Some("n"));
        assert!(ingested.persisted);
        handle_ingest(&system, &json!({ "id": "e", "text": "east" }), &never).await.unwrap();

        let found = handle_search(
            &system,
            &json!({ "query": "north east", "limit": "1" }),
            &CancelSignal::never()
        ).await.unwrap();
        assert_eq!(found.results.len(), 1);

        let err = handle_search(&system, &json!({ "limit": 2 }), &CancelSignal::never()).await.unwrap_err();
        assert_eq!(err.kind, "invalid_input");
    }

    #[tokio::test]
    async fn test_cancelled_ingest_reports_kind() {
        let (system, _store, _temp_dir) = setup_test_system().await;
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let err = handle_ingest(&system, &json!({ "id": "n", "text": "north" }), &signal).await.unwrap_err();
        assert_eq!(err.kind, "cancelled");
    }
}
