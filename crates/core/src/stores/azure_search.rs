use crate::config::{SearchServiceConfig, SEARCH_API_VERSION};
use crate::models::{RetrievalMode, RetrievalOptions, SearchDocument};
use crate::schema::{IndexDefinition, SEMANTIC_CONFIG};
use crate::traits::{FailedDocument, IndexAdmin, Retriever, UploadSummary};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::{debug, info};
use url::Url;

const BACKEND: &str = "azure-search";

/// The service rejects index batches above this many documents.
pub const MAX_UPLOAD_BATCH: usize = 1000;

pub struct AzureSearchStore {
    client: Client,
    endpoint: Url,
    index_name: String,
    api_key: String,
    retrieval: RetrievalOptions,
}

#[derive(Serialize)]
struct UploadAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    #[serde(flatten)]
    document: &'a SearchDocument,
}

#[derive(Serialize)]
struct UploadBatch<'a> {
    value: Vec<UploadAction<'a>>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    value: Vec<UploadResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResult {
    key: String,
    status: bool,
    #[serde(default)]
    error_message: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search: &'a str,
    top: usize,
    select: &'static str,
    query_type: Option<&'static str>,
    semantic_configuration: Option<&'static str>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    line: Option<String>,
}

impl AzureSearchStore {
    pub fn new(config: &SearchServiceConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            index_name: config.index_name.clone(),
            api_key: config.admin_key.clone(),
            retrieval: RetrievalOptions::default(),
        }
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalOptions) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn url(&self, path: &str) -> Result<Url, SearchError> {
        let mut url = self.endpoint.join(path)?;
        url.query_pairs_mut().append_pair("api-version", SEARCH_API_VERSION);
        Ok(url)
    }

    async fn upload_batch(&self, batch: &[SearchDocument]) -> Result<UploadSummary, SearchError> {
        let payload = UploadBatch {
            value: batch
                .iter()
                .map(|document| UploadAction {
                    action: "upload",
                    document,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.url(&format!("indexes/{}/docs/index", self.index_name))?)
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        read_upload(response).await
    }
}

#[async_trait]
impl IndexAdmin for AzureSearchStore {
    async fn create_or_update_index(
        &self,
        definition: &IndexDefinition,
    ) -> Result<(), SearchError> {
        let response = self
            .client
            .put(self.url(&format!("indexes/{}", definition.name))?)
            .header("api-key", &self.api_key)
            .header("Prefer", "return=representation")
            .json(definition)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        info!(index = %definition.name, status = %response.status(), "index created or updated");
        Ok(())
    }

    async fn upload_documents(
        &self,
        documents: &[SearchDocument],
    ) -> Result<UploadSummary, SearchError> {
        let mut summary = UploadSummary::default();

        for batch in upload_batches(documents) {
            let batch_summary = self.upload_batch(batch).await?;
            debug!(
                index = %self.index_name,
                uploaded = batch_summary.uploaded,
                failed = batch_summary.failed.len(),
                "uploaded batch"
            );
            summary.merge(batch_summary);
        }

        Ok(summary)
    }
}

#[async_trait]
impl Retriever for AzureSearchStore {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, SearchError> {
        let request = search_request(query, &self.retrieval);

        let response = self
            .client
            .post(self.url(&format!("indexes/{}/docs/search", self.index_name))?)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let lines = read_lines(response).await?;
        debug!(index = %self.index_name, hits = lines.len(), "retrieved context");
        Ok(lines)
    }
}

fn search_request<'a>(query: &'a str, options: &RetrievalOptions) -> SearchRequest<'a> {
    let semantic = options.mode == RetrievalMode::Semantic;
    SearchRequest {
        search: query,
        top: options.top,
        select: "line",
        query_type: semantic.then_some("semantic"),
        semantic_configuration: semantic.then_some(SEMANTIC_CONFIG),
    }
}

fn upload_batches(documents: &[SearchDocument]) -> std::slice::Chunks<'_, SearchDocument> {
    documents.chunks(MAX_UPLOAD_BATCH)
}

/// 207 means some documents were rejected; the body says which.
async fn read_upload(response: Response) -> Result<UploadSummary, SearchError> {
    let parsed: UploadResponse = ensure_success(response).await?.json().await?;
    Ok(summarize_upload(parsed))
}

async fn read_lines(response: Response) -> Result<Vec<String>, SearchError> {
    let parsed: SearchResponse = ensure_success(response).await?.json().await?;
    Ok(parsed.value.into_iter().filter_map(|hit| hit.line).collect())
}

fn summarize_upload(response: UploadResponse) -> UploadSummary {
    let mut summary = UploadSummary::default();
    for result in response.value {
        if result.status {
            summary.uploaded += 1;
        } else {
            summary.failed.push(FailedDocument {
                key: result.key,
                reason: result
                    .error_message
                    .unwrap_or_else(|| "rejected by service".to_string()),
            });
        }
    }
    summary
}

async fn ensure_success(response: Response) -> Result<Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> AzureSearchStore {
        let config = SearchServiceConfig::from_values(
            Some("https://example.search.windows.net".to_string()),
            Some("versicherung".to_string()),
            Some("admin".to_string()),
        )
        .expect("config should be valid");
        AzureSearchStore::new(&config)
    }

    #[test]
    fn urls_target_the_index_with_api_version() -> Result<(), SearchError> {
        let url = store().url("indexes/versicherung/docs/search")?;
        assert_eq!(
            url.as_str(),
            "https://example.search.windows.net/indexes/versicherung/docs/search?api-version=2023-11-01"
        );
        Ok(())
    }

    #[test]
    fn simple_search_selects_line_only() -> Result<(), serde_json::Error> {
        let request = search_request("Hausrat", &RetrievalOptions::default());
        assert_eq!(
            serde_json::to_value(&request)?,
            json!({"search": "Hausrat", "top": 3, "select": "line"})
        );
        Ok(())
    }

    #[test]
    fn semantic_search_names_the_configuration() -> Result<(), serde_json::Error> {
        let options = RetrievalOptions {
            top: 5,
            mode: RetrievalMode::Semantic,
        };
        let value = serde_json::to_value(search_request("Kfz", &options))?;
        assert_eq!(value["queryType"], "semantic");
        assert_eq!(value["semanticConfiguration"], SEMANTIC_CONFIG);
        assert_eq!(value["top"], 5);
        Ok(())
    }

    #[test]
    fn upload_actions_flatten_the_document() -> Result<(), serde_json::Error> {
        let document = SearchDocument {
            id: "abc".to_string(),
            line: "Text".to_string(),
            embedding: vec![1.0],
            filename: "a.pdf".to_string(),
        };
        let value = serde_json::to_value(UploadAction {
            action: "upload",
            document: &document,
        })?;
        assert_eq!(
            value,
            json!({"@search.action": "upload", "id": "abc", "line": "Text", "embedding": [1.0], "filename": "a.pdf"})
        );
        Ok(())
    }

    #[test]
    fn partial_upload_failures_are_listed() -> Result<(), serde_json::Error> {
        let response: UploadResponse = serde_json::from_value(json!({
            "value": [
                {"key": "a", "status": true, "errorMessage": null, "statusCode": 201},
                {"key": "b", "status": false, "errorMessage": "too large", "statusCode": 400}
            ]
        }))?;

        let summary = summarize_upload(response);
        assert_eq!(summary.uploaded, 1);
        assert_eq!(
            summary.failed,
            vec![FailedDocument {
                key: "b".to_string(),
                reason: "too large".to_string()
            }]
        );
        Ok(())
    }

    fn response(status: u16, body: &'static str) -> Response {
        Response::from(
            http::Response::builder()
                .status(status)
                .body(body)
                .expect("response should build"),
        )
    }

    fn documents(count: usize) -> Vec<SearchDocument> {
        (0..count)
            .map(|index| SearchDocument {
                id: index.to_string(),
                line: format!("Zeile {index}"),
                embedding: vec![0.0],
                filename: "a.pdf".to_string(),
            })
            .collect()
    }

    #[test]
    fn uploads_are_split_into_batches_of_at_most_a_thousand() {
        let sizes = |count: usize| -> Vec<usize> {
            upload_batches(&documents(count)).map(<[_]>::len).collect()
        };
        assert!(sizes(0).is_empty());
        assert_eq!(sizes(1), vec![1]);
        assert_eq!(sizes(1000), vec![1000]);
        assert_eq!(sizes(1001), vec![1000, 1]);
        assert_eq!(sizes(2500), vec![1000, 1000, 500]);
    }

    #[tokio::test]
    async fn search_hits_without_line_are_dropped() -> Result<(), SearchError> {
        let lines = read_lines(response(
            200,
            r#"{"value": [{"@search.score": 2.1, "line": "eins"}, {"@search.score": 1.0}]}"#,
        ))
        .await?;
        assert_eq!(lines, vec!["eins"]);
        Ok(())
    }

    #[tokio::test]
    async fn multi_status_upload_is_summarized() -> Result<(), SearchError> {
        let summary = read_upload(response(
            207,
            r#"{"value": [{"key": "a", "status": true}, {"key": "b", "status": false}]}"#,
        ))
        .await?;
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.failed[0].key, "b");
        assert_eq!(summary.failed[0].reason, "rejected by service");
        Ok(())
    }

    #[tokio::test]
    async fn error_statuses_become_backend_errors() {
        let result = read_lines(response(403, "wrong key")).await;
        match result {
            Err(SearchError::BackendResponse { backend, details }) => {
                assert_eq!(backend, BACKEND);
                assert!(details.starts_with("403"), "{details}");
                assert!(details.ends_with("wrong key"), "{details}");
            }
            other => panic!("expected backend error, got {other:?}"),
        }

        let result = read_upload(response(503, "busy")).await;
        assert!(matches!(result, Err(SearchError::BackendResponse { .. })));
    }
}
