//! Azure AI Search REST client (hybrid keyword + vector queries).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use archdoc_core::services::KnowledgeIndex;
use archdoc_shared::{ArchDocError, Result, RetrievedChunk, SearchConfig};

use crate::http::{api_url, build_client, post_json};

const SELECT_FIELDS: &str = "chunk,title";
const UNKNOWN_TITLE: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct AzureSearchClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    index_name: String,
    api_version: String,
    vector_field: String,
}

impl AzureSearchClient {
    pub fn new(config: &SearchConfig, api_key: String) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ArchDocError::config("search.endpoint is not set"))?;
        Ok(Self {
            client: build_client()?,
            endpoint,
            api_key,
            index_name: config.index_name.clone(),
            api_version: config.api_version.clone(),
            vector_field: config.vector_field.clone(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search: &'a str,
    vector_queries: [VectorQuery<'a>; 1],
    select: &'a str,
    top: usize,
}

#[derive(Serialize)]
struct VectorQuery<'a> {
    kind: &'a str,
    vector: &'a [f32],
    fields: &'a str,
    k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score", default)]
    score: f64,
    #[serde(default)]
    chunk: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl From<SearchHit> for RetrievedChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            content: hit.chunk.unwrap_or_default(),
            score: hit.score,
            title: hit
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        }
    }
}

impl KnowledgeIndex for AzureSearchClient {
    #[instrument(skip_all, fields(index = %self.index_name, top_k = top_k))]
    async fn hybrid_search(&self, query: &str, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let url = api_url(
            &self.endpoint,
            &format!("indexes/{}/docs/search", self.index_name),
            &self.api_version,
        )?;
        let body = SearchRequest {
            search: query,
            vector_queries: [VectorQuery {
                kind: "vector",
                vector,
                fields: &self.vector_field,
                k: top_k,
            }],
            select: SELECT_FIELDS,
            top: top_k,
        };

        let response: SearchResponse = post_json(&self.client, url, &self.api_key, &body).await?;
        let chunks: Vec<RetrievedChunk> = response.value.into_iter().map(Into::into).collect();

        debug!(query, hits = chunks.len(), "hybrid search complete");
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AzureSearchClient {
        let config = SearchConfig {
            endpoint: Some(Url::parse(&server.uri()).unwrap()),
            ..Default::default()
        };
        AzureSearchClient::new(&config, "search-key".into()).unwrap()
    }

    #[tokio::test]
    async fn hybrid_search_maps_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/tad-knowledge-base/docs/search"))
            .and(query_param("api-version", "2023-11-01"))
            .and(header("api-key", "search-key"))
            .and(body_partial_json(serde_json::json!({
                "search": "vnet naming",
                "vectorQueries": [{"kind": "vector", "fields": "text_vector", "k": 5}],
                "select": "chunk,title",
                "top": 5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    {"@search.score": 0.91, "chunk": "VNets use the pattern ...", "title": "naming.pdf"},
                    {"@search.score": 0.42, "chunk": "Subnets ..."}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chunks = client(&server)
            .hybrid_search("vnet naming", &[0.1, 0.2], 5)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title, "naming.pdf");
        assert!((chunks[0].score - 0.91).abs() < 1e-9);
        assert_eq!(chunks[1].title, UNKNOWN_TITLE);
    }

    #[tokio::test]
    async fn no_hits_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
            .mount(&server)
            .await;

        let chunks = client(&server).hybrid_search("anything", &[0.0], 5).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn service_error_is_transient_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let err = client(&server).hybrid_search("q", &[0.0], 5).await.unwrap_err();
        assert!(matches!(err, ArchDocError::Network(_)));
        assert!(err.to_string().contains("503"));
        assert!(err.is_transient());
    }
}
