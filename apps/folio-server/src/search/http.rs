//! Batch indexer for an external search service

use async_trait::async_trait;
use serde::Serialize;

use super::{SearchDocument, SearchError, SearchIndexer};

/// Posts `{ editionId, documents }` to a search service endpoint
pub struct HttpIndexer {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexBatch<'a> {
    edition_id: &'a str,
    documents: &'a [SearchDocument],
}

impl HttpIndexer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SearchIndexer for HttpIndexer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn index_edition(&self, edition_id: &str, documents: &[SearchDocument]) -> Result<(), SearchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&IndexBatch { edition_id, documents })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(edition_id, documents = documents.len(), url = %self.url, "Submitted search batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let indexer = HttpIndexer::new("http://127.0.0.1:9/index");
        let result = indexer.index_edition("ed-1", &[]).await;
        assert!(matches!(result, Err(SearchError::Http(_))));
    }
}
