//! Client for the retrieval collaborator's streaming answer endpoint

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use shared_types::ChatStreamRequest;

pub type AnswerByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("retrieval returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone)]
pub struct RetrievalClient {
    http: reqwest::Client,
    base_url: String,
}

impl RetrievalClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Open the answer stream for one query. Returns the raw SSE byte
    /// stream; decoding happens in the assembler crate.
    pub async fn stream_answer(
        &self,
        request: &ChatStreamRequest,
    ) -> Result<AnswerByteStream, RetrievalError> {
        let response = self
            .http
            .post(format!("{}/chat/stream", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RetrievalError::Status(response.status()));
        }

        Ok(response.bytes_stream().boxed())
    }
}
