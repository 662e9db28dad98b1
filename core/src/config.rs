//! Client options shared by `RequestExecutor` and `UploadManager`.

use serde::Deserialize;

use crate::error::ApiError;
use crate::query::QueryEncoding;

pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Optional knobs. `ClientOptions::default()` is what `new(endpoint)` uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub query_encoding: QueryEncoding,
    /// Size of the chunks an upload body is streamed in. Progress is reported
    /// once per chunk.
    pub upload_chunk_size: usize,
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            query_encoding: QueryEncoding::default(),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            user_agent: None,
        }
    }
}

impl ClientOptions {
    pub fn query_encoding(mut self, encoding: QueryEncoding) -> Self {
        self.query_encoding = encoding;
        self
    }

    /// Zero is clamped to one byte.
    pub fn upload_chunk_size(mut self, size: usize) -> Self {
        self.upload_chunk_size = size.max(1);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.upload_chunk_size.max(1)
    }

    /// Build the reqwest client these options describe.
    pub(crate) fn build_http_client(&self) -> Result<reqwest::Client, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        builder.build().map_err(|e| ApiError::Client(e.to_string()))
    }
}
