//! Inference engine contract and HTTP client
//!
//! The engine turns a structure identifier into a systematic name by model
//! inference — multi-second, compute-bound work. `InferenceEngine` is the
//! seam the slow resolver drives; `HttpInferenceEngine` talks to the
//! inference sidecar over its JSON contract.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed future alias for dyn-compatible trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine could not be reached or returned garbage. Affects every
    /// uncached item in the batch.
    #[error("inference transport error: {0}")]
    Transport(String),

    /// The model produced no name for one identifier. Affects that slot only.
    #[error("inference produced no name for {0}")]
    NoName(String),
}

/// A name-generating inference backend.
pub trait InferenceEngine: Send + Sync {
    /// Resolve a single identifier.
    fn infer<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, EngineError>>;

    /// Native batch entry point. Engines without one return `None` and the
    /// slow resolver falls back to sequential single-item calls.
    fn infer_batch<'a>(
        &'a self,
        _identifiers: &'a [String],
    ) -> Option<BoxFuture<'a, Result<Vec<Result<String, EngineError>>, EngineError>>> {
        None
    }
}

/// Sentinel the inference sidecar returns for an identifier it cannot name.
const NO_NAME_SENTINEL: &str = "No name found";

#[derive(Serialize)]
struct NameRequest<'a> {
    smiles: &'a [String],
}

#[derive(Deserialize)]
struct NameResponse {
    names: Vec<String>,
}

/// Client for the inference sidecar: `POST /api/name` with a batch of
/// identifiers, answered by a same-length, same-order list of names.
pub struct HttpInferenceEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInferenceEngine {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn call(
        &self,
        identifiers: &[String],
    ) -> Result<Vec<Result<String, EngineError>>, EngineError> {
        let url = format!("{}/api/name", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&NameRequest { smiles: identifiers })
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "engine returned status {status}"
            )));
        }

        let body: NameResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if body.names.len() != identifiers.len() {
            return Err(EngineError::Transport(format!(
                "engine returned {} names for {} identifiers",
                body.names.len(),
                identifiers.len()
            )));
        }

        Ok(body
            .names
            .into_iter()
            .zip(identifiers)
            .map(|(name, identifier)| {
                if name.is_empty() || name == NO_NAME_SENTINEL {
                    Err(EngineError::NoName(identifier.clone()))
                } else {
                    Ok(name)
                }
            })
            .collect())
    }
}

impl InferenceEngine for HttpInferenceEngine {
    fn infer<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, EngineError>> {
        Box::pin(async move {
            let batch = [identifier.to_string()];
            let mut results = self.call(&batch).await?;
            results
                .pop()
                .unwrap_or_else(|| Err(EngineError::NoName(identifier.to_string())))
        })
    }

    fn infer_batch<'a>(
        &'a self,
        identifiers: &'a [String],
    ) -> Option<BoxFuture<'a, Result<Vec<Result<String, EngineError>>, EngineError>>> {
        Some(Box::pin(self.call(identifiers)))
    }
}
