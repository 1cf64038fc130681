//! Resolve endpoint
//!
//! `POST /api/name` takes an account id plus one identifier or a list of
//! them, and answers with a same-order result per identifier. Billing
//! rejections surface as per-item `credit_exceeded` statuses on a 200
//! response; only invalid input and unknown accounts fail the request.

use std::sync::Arc;

use pipeline::{Orchestrator, Resolution};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::usage::UsageLogger;

#[derive(Clone)]
pub struct ResolveState {
    pub orchestrator: Arc<Orchestrator>,
    pub usage: Arc<UsageLogger>,
}

/// The original single-identifier contract still works: a bare string is
/// treated as a batch of one.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum SmilesInput {
    One(String),
    Many(Vec<String>),
}

impl SmilesInput {
    fn into_vec(self) -> Vec<String> {
        match self {
            SmilesInput::One(s) => vec![s],
            SmilesInput::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
pub struct NameRequest {
    pub account_id: String,
    pub smiles: SmilesInput,
}

#[derive(Debug, Serialize)]
pub struct NameResult {
    pub smiles: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct NameResponse {
    pub results: Vec<NameResult>,
    pub fast_credits_used: u64,
    pub premium_credits_used: f64,
}

/// Validate, resolve, and bill one request.
pub async fn resolve(
    state: &ResolveState,
    request: NameRequest,
    request_id: &str,
) -> Result<NameResponse, ApiError> {
    let identifiers = request.smiles.into_vec();

    let problems: Vec<String> = identifiers
        .iter()
        .enumerate()
        .filter_map(|(index, identifier)| {
            resolver::validate_identifier(identifier)
                .err()
                .map(|reason| format!("smiles[{index}]: {reason}"))
        })
        .collect();
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    info!(
        request_id,
        account_id = request.account_id.as_str(),
        items = identifiers.len(),
        "resolving batch"
    );

    let outcome = state
        .orchestrator
        .resolve_names(&request.account_id, &identifiers)
        .await?;

    state.usage.record(&request.account_id, &outcome);
    crate::metrics::record_batch(&outcome);

    let results = outcome
        .items
        .into_iter()
        .map(|item| match item.outcome {
            Resolution::Named(name) => NameResult {
                smiles: item.identifier,
                name: Some(name),
                status: "named",
            },
            Resolution::CreditExceeded => NameResult {
                smiles: item.identifier,
                name: None,
                status: "credit_exceeded",
            },
            Resolution::Failed => NameResult {
                smiles: item.identifier,
                name: None,
                status: "failed",
            },
        })
        .collect();

    Ok(NameResponse {
        results,
        fast_credits_used: outcome.totals.fast_credits,
        premium_credits_used: outcome.totals.premium_credits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{CreditLedger, MemoryStore, Tier};
    use resolver::{
        BoxFuture, EngineError, FastResolver, InferenceEngine, LocalLookup, ResultCache,
        SlowResolver,
    };

    struct NoEngine;

    impl InferenceEngine for NoEngine {
        fn infer<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, EngineError>> {
            Box::pin(async move { Err(EngineError::NoName(identifier.to_string())) })
        }
    }

    async fn state_with_local(entries: &[(&str, &str)]) -> ResolveState {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(CreditLedger::new(store));
        ledger.create_account("acct", Tier::Free).await.unwrap();

        let fast = Arc::new(FastResolver::new(
            Arc::new(LocalLookup::from_entries(
                entries.iter().map(|&(k, v)| (k, v)),
            )),
            reqwest::Client::new(),
            None,
        ));
        let slow = Arc::new(SlowResolver::new(
            Arc::new(NoEngine),
            Arc::new(ResultCache::new(8)),
            1,
        ));

        ResolveState {
            orchestrator: Arc::new(Orchestrator::new(ledger, fast, slow, 2)),
            usage: Arc::new(UsageLogger::new(10)),
        }
    }

    #[tokio::test]
    async fn single_string_is_a_batch_of_one() {
        let state = state_with_local(&[("CCO", "ethanol")]).await;
        let request = NameRequest {
            account_id: "acct".into(),
            smiles: SmilesInput::One("CCO".into()),
        };

        let response = resolve(&state, request, "req_test").await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].status, "named");
        assert_eq!(response.results[0].name.as_deref(), Some("ethanol"));
        assert_eq!(response.fast_credits_used, 1);
    }

    #[tokio::test]
    async fn invalid_identifier_rejects_the_whole_request() {
        let state = state_with_local(&[("CCO", "ethanol")]).await;
        let request = NameRequest {
            account_id: "acct".into(),
            smiles: SmilesInput::Many(vec!["CCO".into(), "CC(O".into()]),
        };

        let err = resolve(&state, request, "req_test").await.unwrap_err();
        match err {
            ApiError::Validation(details) => {
                assert_eq!(details.len(), 1);
                assert!(details[0].starts_with("smiles[1]:"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let state = state_with_local(&[]).await;
        let request = NameRequest {
            account_id: "ghost".into(),
            smiles: SmilesInput::One("CCO".into()),
        };

        let err = resolve(&state, request, "req_test").await.unwrap_err();
        assert!(matches!(err, ApiError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn unresolvable_item_reports_failed_without_a_name() {
        let state = state_with_local(&[("CCO", "ethanol")]).await;
        let request = NameRequest {
            account_id: "acct".into(),
            smiles: SmilesInput::Many(vec!["CCO".into(), "CCC".into()]),
        };

        let response = resolve(&state, request, "req_test").await.unwrap();

        assert_eq!(response.results[0].status, "named");
        assert_eq!(response.results[1].status, "failed");
        assert!(response.results[1].name.is_none());
        assert_eq!(response.premium_credits_used, 0.0);
    }

    #[test]
    fn request_body_accepts_string_or_list() {
        let one: NameRequest =
            serde_json::from_str(r#"{"account_id":"a","smiles":"CCO"}"#).unwrap();
        assert_eq!(one.smiles.into_vec(), vec!["CCO".to_string()]);

        let many: NameRequest =
            serde_json::from_str(r#"{"account_id":"a","smiles":["CCO","CCC"]}"#).unwrap();
        assert_eq!(
            many.smiles.into_vec(),
            vec!["CCO".to_string(), "CCC".to_string()]
        );
    }

    #[test]
    fn response_omits_name_when_absent() {
        let response = NameResponse {
            results: vec![NameResult {
                smiles: "xyz".into(),
                name: None,
                status: "failed",
            }],
            fast_credits_used: 0,
            premium_credits_used: 0.0,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["results"][0].get("name").is_none());
    }
}
