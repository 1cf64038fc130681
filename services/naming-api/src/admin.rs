//! Admin API for account management
//!
//! Mounted on the main listener but guarded by a bearer token resolved at
//! startup; when no token is configured the routes are not mounted at all.
//! Intended for a trusted operator network.
//!
//! Endpoints:
//! - POST /admin/accounts               — create an account on a tier
//! - GET  /admin/accounts/{id}          — inspect usage and limits
//! - PUT  /admin/accounts/{id}/tier     — change tier, optionally reset usage
//! - POST /admin/accounts/{id}/reset    — zero both usage counters

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use common::Secret;
use ledger::{Account, CreditLedger, Tier};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AdminState {
    ledger: Arc<CreditLedger>,
    token: Arc<Secret<String>>,
}

impl AdminState {
    pub fn new(ledger: Arc<CreditLedger>, token: Secret<String>) -> Self {
        Self {
            ledger,
            token: Arc::new(token),
        }
    }
}

/// Build the admin axum router with all account management endpoints.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/accounts", post(create_account))
        .route("/admin/accounts/{id}", get(inspect_account))
        .route("/admin/accounts/{id}/tier", put(update_tier))
        .route("/admin/accounts/{id}/reset", post(reset_usage))
        .with_state(state)
}

/// Check the `Authorization: Bearer <token>` header against the configured
/// secret.
fn authorize(state: &AdminState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.token.expose() => Ok(()),
        _ => {
            warn!("admin request rejected: missing or invalid bearer token");
            Err(json_error(StatusCode::UNAUTHORIZED, "invalid bearer token"))
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "error": message }).to_string(),
    )
        .into_response()
}

fn json_ok(body: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn account_body(account: &Account) -> serde_json::Value {
    serde_json::json!({
        "account_id": account.id,
        "tier": account.tier.as_str(),
        "fast_used": account.fast_used,
        "fast_limit": account.fast_limit,
        "premium_used": account.premium_used,
        "premium_limit": account.premium_limit,
        "period_anchor": account.period_anchor.to_rfc3339(),
    })
}

#[derive(Deserialize)]
struct CreateAccountRequest {
    account_id: String,
    #[serde(default)]
    tier: Option<String>,
}

/// POST /admin/accounts — register an account, defaulting to the free tier.
async fn create_account(
    State(state): State<AdminState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateAccountRequest>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let tier = match body.tier.as_deref() {
        None => Tier::Free,
        Some(name) => match Tier::parse(name) {
            Some(tier) => tier,
            None => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &format!("unknown tier: {name}"),
                );
            }
        },
    };

    match state.ledger.create_account(&body.account_id, tier).await {
        Ok(account) => json_ok(account_body(&account)),
        Err(ledger::Error::AlreadyExists(id)) => {
            json_error(StatusCode::CONFLICT, &format!("account already exists: {id}"))
        }
        Err(e) => {
            warn!(account_id = body.account_id, error = %e, "account creation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// GET /admin/accounts/{id} — usage and limits for one account.
async fn inspect_account(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    match state.ledger.account(&id).await {
        Ok(account) => json_ok(account_body(&account)),
        Err(ledger::Error::AccountNotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, &format!("unknown account: {id}"))
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[derive(Deserialize)]
struct UpdateTierRequest {
    tier: String,
    /// Also zero both usage counters, for plan changes that grant a fresh
    /// allowance immediately.
    #[serde(default)]
    reset_usage: bool,
}

/// PUT /admin/accounts/{id}/tier — replace the account's limits.
async fn update_tier(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    axum::Json(body): axum::Json<UpdateTierRequest>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let tier = match Tier::parse(&body.tier) {
        Some(tier) => tier,
        None => {
            return json_error(
                StatusCode::BAD_REQUEST,
                &format!("unknown tier: {}", body.tier),
            );
        }
    };

    if let Err(e) = state.ledger.set_tier_limits(&id, tier).await {
        return match e {
            ledger::Error::AccountNotFound(_) => {
                json_error(StatusCode::NOT_FOUND, &format!("unknown account: {id}"))
            }
            other => json_error(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
        };
    }
    if body.reset_usage
        && let Err(e) = state.ledger.reset_usage(&id).await
    {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }

    info!(
        account_id = id,
        tier = tier.as_str(),
        reset_usage = body.reset_usage,
        "tier updated"
    );

    match state.ledger.account(&id).await {
        Ok(account) => json_ok(account_body(&account)),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// POST /admin/accounts/{id}/reset — zero both usage counters.
async fn reset_usage(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    match state.ledger.reset_usage(&id).await {
        Ok(()) => json_ok(serde_json::json!({ "account_id": id, "status": "reset" })),
        Err(ledger::Error::AccountNotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, &format!("unknown account: {id}"))
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
