//! Request Handlers
//!
//! One handler per endpoint; domain errors keep their taxonomy on the way
//! out (validation 400, missing 404, full/settled conflicts 409, provider
//! failures 502). Payment callbacks are queued to the confirmation
//! listener and acknowledged immediately.

use super::{errors::ApiError, middleware::RequestId, models::*, monitoring::MetricsRegistry};
use crate::{
    dice::{DiceBet, DiceLink, DiceService, LinkRequest},
    errors::GameError,
    hub::NotificationHub,
    payments::PaymentConfirmation,
    session::{SessionStore, SettingsUpdate},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::{atomic::Ordering, Arc};
use tokio::sync::mpsc;

/// Shared application state
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub dice: Arc<DiceService>,
    pub hub: Arc<NotificationHub>,
    pub metrics: Arc<MetricsRegistry>,
    /// Queue feeding the payment confirmation listener.
    pub confirmations: mpsc::Sender<PaymentConfirmation>,
    pub draw_public_key: String,
    pub version: String,
}

impl AppState {
    fn game_error(&self, request_id: &RequestId, err: GameError) -> ApiError {
        self.metrics.record_error();
        ApiError::from_game(request_id.0.clone(), err)
    }
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// House draw key for offline proof verification
/// GET /api/v1/fairness
pub async fn fairness_handler(State(state): State<Arc<AppState>>) -> Json<FairnessResponse> {
    state.metrics.record_request();
    Json(FairnessResponse {
        public_key: state.draw_public_key.clone(),
        signing_context: String::from_utf8_lossy(crate::draw::DRAW_SIGNING_CONTEXT).to_string(),
    })
}

/// Open a new coinflip round
/// POST /api/v1/coinflip
pub async fn create_session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    state.metrics.record_request();
    let session = state
        .sessions
        .create_session(&req.wallet_id, req.buy_in_sats, req.target_players)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    state
        .metrics
        .sessions_created_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(SessionResponse::from(&session)))
}

/// List a wallet's rounds
/// GET /api/v1/coinflip?wallet_id={id}
pub async fn list_sessions_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WalletQuery>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    state.metrics.record_request();
    let sessions = state
        .sessions
        .sessions_by_wallet(&params.wallet_id)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(sessions.iter().map(SessionResponse::from).collect()))
}

/// One round, for reconnecting clients
/// GET /api/v1/coinflip/{session_id}
pub async fn get_session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    state.metrics.record_request();
    let session = state
        .sessions
        .snapshot(&session_id)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(SessionResponse::from(&session)))
}

/// Join a round and receive the buy-in invoice
/// POST /api/v1/coinflip/{session_id}/join
pub async fn join_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    state.metrics.record_request();
    if req.ln_address.trim().is_empty() {
        return Err(ApiError::validation(
            request_id.0,
            "ln_address must not be empty".to_string(),
        ));
    }

    let invoice = state
        .sessions
        .join(&session_id, &req.ln_address)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    state.metrics.joins_total.fetch_add(1, Ordering::SeqCst);
    Ok(Json(invoice.into()))
}

/// Abandon an open round, refunding paid entrants
/// POST /api/v1/coinflip/{session_id}/refund
pub async fn refund_session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<OutcomeView>, ApiError> {
    state.metrics.record_request();
    let reason = req.reason.unwrap_or_else(|| "abandoned by operator".to_string());
    let outcome = state
        .sessions
        .refund_session(&session_id, &reason)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    state
        .metrics
        .sessions_refunded_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(OutcomeView::from(&outcome)))
}

/// Active house settings for a wallet
/// GET /api/v1/coinflip/settings/{wallet_id}
pub async fn get_settings_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<String>,
) -> Result<Json<SettingsResponse>, ApiError> {
    state.metrics.record_request();
    let config = state
        .sessions
        .settings(&wallet_id)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(config.into()))
}

/// Supersede the house settings; live rounds are unaffected
/// PUT /api/v1/coinflip/settings/{wallet_id}
pub async fn update_settings_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsResponse>, ApiError> {
    state.metrics.record_request();
    let config = state
        .sessions
        .update_settings(&wallet_id, update)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(config.into()))
}

/// Publish a dice pay link
/// POST /api/v1/links
pub async fn create_link_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<LinkBody>,
) -> Result<Json<DiceLink>, ApiError> {
    state.metrics.record_request();
    let link = state
        .dice
        .create_link(&body.wallet_id, link_request(&body))
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(link))
}

/// List a wallet's pay links
/// GET /api/v1/links?wallet_id={id}
pub async fn list_links_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WalletQuery>,
) -> Result<Json<Vec<DiceLink>>, ApiError> {
    state.metrics.record_request();
    let links = state
        .dice
        .links_by_wallet(&params.wallet_id)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(links))
}

/// One pay link, as shown to bettors
/// GET /api/v1/links/{link_id}
pub async fn get_link_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
) -> Result<Json<DiceLink>, ApiError> {
    state.metrics.record_request();
    let link = state
        .dice
        .link(&link_id)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(link))
}

/// Edit a pay link
/// PUT /api/v1/links/{link_id}
pub async fn update_link_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
    Json(body): Json<LinkBody>,
) -> Result<Json<DiceLink>, ApiError> {
    state.metrics.record_request();
    let link = state
        .dice
        .update_link(&body.wallet_id, &link_id, link_request(&body))
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(link))
}

/// Remove a pay link
/// DELETE /api/v1/links/{link_id}?wallet_id={id}
pub async fn delete_link_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
    Query(params): Query<WalletQuery>,
) -> Result<StatusCode, ApiError> {
    state.metrics.record_request();
    state
        .dice
        .delete_link(&params.wallet_id, &link_id)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(StatusCode::NO_CONTENT)
}

/// Take a bet against a link and receive the invoice
/// POST /api/v1/links/{link_id}/bet
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
    Json(req): Json<BetRequest>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    state.metrics.record_request();
    let invoice = state
        .dice
        .place_bet(&link_id, req.amount_sats)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    state.metrics.bets_placed_total.fetch_add(1, Ordering::SeqCst);
    Ok(Json(invoice.into()))
}

/// One bet with its resolution and draw proof once rolled
/// GET /api/v1/bets/{payment_hash}
pub async fn get_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(payment_hash): Path<String>,
) -> Result<Json<DiceBet>, ApiError> {
    state.metrics.record_request();
    let bet = state
        .dice
        .bet(&payment_hash)
        .map_err(|e| state.game_error(&request_id, e))?;

    Ok(Json(bet))
}

/// Cash out a winning ticket
/// POST /api/v1/claims/{ticket_id}
pub async fn claim_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    state.metrics.record_request();
    if req.ln_address.trim().is_empty() {
        return Err(ApiError::validation(
            request_id.0,
            "ln_address must not be empty".to_string(),
        ));
    }

    let paid_sats = state
        .dice
        .claim(&ticket_id, &req.ln_address)
        .await
        .map_err(|e| state.game_error(&request_id, e))?;

    state
        .metrics
        .claims_paid_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(ClaimResponse {
        ticket_id,
        paid_sats,
    }))
}

/// Provider confirmation callback; at-least-once, always acknowledged
/// POST /api/v1/payments/callback
pub async fn payment_callback_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentCallbackRequest>,
) -> Result<Json<PaymentCallbackResponse>, ApiError> {
    state.metrics.record_request();
    if req.payment_hash.trim().is_empty() {
        return Err(ApiError::validation(
            request_id.0,
            "payment_hash must not be empty".to_string(),
        ));
    }
    if req.amount_sats == 0 {
        return Err(ApiError::validation(
            request_id.0,
            "amount_sats must be positive".to_string(),
        ));
    }

    state
        .confirmations
        .send(PaymentConfirmation {
            payment_hash: req.payment_hash,
            amount_sats: req.amount_sats,
        })
        .await
        .map_err(|_| {
            ApiError::internal(
                request_id.0.clone(),
                "confirmation listener unavailable".to_string(),
            )
        })?;

    state
        .metrics
        .callbacks_received_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(PaymentCallbackResponse {
        status: "accepted".to_string(),
    }))
}

fn link_request(body: &LinkBody) -> LinkRequest {
    LinkRequest {
        title: body.title.clone(),
        base_url: body.base_url.clone(),
        min_bet_sats: body.min_bet_sats,
        max_bet_sats: body.max_bet_sats,
        multiplier: body.multiplier,
    }
}
