//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{
    handlers::*,
    monitoring::{health_detail_handler, metrics_handler, metrics_json_handler},
    websocket::topic_websocket_handler,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and monitoring
        .route("/health", get(health_handler))
        .route("/health/detail", get(health_detail_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/json", get(metrics_json_handler))
        // Provably fair draw verification info
        .route("/api/v1/fairness", get(fairness_handler))
        // Multiplayer coinflip rounds
        .route(
            "/api/v1/coinflip",
            post(create_session_handler).get(list_sessions_handler),
        )
        .route("/api/v1/coinflip/:session_id", get(get_session_handler))
        .route("/api/v1/coinflip/:session_id/join", post(join_handler))
        .route(
            "/api/v1/coinflip/:session_id/refund",
            post(refund_session_handler),
        )
        .route(
            "/api/v1/coinflip/settings/:wallet_id",
            get(get_settings_handler).put(update_settings_handler),
        )
        // Dice pay links and bets
        .route(
            "/api/v1/links",
            post(create_link_handler).get(list_links_handler),
        )
        .route(
            "/api/v1/links/:link_id",
            get(get_link_handler)
                .put(update_link_handler)
                .delete(delete_link_handler),
        )
        .route("/api/v1/links/:link_id/bet", post(place_bet_handler))
        .route("/api/v1/bets/:payment_hash", get(get_bet_handler))
        .route("/api/v1/claims/:ticket_id", post(claim_handler))
        // Payment provider callback
        .route("/api/v1/payments/callback", post(payment_callback_handler))
        // WebSocket topic subscriptions
        .route("/api/v1/ws/:topic", get(topic_websocket_handler))
        // Attach shared state
        .with_state(state)
}
