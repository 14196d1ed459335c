//! API Request and Response Models
//!
//! Wire types for every endpoint. Session responses are projected rather
//! than serialized straight from the domain type so one player's payment
//! hash is never exposed to the others.

use crate::draw::DrawProof;
use crate::payments::Invoice;
use crate::session::types::{GameConfig, GameSession, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub wallet_id: String,
    pub buy_in_sats: u64,
    pub target_players: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub ln_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Invoice handed to a joining player or a dice bettor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub payment_hash: String,
    pub payment_request: String,
    pub amount_sats: u64,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            payment_hash: invoice.payment_hash,
            payment_request: invoice.payment_request,
            amount_sats: invoice.amount_sats,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub wallet_id: String,
    pub status: String,
    pub buy_in_sats: u64,
    pub target_players: usize,
    pub haircut_pct: f64,
    pub participants: Vec<ParticipantView>,
    pub paid_count: usize,
    pub pot_sats: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: String,
    pub ln_address: String,
    pub paid: bool,
    pub refunded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeView {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub winner_payout_sats: u64,
    pub house_fee_sats: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw: Option<DrawProof>,
    pub decided_at: DateTime<Utc>,
}

impl From<&GameSession> for SessionResponse {
    fn from(session: &GameSession) -> Self {
        Self {
            id: session.id.clone(),
            wallet_id: session.wallet_id.clone(),
            status: session.status.to_string(),
            buy_in_sats: session.buy_in_sats,
            target_players: session.target_players,
            haircut_pct: session.haircut_pct,
            participants: session
                .participants
                .iter()
                .map(|p| ParticipantView {
                    id: p.id.clone(),
                    ln_address: p.ln_address.clone(),
                    paid: p.paid,
                    refunded: p.refunded,
                })
                .collect(),
            paid_count: session.paid_count(),
            pot_sats: session.pot_sats(),
            outcome: session.outcome.as_ref().map(OutcomeView::from),
            created_at: session.created_at,
        }
    }
}

impl From<&Outcome> for OutcomeView {
    fn from(outcome: &Outcome) -> Self {
        Self {
            kind: format!("{:?}", outcome.kind).to_lowercase(),
            winner: outcome.winner.clone(),
            winner_payout_sats: outcome.winner_payout_sats,
            house_fee_sats: outcome.house_fee_sats,
            draw: outcome.draw.clone(),
            decided_at: outcome.decided_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub wallet_id: String,
    pub version: String,
    pub enabled: bool,
    pub haircut_pct: f64,
    pub max_players: usize,
    pub max_buy_in_sats: u64,
    pub registration_fee_sats: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<GameConfig> for SettingsResponse {
    fn from(config: GameConfig) -> Self {
        Self {
            wallet_id: config.wallet_id,
            version: config.id,
            enabled: config.enabled,
            haircut_pct: config.haircut_pct,
            max_players: config.max_players,
            max_buy_in_sats: config.max_buy_in_sats,
            registration_fee_sats: config.registration_fee_sats,
            updated_at: config.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkBody {
    pub wallet_id: String,
    pub title: String,
    pub base_url: String,
    pub min_bet_sats: u64,
    pub max_bet_sats: u64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletQuery {
    pub wallet_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    pub amount_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub ln_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub ticket_id: String,
    pub paid_sats: u64,
}

/// Provider-facing confirmation callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallbackRequest {
    pub payment_hash: String,
    pub amount_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallbackResponse {
    pub status: String,
}

/// House key players verify draw proofs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessResponse {
    pub public_key: String,
    pub signing_context: String,
}
