//! Session store
//!
//! Owns every live multiplayer round and the house settings. Each session
//! sits behind its own async mutex, so mutations on one session are
//! serialized while different sessions proceed independently; nothing here
//! takes a global lock. Settlement happens inside the same critical
//! section as the confirmation that filled the round, which is what makes
//! it exactly-once.

use crate::errors::{GameError, GameResult};
use crate::hub::{GameEvent, NotificationHub};
use crate::payments::{Invoice, PaymentProvider};
use crate::repository::Repository;
use crate::session::resolver::{Settlement, SettlementResolver};
use crate::session::types::{GameConfig, GameSession, Outcome, OutcomeKind, SessionStatus};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub haircut_pct: Option<f64>,
    pub max_players: Option<usize>,
    pub max_buy_in_sats: Option<u64>,
    pub registration_fee_sats: Option<u64>,
}

/// Store of live rounds, keyed by session id.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<GameSession>>>,
    /// Payment hash -> owning session id, maintained on admission.
    by_hash: DashMap<String, String>,
    /// Active house config per wallet id.
    configs: DashMap<String, GameConfig>,
    /// Rounds that reached a winner.
    settled: AtomicU64,
    resolver: SettlementResolver,
    hub: Arc<NotificationHub>,
    provider: Arc<dyn PaymentProvider>,
    repo: Arc<dyn Repository>,
}

impl SessionStore {
    pub fn new(
        resolver: SettlementResolver,
        hub: Arc<NotificationHub>,
        provider: Arc<dyn PaymentProvider>,
        repo: Arc<dyn Repository>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            by_hash: DashMap::new(),
            configs: DashMap::new(),
            settled: AtomicU64::new(0),
            resolver,
            hub,
            provider,
            repo,
        }
    }

    /// Active house settings for a wallet. Falls back to the (disabled)
    /// defaults when the operator has never saved any.
    pub async fn settings(&self, wallet_id: &str) -> GameResult<GameConfig> {
        if let Some(config) = self.configs.get(wallet_id) {
            return Ok(config.clone());
        }
        if let Some(config) = self.repo.config_by_wallet(wallet_id).await? {
            self.configs.insert(wallet_id.to_string(), config.clone());
            return Ok(config);
        }
        Ok(GameConfig::new(wallet_id))
    }

    /// Supersede the house settings: a fresh config version is validated,
    /// persisted, and becomes the active one. Live rounds keep the terms
    /// they were created with.
    pub async fn update_settings(
        &self,
        wallet_id: &str,
        update: SettingsUpdate,
    ) -> GameResult<GameConfig> {
        let current = self.settings(wallet_id).await?;
        let config = GameConfig {
            id: Uuid::new_v4().to_string(),
            wallet_id: wallet_id.to_string(),
            enabled: update.enabled.unwrap_or(current.enabled),
            haircut_pct: update.haircut_pct.unwrap_or(current.haircut_pct),
            max_players: update.max_players.unwrap_or(current.max_players),
            max_buy_in_sats: update.max_buy_in_sats.unwrap_or(current.max_buy_in_sats),
            registration_fee_sats: update
                .registration_fee_sats
                .unwrap_or(current.registration_fee_sats),
            updated_at: Utc::now(),
        };
        config.validate()?;

        self.repo.save_config(&config).await?;
        self.configs.insert(wallet_id.to_string(), config.clone());
        info!(wallet_id, config_id = %config.id, "house settings updated");
        Ok(config)
    }

    /// Open a new round against the wallet's active settings.
    pub async fn create_session(
        &self,
        wallet_id: &str,
        buy_in_sats: u64,
        target_players: usize,
    ) -> GameResult<GameSession> {
        let config = self.settings(wallet_id).await?;
        let session = GameSession::new(&config, buy_in_sats, target_players)?;

        self.repo.save_session(&session).await?;
        self.sessions
            .insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));

        info!(
            session_id = %session.id,
            wallet_id,
            buy_in_sats,
            target_players,
            "session created"
        );
        Ok(session)
    }

    /// Admit a player: invoice first, then the append, all under the
    /// session lock so two joins racing for the last slot cannot both
    /// succeed. A provider failure propagates and leaves the session
    /// exactly as it was.
    pub async fn join(&self, session_id: &str, ln_address: &str) -> GameResult<Invoice> {
        let entry = self.get_session(session_id).await?;
        let mut session = entry.lock().await;

        if session.status.is_terminal() {
            return Err(GameError::AlreadySettled(session_id.to_string()));
        }
        if session.participants.len() >= session.target_players {
            return Err(GameError::AlreadyFull(session_id.to_string()));
        }

        let memo = format!("coinflip:{}", session.id);
        let invoice = self
            .provider
            .create_invoice(session.buy_in_sats, &memo)
            .await?;

        session.admit(ln_address, &invoice.payment_hash)?;
        self.by_hash
            .insert(invoice.payment_hash.clone(), session.id.clone());
        self.repo.save_session(&session).await?;

        debug!(
            session_id = %session.id,
            ln_address,
            payment_hash = %invoice.payment_hash,
            admitted = session.participants.len(),
            "participant admitted"
        );
        Ok(invoice)
    }

    /// Handle a provider confirmation. Idempotent for replayed hashes; a
    /// confirmation that lands after the round was decided turns into a
    /// refund instead of admission. Filling the last slot settles the
    /// round before the lock is released.
    pub async fn on_payment_confirmed(
        &self,
        payment_hash: &str,
        amount_sats: u64,
    ) -> GameResult<()> {
        let session_id = self
            .by_hash
            .get(payment_hash)
            .map(|entry| entry.clone())
            .ok_or_else(|| GameError::not_found("payment", payment_hash))?;

        let entry = self.get_session(&session_id).await?;
        let mut session = entry.lock().await;

        let idx = session
            .participants
            .iter()
            .position(|p| p.payment_hash == payment_hash)
            .ok_or_else(|| GameError::not_found("payment", payment_hash))?;

        if session.participants[idx].paid {
            return Err(GameError::DuplicateCallback(payment_hash.to_string()));
        }
        if amount_sats != session.buy_in_sats {
            warn!(
                session_id = %session.id,
                payment_hash,
                expected = session.buy_in_sats,
                got = amount_sats,
                "confirmation amount mismatch, ignoring"
            );
            return Ok(());
        }

        if session.status != SessionStatus::Open {
            // Straggler: the round was decided while this payment was in
            // flight. The money is returned less the registration fee.
            return self.refund_straggler(&mut session, idx).await;
        }

        session.participants[idx].paid = true;
        let participant_id = session.participants[idx].id.clone();
        let paid_event = GameEvent::Paid {
            amount_sats: session.buy_in_sats,
        };
        self.hub.publish(payment_hash, paid_event.clone());
        self.hub.publish(&session.id, paid_event);
        debug!(
            session_id = %session.id,
            participant = %participant_id,
            paid = session.paid_count(),
            target = session.target_players,
            "buy-in confirmed"
        );

        if session.is_filled() {
            session.transition(SessionStatus::Full)?;
            self.settle_locked(&mut session).await?;
        } else {
            self.repo.save_session(&session).await?;
        }
        Ok(())
    }

    /// Re-entrant settlement entry point. On an already-decided session
    /// this returns the recorded outcome without publishing anything or
    /// reselecting a winner.
    pub async fn settle(&self, session_id: &str) -> GameResult<Outcome> {
        let entry = self.get_session(session_id).await?;
        let mut session = entry.lock().await;

        if let Some(outcome) = &session.outcome {
            return Ok(outcome.clone());
        }
        if !session.is_filled() {
            return Err(GameError::validation(format!(
                "session {session_id} is not decidable yet"
            )));
        }
        if session.status == SessionStatus::Open {
            session.transition(SessionStatus::Full)?;
        }
        self.settle_locked(&mut session).await
    }

    /// Abandon an open round: every paid participant is refunded their
    /// buy-in less the registration fee.
    pub async fn refund_session(&self, session_id: &str, reason: &str) -> GameResult<Outcome> {
        let entry = self.get_session(session_id).await?;
        let mut session = entry.lock().await;

        if session.status.is_terminal() {
            return Err(GameError::AlreadySettled(session_id.to_string()));
        }

        let settlement = self.resolver.resolve_refund(&session, reason);
        let outcome = settlement.outcome.clone();
        session.record_outcome(outcome.clone())?;
        session.transition(SessionStatus::Refunded)?;

        for (topic, event) in settlement.events() {
            self.hub.publish(&topic, event);
        }
        self.repo.save_session(&session).await?;
        self.dispatch_payouts(&settlement, "coinflip refund");
        Ok(outcome)
    }

    /// Consistent read of one round for reconnecting clients.
    pub async fn snapshot(&self, session_id: &str) -> GameResult<GameSession> {
        let entry = self.get_session(session_id).await?;
        let session = entry.lock().await;
        Ok(session.clone())
    }

    /// Rounds recorded for a wallet, oldest first.
    pub async fn sessions_by_wallet(&self, wallet_id: &str) -> GameResult<Vec<GameSession>> {
        self.repo.sessions_by_wallet(wallet_id).await
    }

    /// Number of sessions currently held live.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Lifetime count of rounds that settled with a winner.
    pub fn settled_count(&self) -> u64 {
        self.settled.load(Ordering::Relaxed)
    }

    /// Decide a full round and make the decision permanent, all under the
    /// caller's session lock.
    async fn settle_locked(&self, session: &mut GameSession) -> GameResult<Outcome> {
        let settlement = self.resolver.resolve(session);
        let outcome = settlement.outcome.clone();

        session.record_outcome(outcome.clone())?;
        let terminal = match outcome.kind {
            OutcomeKind::Won => SessionStatus::Settled,
            _ => SessionStatus::Refunded,
        };
        session.transition(terminal)?;
        if terminal == SessionStatus::Settled {
            self.settled.fetch_add(1, Ordering::Relaxed);
        }

        // Publishing is non-blocking, and doing it before the lock drops
        // means every subscriber observes the fully recorded outcome.
        for (topic, event) in settlement.events() {
            self.hub.publish(&topic, event);
        }
        self.repo.save_session(session).await?;
        self.dispatch_payouts(&settlement, "coinflip winnings");
        Ok(outcome)
    }

    /// Refund a payment that confirmed after the round was decided.
    async fn refund_straggler(&self, session: &mut GameSession, idx: usize) -> GameResult<()> {
        session.participants[idx].paid = true;
        session.participants[idx].refunded = true;
        let participant_id = session.participants[idx].id.clone();
        let ln_address = session.participants[idx].ln_address.clone();
        let payment_hash = session.participants[idx].payment_hash.clone();
        let refund = session.refund_sats();

        warn!(
            session_id = %session.id,
            participant = %participant_id,
            refund_sats = refund,
            "late confirmation refunded"
        );

        let event = GameEvent::Refund {
            participant_id,
            payout_sats: refund,
            reason: "session already settled".to_string(),
        };
        self.hub.publish(&payment_hash, event.clone());
        self.hub.publish(&session.id, event);
        self.repo.save_session(session).await?;

        let provider = self.provider.clone();
        let memo = format!("coinflip refund:{}", session.id);
        tokio::spawn(async move {
            if let Err(e) = provider.pay(&ln_address, refund, &memo).await {
                error!(payment_hash = %payment_hash, error = %e, "straggler refund payment failed");
            }
        });
        Ok(())
    }

    /// Send the outgoing side of a settlement. Failures are logged for
    /// operator follow-up, never retried silently.
    fn dispatch_payouts(&self, settlement: &Settlement, memo_prefix: &str) {
        for payout in settlement.outgoing() {
            let provider = self.provider.clone();
            let payout = payout.clone();
            let memo = format!("{memo_prefix}:{}", settlement.outcome.session_id);
            tokio::spawn(async move {
                match provider.pay(&payout.ln_address, payout.amount_sats, &memo).await {
                    Ok(()) => debug!(
                        participant = %payout.participant_id,
                        amount_sats = payout.amount_sats,
                        "payout sent"
                    ),
                    Err(e) => error!(
                        participant = %payout.participant_id,
                        amount_sats = payout.amount_sats,
                        error = %e,
                        "payout failed"
                    ),
                }
            });
        }
    }

    /// Live session handle, loading from the repository on a cold miss.
    async fn get_session(&self, session_id: &str) -> GameResult<Arc<Mutex<GameSession>>> {
        if let Some(entry) = self.sessions.get(session_id) {
            return Ok(entry.clone());
        }

        let loaded = self
            .repo
            .load_session(session_id)
            .await?
            .ok_or_else(|| GameError::not_found("session", session_id))?;
        for p in &loaded.participants {
            self.by_hash
                .insert(p.payment_hash.clone(), loaded.id.clone());
        }
        Ok(self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone())
    }
}
