//! Session records and the round state machine
//!
//! A [`GameSession`] is one multiplayer round: fixed buy-in, fixed target
//! capacity, ordered participant list, and a status that only ever moves
//! forward (`Open -> Full -> {Settled, Refunded}`, or `Open -> Refunded`
//! when a round is abandoned). Terminal sessions are immutable.

use crate::draw::DrawProof;
use crate::errors::{GameError, GameResult};
use crate::odds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// House configuration for multiplayer rounds, scoped to a wallet.
/// Settings updates supersede the record (fresh `id`, new `updated_at`);
/// configs are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub id: String,
    pub wallet_id: String,
    pub enabled: bool,
    /// House edge percentage withheld from the pot, 0-100.
    pub haircut_pct: f64,
    pub max_players: usize,
    pub max_buy_in_sats: u64,
    /// Flat fee withheld from refunds, in sats. Kept distinct from the
    /// haircut; a refund is always strictly below the buy-in.
    pub registration_fee_sats: u64,
    pub updated_at: DateTime<Utc>,
}

impl GameConfig {
    pub fn new(wallet_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            wallet_id: wallet_id.into(),
            enabled: false,
            haircut_pct: 2.0,
            max_players: 10,
            max_buy_in_sats: 100_000,
            registration_fee_sats: 10,
            updated_at: Utc::now(),
        }
    }

    /// Configuration-time validation. Anything rejected here never reaches
    /// the state machine.
    pub fn validate(&self) -> GameResult<()> {
        if !(0.0..=100.0).contains(&self.haircut_pct) {
            return Err(GameError::validation(format!(
                "haircut must be between 0 and 100, got {}",
                self.haircut_pct
            )));
        }
        if self.max_players < 2 {
            return Err(GameError::validation(format!(
                "max_players must be at least 2, got {}",
                self.max_players
            )));
        }
        if self.max_buy_in_sats == 0 {
            return Err(GameError::validation("max_buy_in_sats must be positive"));
        }
        if self.registration_fee_sats == 0 {
            return Err(GameError::validation(
                "registration_fee_sats must be at least 1 so refunds stay below the buy-in",
            ));
        }
        Ok(())
    }
}

/// Round lifecycle. Transitions are monotonic and terminal states are
/// permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Full,
    Settled,
    Refunded,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Settled | SessionStatus::Refunded)
    }

    fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Open, SessionStatus::Full)
                | (SessionStatus::Open, SessionStatus::Refunded)
                | (SessionStatus::Full, SessionStatus::Settled)
                | (SessionStatus::Full, SessionStatus::Refunded)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Open => "open",
            SessionStatus::Full => "full",
            SessionStatus::Settled => "settled",
            SessionStatus::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

/// One entrant in a round. Appended only after invoice creation; `paid`
/// flips true exactly once per payment hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: String,
    pub ln_address: String,
    pub payment_hash: String,
    pub paid: bool,
    /// Set when a late confirmation was answered with a refund instead of
    /// admission into the outcome.
    pub refunded: bool,
    /// Join order index, 0-based.
    pub joined_at: usize,
}

/// Per-participant view of a decided round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Won,
    Lost,
    Refunded,
}

/// The one-time resolution of a session. Computed exactly once, immutable
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub session_id: String,
    /// `Won` when a winner was drawn; `Refunded` when the round dissolved
    /// (abandoned, or no eligible winner).
    pub kind: OutcomeKind,
    /// Winning participant id, when `kind` is `Won`.
    pub winner: Option<String>,
    pub winner_payout_sats: u64,
    pub house_fee_sats: u64,
    /// Proof bundle for the winner draw, absent for refund outcomes.
    pub draw: Option<DrawProof>,
    pub decided_at: DateTime<Utc>,
}

impl Outcome {
    /// What this outcome means for one participant.
    pub fn for_participant(&self, participant_id: &str) -> OutcomeKind {
        match (&self.kind, self.winner.as_deref()) {
            (OutcomeKind::Won, Some(winner)) if winner == participant_id => OutcomeKind::Won,
            (OutcomeKind::Won, _) => OutcomeKind::Lost,
            _ => OutcomeKind::Refunded,
        }
    }
}

/// One multiplayer round. All mutation goes through `SessionStore` under
/// the per-session lock; the methods here enforce the entity invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub config_id: String,
    pub wallet_id: String,
    pub buy_in_sats: u64,
    pub target_players: usize,
    /// Terms copied from the config at creation, so a settings update
    /// supersedes future rounds without touching live ones.
    pub haircut_pct: f64,
    pub registration_fee_sats: u64,
    pub participants: Vec<Participant>,
    pub status: SessionStatus,
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    /// Validate round terms against the house config and open a session.
    pub fn new(config: &GameConfig, buy_in_sats: u64, target_players: usize) -> GameResult<Self> {
        if !config.enabled {
            return Err(GameError::validation("coinflip is disabled for this wallet"));
        }
        if buy_in_sats == 0 || buy_in_sats > config.max_buy_in_sats {
            return Err(GameError::validation(format!(
                "buy-in must be between 1 and {} sats, got {}",
                config.max_buy_in_sats, buy_in_sats
            )));
        }
        if target_players < 2 || target_players > config.max_players {
            return Err(GameError::validation(format!(
                "target players must be between 2 and {}, got {}",
                config.max_players, target_players
            )));
        }
        if buy_in_sats <= config.registration_fee_sats {
            return Err(GameError::validation(format!(
                "buy-in {} must exceed the registration fee {}",
                buy_in_sats, config.registration_fee_sats
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            config_id: config.id.clone(),
            wallet_id: config.wallet_id.clone(),
            buy_in_sats,
            target_players,
            haircut_pct: config.haircut_pct,
            registration_fee_sats: config.registration_fee_sats,
            participants: Vec::with_capacity(target_players),
            status: SessionStatus::Open,
            outcome: None,
            created_at: Utc::now(),
        })
    }

    /// Append an entrant after their invoice was created. The caller holds
    /// the session lock, which makes the capacity check and the append a
    /// single atomic step against concurrent joins.
    pub fn admit(
        &mut self,
        ln_address: impl Into<String>,
        payment_hash: impl Into<String>,
    ) -> GameResult<&Participant> {
        if self.status.is_terminal() {
            return Err(GameError::AlreadySettled(self.id.clone()));
        }
        if self.participants.len() >= self.target_players {
            return Err(GameError::AlreadyFull(self.id.clone()));
        }

        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            ln_address: ln_address.into(),
            payment_hash: payment_hash.into(),
            paid: false,
            refunded: false,
            joined_at: self.participants.len(),
        };
        self.participants.push(participant);
        Ok(self.participants.last().unwrap())
    }

    pub fn participant_by_hash(&self, payment_hash: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.payment_hash == payment_hash)
    }

    pub fn participant_by_hash_mut(&mut self, payment_hash: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.payment_hash == payment_hash)
    }

    pub fn paid_count(&self) -> usize {
        self.participants.iter().filter(|p| p.paid).count()
    }

    /// True once every target slot is admitted and paid.
    pub fn is_filled(&self) -> bool {
        self.participants.len() == self.target_players
            && self.paid_count() == self.target_players
    }

    /// Total sats captured from paid entrants.
    pub fn pot_sats(&self) -> u64 {
        self.buy_in_sats * self.paid_count() as u64
    }

    /// Refund amount for one entrant of this round.
    pub fn refund_sats(&self) -> u64 {
        odds::refund_sats(self.buy_in_sats, self.registration_fee_sats)
    }

    /// Advance the status. Anything but a forward move is refused, so a
    /// recorded outcome can never be overwritten.
    pub fn transition(&mut self, next: SessionStatus) -> GameResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(GameError::AlreadySettled(self.id.clone()));
        }
        self.status = next;
        Ok(())
    }

    /// Record the outcome exactly once.
    pub fn record_outcome(&mut self, outcome: Outcome) -> GameResult<()> {
        if self.outcome.is_some() {
            return Err(GameError::AlreadySettled(self.id.clone()));
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> GameConfig {
        let mut config = GameConfig::new("wallet-1");
        config.enabled = true;
        config
    }

    #[test]
    fn test_config_validation() {
        let mut config = enabled_config();
        assert!(config.validate().is_ok());

        config.max_players = 1;
        assert!(config.validate().is_err());

        config.max_players = 5;
        config.registration_fee_sats = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_rejects_bad_terms() {
        let config = enabled_config();

        // Buy-in above the house cap.
        assert!(GameSession::new(&config, 200_000, 2).is_err());
        // Too few players.
        assert!(GameSession::new(&config, 1_000, 1).is_err());
        // Too many players.
        assert!(GameSession::new(&config, 1_000, 11).is_err());
        // Buy-in not above the registration fee.
        assert!(GameSession::new(&config, 10, 2).is_err());

        assert!(GameSession::new(&config, 1_000, 2).is_ok());
    }

    #[test]
    fn test_disabled_config_rejects_sessions() {
        let config = GameConfig::new("wallet-1");
        assert!(GameSession::new(&config, 1_000, 2).is_err());
    }

    #[test]
    fn test_admission_caps_at_target() {
        let config = enabled_config();
        let mut session = GameSession::new(&config, 1_000, 2).unwrap();

        session.admit("a@ln.tld", "hash-a").unwrap();
        session.admit("b@ln.tld", "hash-b").unwrap();
        let err = session.admit("c@ln.tld", "hash-c").unwrap_err();
        assert!(matches!(err, GameError::AlreadyFull(_)));
        assert_eq!(session.participants.len(), 2);
    }

    #[test]
    fn test_join_order_is_preserved() {
        let config = enabled_config();
        let mut session = GameSession::new(&config, 1_000, 3).unwrap();

        session.admit("a@ln.tld", "hash-a").unwrap();
        session.admit("b@ln.tld", "hash-b").unwrap();
        session.admit("c@ln.tld", "hash-c").unwrap();

        let order: Vec<usize> = session.participants.iter().map(|p| p.joined_at).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_status_machine_is_monotonic() {
        let config = enabled_config();
        let mut session = GameSession::new(&config, 1_000, 2).unwrap();

        assert!(session.transition(SessionStatus::Settled).is_err());
        session.transition(SessionStatus::Full).unwrap();
        session.transition(SessionStatus::Settled).unwrap();

        // Terminal states accept nothing further.
        assert!(session.transition(SessionStatus::Full).is_err());
        assert!(session.transition(SessionStatus::Refunded).is_err());
    }

    #[test]
    fn test_open_session_can_be_abandoned() {
        let config = enabled_config();
        let mut session = GameSession::new(&config, 1_000, 2).unwrap();
        session.transition(SessionStatus::Refunded).unwrap();
        assert!(session.status.is_terminal());
    }

    #[test]
    fn test_outcome_recorded_once() {
        let config = enabled_config();
        let mut session = GameSession::new(&config, 1_000, 2).unwrap();
        let outcome = Outcome {
            session_id: session.id.clone(),
            kind: OutcomeKind::Refunded,
            winner: None,
            winner_payout_sats: 0,
            house_fee_sats: 0,
            draw: None,
            decided_at: Utc::now(),
        };

        session.record_outcome(outcome.clone()).unwrap();
        assert!(session.record_outcome(outcome).is_err());
    }

    #[test]
    fn test_outcome_per_participant_view() {
        let outcome = Outcome {
            session_id: "s1".into(),
            kind: OutcomeKind::Won,
            winner: Some("p-winner".into()),
            winner_payout_sats: 1_940,
            house_fee_sats: 60,
            draw: None,
            decided_at: Utc::now(),
        };

        assert_eq!(outcome.for_participant("p-winner"), OutcomeKind::Won);
        assert_eq!(outcome.for_participant("p-other"), OutcomeKind::Lost);

        let refunded = Outcome {
            kind: OutcomeKind::Refunded,
            winner: None,
            ..outcome
        };
        assert_eq!(refunded.for_participant("p-winner"), OutcomeKind::Refunded);
    }
}
