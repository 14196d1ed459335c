//! Settlement resolver
//!
//! Turns a filled or abandoned session into its one-time [`Outcome`] plus
//! the payout instructions the store acts on. The resolver never mutates
//! the session and never publishes; `SessionStore` drives both under the
//! session lock, which is what makes settlement exactly-once.

use crate::draw::DrawEngine;
use crate::hub::GameEvent;
use crate::odds;
use crate::session::types::{GameSession, Outcome, OutcomeKind};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// One participant's share of a decided round.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutInstruction {
    pub participant_id: String,
    pub payment_hash: String,
    pub ln_address: String,
    pub kind: OutcomeKind,
    pub amount_sats: u64,
}

/// A computed settlement: the outcome record plus per-participant payouts.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub outcome: Outcome,
    pub payouts: Vec<PayoutInstruction>,
    refund_reason: Option<String>,
}

impl Settlement {
    /// Fan-out plan: every affected participant gets an event on their
    /// payment-hash topic, mirrored on the session topic so round
    /// subscribers see the same resolution.
    pub fn events(&self) -> Vec<(String, GameEvent)> {
        let session_topic = self.outcome.session_id.clone();
        let mut out = Vec::with_capacity(self.payouts.len() * 2);

        for payout in &self.payouts {
            let event = match payout.kind {
                OutcomeKind::Won => GameEvent::Won {
                    participant_id: payout.participant_id.clone(),
                    payout_sats: payout.amount_sats,
                },
                OutcomeKind::Lost => GameEvent::Lost {
                    participant_id: payout.participant_id.clone(),
                },
                OutcomeKind::Refunded => GameEvent::Refund {
                    participant_id: payout.participant_id.clone(),
                    payout_sats: payout.amount_sats,
                    reason: self
                        .refund_reason
                        .clone()
                        .unwrap_or_else(|| "round dissolved".to_string()),
                },
            };
            out.push((payout.payment_hash.clone(), event.clone()));
            out.push((session_topic.clone(), event));
        }
        out
    }

    /// Instructions that move sats back out of the house wallet.
    pub fn outgoing(&self) -> impl Iterator<Item = &PayoutInstruction> {
        self.payouts.iter().filter(|p| p.amount_sats > 0)
    }
}

/// Decides rounds. Stateless apart from the house draw key.
pub struct SettlementResolver {
    draw: Arc<DrawEngine>,
}

impl SettlementResolver {
    pub fn new(draw: Arc<DrawEngine>) -> Self {
        Self { draw }
    }

    /// Resolve a filled round: uniform draw of one winner among the paid
    /// participants. Falls back to a refund outcome if nobody actually
    /// paid, so a round can never get stuck undecided.
    pub fn resolve(&self, session: &GameSession) -> Settlement {
        let paid: Vec<_> = session
            .participants
            .iter()
            .filter(|p| p.paid && !p.refunded)
            .collect();

        if paid.is_empty() {
            return self.resolve_refund(session, "no eligible winner");
        }

        let (winner_idx, proof) = self.draw.winner_index(&session.id, paid.len());
        let winner = paid[winner_idx];

        let pot = session.pot_sats();
        let winner_payout = odds::pot_payout_sats(session.buy_in_sats, paid.len(), session.haircut_pct);
        let house_fee = pot.saturating_sub(winner_payout);

        info!(
            session_id = %session.id,
            winner = %winner.id,
            pot_sats = pot,
            payout_sats = winner_payout,
            house_fee_sats = house_fee,
            "round settled"
        );

        let payouts = paid
            .iter()
            .map(|p| PayoutInstruction {
                participant_id: p.id.clone(),
                payment_hash: p.payment_hash.clone(),
                ln_address: p.ln_address.clone(),
                kind: if p.id == winner.id {
                    OutcomeKind::Won
                } else {
                    OutcomeKind::Lost
                },
                amount_sats: if p.id == winner.id { winner_payout } else { 0 },
            })
            .collect();

        Settlement {
            outcome: Outcome {
                session_id: session.id.clone(),
                kind: OutcomeKind::Won,
                winner: Some(winner.id.clone()),
                winner_payout_sats: winner_payout,
                house_fee_sats: house_fee,
                draw: Some(proof),
                decided_at: Utc::now(),
            },
            payouts,
            refund_reason: None,
        }
    }

    /// Resolve a dissolved round: every paid participant gets their buy-in
    /// back less the registration fee.
    pub fn resolve_refund(&self, session: &GameSession, reason: &str) -> Settlement {
        let refund = session.refund_sats();
        let payouts: Vec<_> = session
            .participants
            .iter()
            .filter(|p| p.paid && !p.refunded)
            .map(|p| PayoutInstruction {
                participant_id: p.id.clone(),
                payment_hash: p.payment_hash.clone(),
                ln_address: p.ln_address.clone(),
                kind: OutcomeKind::Refunded,
                amount_sats: refund,
            })
            .collect();

        let house_fee = session.registration_fee_sats * payouts.len() as u64;
        info!(
            session_id = %session.id,
            refunds = payouts.len(),
            reason,
            "round refunded"
        );

        Settlement {
            outcome: Outcome {
                session_id: session.id.clone(),
                kind: OutcomeKind::Refunded,
                winner: None,
                winner_payout_sats: 0,
                house_fee_sats: house_fee,
                draw: None,
                decided_at: Utc::now(),
            },
            payouts,
            refund_reason: Some(reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::GameConfig;

    fn filled_session(buy_in: u64, players: usize, haircut: f64) -> GameSession {
        let mut config = GameConfig::new("wallet-1");
        config.enabled = true;
        config.haircut_pct = haircut;
        let mut session = GameSession::new(&config, buy_in, players).unwrap();
        for i in 0..players {
            session.admit(format!("p{i}@ln.tld"), format!("hash-{i}")).unwrap();
            session.participants[i].paid = true;
        }
        session
    }

    fn resolver() -> SettlementResolver {
        SettlementResolver::new(Arc::new(DrawEngine::new_random()))
    }

    #[test]
    fn test_two_player_winner_take_all() {
        let session = filled_session(1_000, 2, 3.0);
        let settlement = resolver().resolve(&session);

        assert_eq!(settlement.outcome.kind, OutcomeKind::Won);
        assert_eq!(settlement.outcome.winner_payout_sats, 1_940);
        assert_eq!(settlement.outcome.house_fee_sats, 60);
        assert_eq!(
            settlement.outcome.winner_payout_sats + settlement.outcome.house_fee_sats,
            2 * 1_000
        );

        let winners: Vec<_> = settlement
            .payouts
            .iter()
            .filter(|p| p.kind == OutcomeKind::Won)
            .collect();
        let losers: Vec<_> = settlement
            .payouts
            .iter()
            .filter(|p| p.kind == OutcomeKind::Lost)
            .collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(losers.len(), 1);
        assert_eq!(losers[0].amount_sats, 0);
    }

    #[test]
    fn test_winner_is_a_paid_participant() {
        let session = filled_session(500, 4, 0.0);
        let settlement = resolver().resolve(&session);

        let winner_id = settlement.outcome.winner.clone().unwrap();
        assert!(session.participants.iter().any(|p| p.id == winner_id));
        assert!(settlement.outcome.draw.is_some());
        assert_eq!(settlement.outcome.winner_payout_sats, 2_000);
    }

    #[test]
    fn test_nobody_paid_dissolves_into_refund() {
        let mut config = GameConfig::new("wallet-1");
        config.enabled = true;
        let mut session = GameSession::new(&config, 1_000, 2).unwrap();
        session.admit("a@ln.tld", "hash-a").unwrap();

        let settlement = resolver().resolve(&session);
        assert_eq!(settlement.outcome.kind, OutcomeKind::Refunded);
        assert!(settlement.outcome.winner.is_none());
        assert!(settlement.payouts.is_empty());
    }

    #[test]
    fn test_refund_deducts_registration_fee() {
        let session = filled_session(1_000, 3, 2.0);
        let settlement = resolver().resolve_refund(&session, "abandoned by operator");

        assert_eq!(settlement.payouts.len(), 3);
        for payout in &settlement.payouts {
            assert_eq!(payout.kind, OutcomeKind::Refunded);
            assert!(payout.amount_sats < session.buy_in_sats);
            assert_eq!(payout.amount_sats, 1_000 - session.registration_fee_sats);
        }
        assert_eq!(
            settlement.outcome.house_fee_sats,
            3 * session.registration_fee_sats
        );
    }

    #[test]
    fn test_events_cover_both_topics() {
        let session = filled_session(1_000, 2, 3.0);
        let settlement = resolver().resolve(&session);
        let events = settlement.events();

        // One event per participant on their payment topic plus the mirror
        // on the session topic.
        assert_eq!(events.len(), 4);
        assert_eq!(
            events
                .iter()
                .filter(|(topic, _)| topic == &session.id)
                .count(),
            2
        );
        assert!(events.iter().any(|(_, e)| e.kind() == "won"));
        assert!(events.iter().any(|(_, e)| e.kind() == "lost"));
    }
}
