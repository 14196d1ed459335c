//! Dice pay links
//!
//! Single-player dice: an operator publishes a pay link carrying a
//! multiplier, a bettor pays an invoice against it, and the confirmed
//! payment is rolled on the spot. A winning roll mints a single-use claim
//! ticket for the payout; losing rolls keep the sats. Odds are captured on
//! the bet at placement, so editing a link never changes a bet already in
//! flight.

use crate::draw::{DrawEngine, DrawProof};
use crate::errors::{GameError, GameResult};
use crate::hub::{GameEvent, NotificationHub};
use crate::odds;
use crate::payments::{Invoice, PaymentProvider};
use crate::repository::Repository;
use crate::session::types::GameConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Operator input for creating or editing a pay link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    pub title: String,
    /// Prefix for the shareable bet page, e.g. `https://dice.example.com`.
    pub base_url: String,
    pub min_bet_sats: u64,
    pub max_bet_sats: u64,
    pub multiplier: f64,
}

/// A published dice pay link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceLink {
    pub id: String,
    pub wallet_id: String,
    pub title: String,
    pub base_url: String,
    pub min_bet_sats: u64,
    pub max_bet_sats: u64,
    pub multiplier: f64,
    /// Haircut applied when the chance was computed.
    pub haircut_pct: f64,
    /// Win chance in percent, derived from multiplier and haircut.
    pub chance_pct: f64,
    /// Lifetime sats collected from resolved bets.
    pub collected_sats: u64,
    /// Paid bets resolved against this link.
    pub served_bets: u64,
    pub open_time: DateTime<Utc>,
}

/// One bet against a link, keyed by its invoice payment hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceBet {
    pub payment_hash: String,
    pub link_id: String,
    pub value_sats: u64,
    /// Terms frozen at placement.
    pub multiplier: f64,
    pub chance_pct: f64,
    pub paid: bool,
    pub roll_bp: Option<u32>,
    pub won: Option<bool>,
    pub draw: Option<DrawProof>,
    pub created_at: DateTime<Utc>,
}

/// Single-use payout ticket minted by a winning roll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTicket {
    pub id: String,
    pub payment_hash: String,
    pub value_sats: u64,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// Pay links, pending bets, and claim tickets for the dice game.
pub struct DiceService {
    links: DashMap<String, DiceLink>,
    bets: DashMap<String, DiceBet>,
    tickets: DashMap<String, ClaimTicket>,
    draw: Arc<DrawEngine>,
    hub: Arc<NotificationHub>,
    provider: Arc<dyn PaymentProvider>,
    repo: Arc<dyn Repository>,
}

impl DiceService {
    pub fn new(
        draw: Arc<DrawEngine>,
        hub: Arc<NotificationHub>,
        provider: Arc<dyn PaymentProvider>,
        repo: Arc<dyn Repository>,
    ) -> Self {
        Self {
            links: DashMap::new(),
            bets: DashMap::new(),
            tickets: DashMap::new(),
            draw,
            hub,
            provider,
            repo,
        }
    }

    /// Publish a new pay link under the wallet's current haircut.
    pub async fn create_link(&self, wallet_id: &str, req: LinkRequest) -> GameResult<DiceLink> {
        Self::validate_request(&req)?;
        let haircut_pct = self.house_haircut(wallet_id).await?;
        let chance_pct = odds::chance(req.multiplier, haircut_pct)?;

        let link = DiceLink {
            id: Uuid::new_v4().to_string(),
            wallet_id: wallet_id.to_string(),
            title: req.title,
            base_url: req.base_url,
            min_bet_sats: req.min_bet_sats,
            max_bet_sats: req.max_bet_sats,
            multiplier: req.multiplier,
            haircut_pct,
            chance_pct,
            collected_sats: 0,
            served_bets: 0,
            open_time: Utc::now(),
        };

        self.repo.save_link(&link).await?;
        self.links.insert(link.id.clone(), link.clone());
        info!(
            link_id = %link.id,
            wallet_id,
            multiplier = link.multiplier,
            chance_pct = link.chance_pct,
            "dice link created"
        );
        Ok(link)
    }

    /// Edit a link's terms. The chance is recomputed against the wallet's
    /// current haircut; counters and the open time are preserved.
    pub async fn update_link(
        &self,
        wallet_id: &str,
        link_id: &str,
        req: LinkRequest,
    ) -> GameResult<DiceLink> {
        Self::validate_request(&req)?;
        let existing = self.link(link_id).await?;
        if existing.wallet_id != wallet_id {
            return Err(GameError::not_found("link", link_id));
        }

        let haircut_pct = self.house_haircut(wallet_id).await?;
        let chance_pct = odds::chance(req.multiplier, haircut_pct)?;

        let link = DiceLink {
            title: req.title,
            base_url: req.base_url,
            min_bet_sats: req.min_bet_sats,
            max_bet_sats: req.max_bet_sats,
            multiplier: req.multiplier,
            haircut_pct,
            chance_pct,
            ..existing
        };

        self.repo.save_link(&link).await?;
        self.links.insert(link.id.clone(), link.clone());
        Ok(link)
    }

    pub async fn delete_link(&self, wallet_id: &str, link_id: &str) -> GameResult<()> {
        let existing = self.link(link_id).await?;
        if existing.wallet_id != wallet_id {
            return Err(GameError::not_found("link", link_id));
        }
        self.repo.delete_link(link_id).await?;
        self.links.remove(link_id);
        info!(link_id, wallet_id, "dice link deleted");
        Ok(())
    }

    pub async fn link(&self, link_id: &str) -> GameResult<DiceLink> {
        if let Some(link) = self.links.get(link_id) {
            return Ok(link.clone());
        }
        let link = self
            .repo
            .load_link(link_id)
            .await?
            .ok_or_else(|| GameError::not_found("link", link_id))?;
        self.links.insert(link.id.clone(), link.clone());
        Ok(link)
    }

    pub async fn links_by_wallet(&self, wallet_id: &str) -> GameResult<Vec<DiceLink>> {
        self.repo.links_by_wallet(wallet_id).await
    }

    /// Take a bet against a link: invoice first, then a pending bet with
    /// the link's terms frozen onto it.
    pub async fn place_bet(&self, link_id: &str, amount_sats: u64) -> GameResult<Invoice> {
        let link = self.link(link_id).await?;
        if amount_sats < link.min_bet_sats || amount_sats > link.max_bet_sats {
            return Err(GameError::validation(format!(
                "bet must be between {} and {} sats",
                link.min_bet_sats, link.max_bet_sats
            )));
        }

        let memo = format!("dice:{}", link.id);
        let invoice = self.provider.create_invoice(amount_sats, &memo).await?;

        let bet = DiceBet {
            payment_hash: invoice.payment_hash.clone(),
            link_id: link.id.clone(),
            value_sats: amount_sats,
            multiplier: link.multiplier,
            chance_pct: link.chance_pct,
            paid: false,
            roll_bp: None,
            won: None,
            draw: None,
            created_at: Utc::now(),
        };
        self.bets.insert(bet.payment_hash.clone(), bet);

        debug!(
            link_id = %link.id,
            payment_hash = %invoice.payment_hash,
            amount_sats,
            "bet placed"
        );
        Ok(invoice)
    }

    pub fn bet(&self, payment_hash: &str) -> GameResult<DiceBet> {
        self.bets
            .get(payment_hash)
            .map(|b| b.clone())
            .ok_or_else(|| GameError::not_found("bet", payment_hash))
    }

    /// Resolve a confirmed bet: flip it to paid exactly once, roll, and
    /// either mint a claim ticket or record the loss. The win notification
    /// carries the ticket id so the bettor can claim without polling.
    pub async fn on_payment_confirmed(
        &self,
        payment_hash: &str,
        amount_sats: u64,
    ) -> GameResult<()> {
        let (link_id, value_sats, multiplier, chance_pct) = {
            let mut bet = self
                .bets
                .get_mut(payment_hash)
                .ok_or_else(|| GameError::not_found("payment", payment_hash))?;
            if bet.paid {
                return Err(GameError::DuplicateCallback(payment_hash.to_string()));
            }
            if amount_sats != bet.value_sats {
                warn!(
                    payment_hash,
                    expected = bet.value_sats,
                    got = amount_sats,
                    "confirmation amount mismatch, ignoring"
                );
                return Ok(());
            }
            bet.paid = true;
            (
                bet.link_id.clone(),
                bet.value_sats,
                bet.multiplier,
                bet.chance_pct,
            )
        };

        let (roll_bp, proof) = self.draw.roll(payment_hash);
        let won = odds::roll_wins(roll_bp, chance_pct);
        if let Some(mut bet) = self.bets.get_mut(payment_hash) {
            bet.roll_bp = Some(roll_bp);
            bet.won = Some(won);
            bet.draw = Some(proof);
        }

        self.hub.publish(payment_hash, GameEvent::Paid { amount_sats });

        if won {
            let payout_sats = odds::win_payout_sats(value_sats, multiplier);
            let ticket = ClaimTicket {
                id: Uuid::new_v4().to_string(),
                payment_hash: payment_hash.to_string(),
                value_sats: payout_sats,
                used: false,
                created_at: Utc::now(),
            };
            self.tickets.insert(ticket.id.clone(), ticket.clone());
            info!(
                link_id = %link_id,
                payment_hash,
                roll_bp,
                payout_sats,
                ticket_id = %ticket.id,
                "dice roll won"
            );
            self.hub.publish(
                payment_hash,
                GameEvent::Won {
                    participant_id: ticket.id,
                    payout_sats,
                },
            );
        } else {
            debug!(link_id = %link_id, payment_hash, roll_bp, "dice roll lost");
            self.hub.publish(
                payment_hash,
                GameEvent::Lost {
                    participant_id: payment_hash.to_string(),
                },
            );
        }

        // Link counters: a link deleted mid-flight just skips the
        // bookkeeping, the bet itself resolved above.
        let updated = self.links.get_mut(&link_id).map(|mut link| {
            link.collected_sats += value_sats;
            link.served_bets += 1;
            link.clone()
        });
        if let Some(link) = updated {
            self.repo.save_link(&link).await?;
        }
        Ok(())
    }

    /// Cash a ticket out. The ticket is burned before the payment goes
    /// out; a provider failure restores it so the winner can retry.
    pub async fn claim(&self, ticket_id: &str, ln_address: &str) -> GameResult<u64> {
        let value_sats = {
            let mut ticket = self
                .tickets
                .get_mut(ticket_id)
                .ok_or_else(|| GameError::not_found("claim", ticket_id))?;
            if ticket.used {
                return Err(GameError::AlreadySettled(ticket_id.to_string()));
            }
            ticket.used = true;
            ticket.value_sats
        };

        let memo = format!("dice winnings:{ticket_id}");
        match self.provider.pay(ln_address, value_sats, &memo).await {
            Ok(()) => {
                info!(ticket_id, ln_address, value_sats, "claim paid");
                Ok(value_sats)
            }
            Err(e) => {
                if let Some(mut ticket) = self.tickets.get_mut(ticket_id) {
                    ticket.used = false;
                }
                warn!(ticket_id, error = %e, "claim payment failed, ticket restored");
                Err(e)
            }
        }
    }

    /// Pending bets not yet confirmed, for monitoring.
    pub fn pending_bets(&self) -> usize {
        self.bets.iter().filter(|b| !b.paid).count()
    }

    fn validate_request(req: &LinkRequest) -> GameResult<()> {
        if req.title.trim().is_empty() {
            return Err(GameError::validation("link title must not be empty"));
        }
        if req.min_bet_sats == 0 {
            return Err(GameError::validation("minimum bet must be positive"));
        }
        if req.min_bet_sats > req.max_bet_sats {
            return Err(GameError::validation(
                "minimum bet must not exceed maximum bet",
            ));
        }
        Ok(())
    }

    async fn house_haircut(&self, wallet_id: &str) -> GameResult<f64> {
        Ok(match self.repo.config_by_wallet(wallet_id).await? {
            Some(config) => config.haircut_pct,
            None => GameConfig::new(wallet_id).haircut_pct,
        })
    }
}
