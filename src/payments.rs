//! Payment provider seam
//!
//! Narrow interface to the external Lightning backend: create an invoice,
//! pay a destination. Confirmations come back as an event stream with
//! at-least-once delivery; the listener task routes each one into the
//! session store or the dice service, both of which treat replays as
//! idempotent no-ops.

use crate::dice::DiceService;
use crate::errors::{GameError, GameResult};
use crate::session::store::SessionStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Invoice handed to a joining or betting player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub payment_hash: String,
    /// BOLT11 payment request the player settles.
    pub payment_request: String,
    pub amount_sats: u64,
}

/// A settled-invoice notification from the provider. Delivery is
/// at-least-once; the same hash may arrive more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub payment_hash: String,
    pub amount_sats: u64,
}

/// External Lightning backend.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create an invoice for the given amount. A failure here propagates
    /// to the caller and leaves no game state behind.
    async fn create_invoice(&self, amount_sats: u64, memo: &str) -> GameResult<Invoice>;

    /// Pay out to a destination (LN address or BOLT11 request).
    async fn pay(&self, destination: &str, amount_sats: u64, memo: &str) -> GameResult<()>;
}

/// An outgoing payment recorded by the mock provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPayment {
    pub destination: String,
    pub amount_sats: u64,
    pub memo: String,
}

/// In-process provider for tests and dev runs. Invoices get a real-looking
/// preimage/hash pair; confirmations are produced on demand with
/// [`MockPaymentProvider::confirm`].
pub struct MockPaymentProvider {
    invoices: DashMap<String, u64>,
    outgoing: RwLock<Vec<OutgoingPayment>>,
    failing: AtomicBool,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            invoices: DashMap::new(),
            outgoing: RwLock::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent provider call fail, for error-path tests.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Build the confirmation for a previously created invoice.
    pub fn confirm(&self, payment_hash: &str) -> Option<PaymentConfirmation> {
        self.invoices.get(payment_hash).map(|amount| PaymentConfirmation {
            payment_hash: payment_hash.to_string(),
            amount_sats: *amount,
        })
    }

    /// Payments sent through [`PaymentProvider::pay`], in order.
    pub async fn sent(&self) -> Vec<OutgoingPayment> {
        self.outgoing.read().await.clone()
    }
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_invoice(&self, amount_sats: u64, memo: &str) -> GameResult<Invoice> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GameError::PaymentProvider(
                "mock provider set to fail".to_string(),
            ));
        }
        if amount_sats == 0 {
            return Err(GameError::PaymentProvider("zero-amount invoice".to_string()));
        }

        let preimage: [u8; 32] = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(preimage);
        let payment_hash = hex::encode(hasher.finalize());

        self.invoices.insert(payment_hash.clone(), amount_sats);
        debug!(%payment_hash, amount_sats, memo, "mock invoice created");

        Ok(Invoice {
            payment_request: format!("lnmock1{}", &payment_hash[..20]),
            payment_hash,
            amount_sats,
        })
    }

    async fn pay(&self, destination: &str, amount_sats: u64, memo: &str) -> GameResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GameError::PaymentProvider(
                "mock provider set to fail".to_string(),
            ));
        }
        self.outgoing.write().await.push(OutgoingPayment {
            destination: destination.to_string(),
            amount_sats,
            memo: memo.to_string(),
        });
        Ok(())
    }
}

/// Consume provider confirmations until the channel closes, routing each
/// to whichever flow owns the payment hash.
pub fn spawn_payment_listener(
    sessions: Arc<SessionStore>,
    dice: Arc<DiceService>,
    mut confirmations: mpsc::Receiver<PaymentConfirmation>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("payment listener started");
        while let Some(confirmation) = confirmations.recv().await {
            route_confirmation(&sessions, &dice, confirmation).await;
        }
        info!("payment listener stopped");
    })
}

/// Try the multiplayer store first, then the dice flow. Duplicates are
/// acknowledged quietly; hashes neither flow knows belong to unrelated
/// wallet traffic and are ignored.
pub async fn route_confirmation(
    sessions: &SessionStore,
    dice: &DiceService,
    confirmation: PaymentConfirmation,
) {
    let hash = confirmation.payment_hash.clone();

    match sessions
        .on_payment_confirmed(&hash, confirmation.amount_sats)
        .await
    {
        Ok(()) => return,
        Err(GameError::NotFound { .. }) => {}
        Err(e) if e.is_duplicate_callback() => {
            debug!(payment_hash = %hash, "duplicate session confirmation ignored");
            return;
        }
        Err(e) => {
            warn!(payment_hash = %hash, error = %e, "session confirmation failed");
            return;
        }
    }

    match dice.on_payment_confirmed(&hash, confirmation.amount_sats).await {
        Ok(()) => {}
        Err(GameError::NotFound { .. }) => {
            debug!(payment_hash = %hash, "confirmation for unknown hash ignored");
        }
        Err(e) if e.is_duplicate_callback() => {
            debug!(payment_hash = %hash, "duplicate dice confirmation ignored");
        }
        Err(e) => {
            warn!(payment_hash = %hash, error = %e, "dice confirmation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_invoices_have_unique_hashes() {
        let provider = MockPaymentProvider::new();
        let a = provider.create_invoice(100, "a").await.unwrap();
        let b = provider.create_invoice(100, "b").await.unwrap();

        assert_ne!(a.payment_hash, b.payment_hash);
        assert!(a.payment_request.starts_with("lnmock1"));
        assert_eq!(a.amount_sats, 100);
    }

    #[tokio::test]
    async fn test_confirm_echoes_invoice_amount() {
        let provider = MockPaymentProvider::new();
        let invoice = provider.create_invoice(2_500, "bet").await.unwrap();

        let confirmation = provider.confirm(&invoice.payment_hash).unwrap();
        assert_eq!(confirmation.amount_sats, 2_500);
        assert!(provider.confirm("unknown-hash").is_none());
    }

    #[tokio::test]
    async fn test_failing_toggle() {
        let provider = MockPaymentProvider::new();
        provider.set_failing(true);

        let err = provider.create_invoice(100, "x").await.unwrap_err();
        assert!(matches!(err, GameError::PaymentProvider(_)));
        assert!(provider.pay("dest@ln.tld", 10, "y").await.is_err());

        provider.set_failing(false);
        assert!(provider.create_invoice(100, "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_pay_records_outgoing() {
        let provider = MockPaymentProvider::new();
        provider.pay("winner@ln.tld", 1_940, "pot").await.unwrap();

        let sent = provider.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "winner@ln.tld");
        assert_eq!(sent[0].amount_sats, 1_940);
    }
}
