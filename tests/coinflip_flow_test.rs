//! End-to-end flows routed through the payment listener channel, wired
//! the same way the server binary wires them: real stores, real hub,
//! mock Lightning provider, confirmations queued over mpsc.

use satsdice::dice::{DiceService, LinkRequest};
use satsdice::draw::DrawEngine;
use satsdice::hub::{GameEvent, NotificationHub};
use satsdice::payments::{
    spawn_payment_listener, MockPaymentProvider, PaymentConfirmation, PaymentProvider,
};
use satsdice::repository::{MemoryRepository, Repository};
use satsdice::session::{
    OutcomeKind, SessionStatus, SessionStore, SettingsUpdate, SettlementResolver,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

struct TestRig {
    sessions: Arc<SessionStore>,
    dice: Arc<DiceService>,
    hub: Arc<NotificationHub>,
    provider: Arc<MockPaymentProvider>,
    confirmations: mpsc::Sender<PaymentConfirmation>,
}

async fn wire() -> TestRig {
    let draw = Arc::new(DrawEngine::new_random());
    let provider = Arc::new(MockPaymentProvider::new());
    let provider_dyn: Arc<dyn PaymentProvider> = provider.clone();
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let hub = Arc::new(NotificationHub::new());

    let sessions = Arc::new(SessionStore::new(
        SettlementResolver::new(draw.clone()),
        hub.clone(),
        provider_dyn.clone(),
        repo.clone(),
    ));
    let dice = Arc::new(DiceService::new(draw, hub.clone(), provider_dyn, repo));

    let (tx, rx) = mpsc::channel(64);
    spawn_payment_listener(sessions.clone(), dice.clone(), rx);

    TestRig {
        sessions,
        dice,
        hub,
        provider,
        confirmations: tx,
    }
}

impl TestRig {
    /// Enable a wallet with a 3% haircut and a 10 sat registration fee.
    async fn enable_wallet(&self, wallet_id: &str) {
        self.sessions
            .update_settings(
                wallet_id,
                SettingsUpdate {
                    enabled: Some(true),
                    haircut_pct: Some(3.0),
                    ..Default::default()
                },
            )
            .await
            .expect("settings update");
    }

    /// Push the confirmation for an invoice through the listener channel,
    /// the same path the provider callback takes.
    async fn confirm(&self, payment_hash: &str) {
        let confirmation = self
            .provider
            .confirm(payment_hash)
            .expect("invoice should exist");
        self.confirmations
            .send(confirmation)
            .await
            .expect("listener should be alive");
    }
}

/// Poll until the session reaches `status` or the deadline passes.
async fn wait_for_status(rig: &TestRig, session_id: &str, status: SessionStatus) {
    for _ in 0..200 {
        let snapshot = rig.sessions.snapshot(session_id).await.expect("snapshot");
        if snapshot.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached {status}");
}

/// Poll until the mock provider has sent `count` outgoing payments.
async fn wait_for_payouts(rig: &TestRig, count: usize) {
    for _ in 0..200 {
        if rig.provider.sent().await.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} outgoing payments");
}

fn drain(rx: &mut broadcast::Receiver<GameEvent>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn full_round_through_the_listener() {
    let rig = wire().await;
    rig.enable_wallet("wallet-1").await;

    println!("=== PHASE 1: open a 2-player round ===");
    let session = rig
        .sessions
        .create_session("wallet-1", 1_000, 2)
        .await
        .expect("create session");
    let mut events = rig.hub.subscribe(&session.id);

    println!("=== PHASE 2: five players race for two seats ===");
    let joins = futures::future::join_all((0..5).map(|i| {
        let sessions = rig.sessions.clone();
        let session_id = session.id.clone();
        async move {
            sessions
                .join(&session_id, &format!("player-{i}@ln.tld"))
                .await
        }
    }))
    .await;

    let invoices: Vec<_> = joins.into_iter().filter_map(|j| j.ok()).collect();
    assert_eq!(invoices.len(), 2, "exactly the target count is admitted");

    println!("=== PHASE 3: both buy-ins confirm over the channel ===");
    for invoice in &invoices {
        rig.confirm(&invoice.payment_hash).await;
    }
    wait_for_status(&rig, &session.id, SessionStatus::Settled).await;
    wait_for_payouts(&rig, 1).await;

    let snapshot = rig.sessions.snapshot(&session.id).await.expect("snapshot");
    let outcome = snapshot.outcome.as_ref().expect("outcome recorded");
    assert_eq!(outcome.kind, OutcomeKind::Won);
    // Pot 2_000, 3% haircut => 60 sats to the house, 1_940 to the winner.
    assert_eq!(outcome.winner_payout_sats, 1_940);
    assert_eq!(outcome.house_fee_sats, 60);
    let winner = outcome.winner.as_ref().expect("winner id");
    assert!(snapshot.participants.iter().any(|p| &p.id == winner));

    let sent = rig.provider.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount_sats, 1_940);

    let published = drain(&mut events);
    let paid = published
        .iter()
        .filter(|e| matches!(e, GameEvent::Paid { .. }))
        .count();
    let won = published
        .iter()
        .filter(|e| matches!(e, GameEvent::Won { .. }))
        .count();
    let lost = published
        .iter()
        .filter(|e| matches!(e, GameEvent::Lost { .. }))
        .count();
    assert_eq!((paid, won, lost), (2, 1, 1));

    println!("=== PHASE 4: a replayed confirmation changes nothing ===");
    rig.confirm(&invoices[0].payment_hash).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(rig.provider.sent().await.len(), 1);
    assert!(drain(&mut events).is_empty());
    println!("✅ full round settled exactly once");
}

#[tokio::test]
async fn abandonment_and_straggler_refunds_through_the_listener() {
    let rig = wire().await;
    rig.enable_wallet("wallet-1").await;

    let session = rig
        .sessions
        .create_session("wallet-1", 1_000, 2)
        .await
        .expect("create session");
    let first = rig
        .sessions
        .join(&session.id, "alice@ln.tld")
        .await
        .expect("join alice");
    let second = rig
        .sessions
        .join(&session.id, "bob@ln.tld")
        .await
        .expect("join bob");

    println!("=== PHASE 1: one buy-in confirms, the other stalls ===");
    rig.confirm(&first.payment_hash).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    println!("=== PHASE 2: operator abandons the round ===");
    let outcome = rig
        .sessions
        .refund_session(&session.id, "abandoned")
        .await
        .expect("refund");
    assert_eq!(outcome.kind, OutcomeKind::Refunded);
    wait_for_payouts(&rig, 1).await;

    // Only the paid entrant gets money back: buy-in less the 10 sat
    // registration fee.
    let sent = rig.provider.sent().await;
    assert_eq!(sent[0].destination, "alice@ln.tld");
    assert_eq!(sent[0].amount_sats, 990);

    println!("=== PHASE 3: the stalled payment lands after the fact ===");
    rig.confirm(&second.payment_hash).await;
    wait_for_payouts(&rig, 2).await;

    let sent = rig.provider.sent().await;
    assert_eq!(sent[1].destination, "bob@ln.tld");
    assert_eq!(sent[1].amount_sats, 990);

    // The recorded outcome is untouched by the late payment.
    let snapshot = rig.sessions.snapshot(&session.id).await.expect("snapshot");
    assert_eq!(snapshot.status, SessionStatus::Refunded);
    assert_eq!(
        snapshot.outcome.as_ref().map(|o| o.kind),
        Some(OutcomeKind::Refunded)
    );
    println!("✅ both entrants made whole, terminal state untouched");
}

#[tokio::test]
async fn dice_bets_resolve_through_the_listener() {
    let rig = wire().await;
    // Zero haircut keeps the 1.5x chance at a clean 60%.
    rig.sessions
        .update_settings(
            "wallet-2",
            SettingsUpdate {
                enabled: Some(true),
                haircut_pct: Some(0.0),
                ..Default::default()
            },
        )
        .await
        .expect("settings update");

    let link = rig
        .dice
        .create_link(
            "wallet-2",
            LinkRequest {
                title: "roll it".to_string(),
                base_url: "https://dice.example.com".to_string(),
                min_bet_sats: 100,
                max_bet_sats: 10_000,
                multiplier: 1.5,
            },
        )
        .await
        .expect("create link");
    assert!((link.chance_pct - 60.0).abs() < 1e-9);

    println!("=== PHASE 1: bet until a winning roll lands ===");
    let mut ticket_and_payout = None;
    for _ in 0..64 {
        let invoice = rig
            .dice
            .place_bet(&link.id, 1_000)
            .await
            .expect("place bet");
        let mut events = rig.hub.subscribe(&invoice.payment_hash);
        rig.confirm(&invoice.payment_hash).await;

        // First frame is the payment ack, second is the roll outcome.
        let paid = events.recv().await.expect("paid event");
        assert!(matches!(paid, GameEvent::Paid { amount_sats: 1_000 }));
        match events.recv().await.expect("outcome event") {
            GameEvent::Won {
                participant_id,
                payout_sats,
            } => {
                ticket_and_payout = Some((participant_id, payout_sats));
                break;
            }
            GameEvent::Lost { participant_id } => {
                assert_eq!(participant_id, invoice.payment_hash);
                let bet = rig.dice.bet(&invoice.payment_hash).expect("bet");
                assert_eq!(bet.won, Some(false));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    let (ticket_id, payout_sats) = ticket_and_payout.expect("a 60% roll should win within 64 bets");
    assert_eq!(payout_sats, 1_500);

    println!("=== PHASE 2: winner cashes the ticket out ===");
    let paid_sats = rig
        .dice
        .claim(&ticket_id, "winner@ln.tld")
        .await
        .expect("claim");
    assert_eq!(paid_sats, 1_500);

    let sent = rig.provider.sent().await;
    let payout = sent.last().expect("payout sent");
    assert_eq!(payout.destination, "winner@ln.tld");
    assert_eq!(payout.amount_sats, 1_500);

    // A second cash-out attempt is refused.
    let err = rig.dice.claim(&ticket_id, "winner@ln.tld").await;
    assert!(err.is_err());
    println!("✅ dice bet resolved and paid exactly once");
}

#[tokio::test]
async fn unknown_hashes_are_ignored_by_the_listener() {
    let rig = wire().await;

    // Unrelated wallet traffic routes through the same callback; it must
    // not disturb either flow or kill the listener.
    rig.confirmations
        .send(PaymentConfirmation {
            payment_hash: "deadbeef".to_string(),
            amount_sats: 42,
        })
        .await
        .expect("listener alive");
    tokio::time::sleep(Duration::from_millis(20)).await;

    rig.enable_wallet("wallet-1").await;
    let session = rig
        .sessions
        .create_session("wallet-1", 1_000, 2)
        .await
        .expect("create session");
    let invoice = rig
        .sessions
        .join(&session.id, "carol@ln.tld")
        .await
        .expect("join");
    rig.confirm(&invoice.payment_hash).await;

    for _ in 0..200 {
        let snapshot = rig.sessions.snapshot(&session.id).await.expect("snapshot");
        if snapshot.paid_count() == 1 {
            println!("✅ listener survived the stray confirmation");
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("confirmation after a stray hash was never processed");
}
