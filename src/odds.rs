//! Odds and payout math
//!
//! Pure functions shared by the settings preview path and the settlement
//! path. Both must call into here so the published chance can never drift
//! from the chance a roll is resolved against.

use crate::errors::{GameError, GameResult};

/// Flat skim applied as `FIXED_SKIM / multiplier` on top of the configured
/// haircut. Product constant taken from the published odds table.
pub const FIXED_SKIM: f64 = 10.0;

/// Rolls are drawn in basis points, `[0, BASIS_POINTS)`.
pub const BASIS_POINTS: u32 = 10_000;

/// Win probability (percent) for a single-player wager.
///
/// `chance = 100/multiplier - haircut - FIXED_SKIM/multiplier`. Rejects any
/// configuration whose chance falls outside `(0, 100]`, and any multiplier
/// at or below even money. These are configuration-time errors; settlement
/// never sees an invalid pair.
pub fn chance(multiplier: f64, haircut_pct: f64) -> GameResult<f64> {
    if !multiplier.is_finite() || multiplier <= 1.0 {
        return Err(GameError::validation(format!(
            "multiplier must be greater than 1, got {multiplier}"
        )));
    }
    if !haircut_pct.is_finite() || !(0.0..=100.0).contains(&haircut_pct) {
        return Err(GameError::validation(format!(
            "haircut must be between 0 and 100, got {haircut_pct}"
        )));
    }

    let value = 100.0 / multiplier - haircut_pct - FIXED_SKIM / multiplier;
    if value <= 0.0 || value > 100.0 {
        return Err(GameError::validation(format!(
            "multiplier {multiplier} with haircut {haircut_pct} yields out-of-range chance {value:.2}"
        )));
    }
    Ok(value)
}

/// Whether a basis-point roll wins against a chance percentage.
pub fn roll_wins(roll_bp: u32, chance_pct: f64) -> bool {
    (roll_bp as f64) / 100.0 < chance_pct
}

/// Payout for a winning single-player bet.
pub fn win_payout_sats(bet_sats: u64, multiplier: f64) -> u64 {
    (bet_sats as f64 * multiplier).floor() as u64
}

/// Winner-take-all pot payout: total buy-ins less the percentage haircut.
pub fn pot_payout_sats(buy_in_sats: u64, paid_players: usize, haircut_pct: f64) -> u64 {
    let pot = buy_in_sats.saturating_mul(paid_players as u64);
    (pot as f64 / 100.0 * (100.0 - haircut_pct)).floor() as u64
}

/// Refund for a straggler or abandoned participant: buy-in less the flat
/// registration fee, never the full stake.
pub fn refund_sats(buy_in_sats: u64, registration_fee_sats: u64) -> u64 {
    buy_in_sats.saturating_sub(registration_fee_sats)
}
