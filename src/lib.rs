//! Satsdice - Lightning Wagering Backend
//!
//! Multiplayer coinflip sessions and shareable dice pay links, settled
//! over Lightning invoices with a verifiable VRF draw.

pub mod api;
pub mod config;
pub mod dice;
pub mod draw;
pub mod errors;
pub mod hub;
pub mod odds;
pub mod payments;
pub mod repository;
pub mod session;

pub use draw::{DrawEngine, DrawProof};
pub use errors::{GameError, GameResult};
pub use hub::{GameEvent, NotificationHub};
