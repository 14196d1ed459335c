//! HTTP API Service
//!
//! Axum server for the wagering backend: coinflip rounds, dice pay links,
//! payment callbacks, and WebSocket event subscriptions.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{ApiConfig, ApiServer};
