pub mod types;
pub mod resolver;
pub mod store;

pub use types::*;
pub use resolver::{PayoutInstruction, Settlement, SettlementResolver};
pub use store::{SessionStore, SettingsUpdate};
