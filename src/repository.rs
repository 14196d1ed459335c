//! Persistence seam
//!
//! Durability interface for configs, sessions, and dice links: load by id,
//! save, list by wallet. The storage technology is a deployment concern;
//! the in-memory adapter here backs tests and single-node runs, and a real
//! database adapter implements the same trait.

use crate::dice::DiceLink;
use crate::errors::GameResult;
use crate::session::types::{GameConfig, GameSession};
use async_trait::async_trait;
use dashmap::DashMap;

/// Storage interface for wagering records.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_session(&self, id: &str) -> GameResult<Option<GameSession>>;
    async fn save_session(&self, session: &GameSession) -> GameResult<()>;
    async fn sessions_by_wallet(&self, wallet_id: &str) -> GameResult<Vec<GameSession>>;

    /// Load one config version by id.
    async fn load_config(&self, id: &str) -> GameResult<Option<GameConfig>>;
    /// Store a config version. Versions accumulate; saving never replaces
    /// an older record.
    async fn save_config(&self, config: &GameConfig) -> GameResult<()>;
    /// The newest config version for a wallet, if any.
    async fn config_by_wallet(&self, wallet_id: &str) -> GameResult<Option<GameConfig>>;

    async fn load_link(&self, id: &str) -> GameResult<Option<DiceLink>>;
    async fn save_link(&self, link: &DiceLink) -> GameResult<()>;
    async fn delete_link(&self, id: &str) -> GameResult<()>;
    async fn links_by_wallet(&self, wallet_id: &str) -> GameResult<Vec<DiceLink>>;
}

/// In-memory adapter. Complete enough for tests and dev runs; everything
/// lives in concurrent maps and vanishes on restart.
#[derive(Default)]
pub struct MemoryRepository {
    sessions: DashMap<String, GameSession>,
    configs: DashMap<String, GameConfig>,
    links: DashMap<String, DiceLink>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn load_session(&self, id: &str) -> GameResult<Option<GameSession>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn save_session(&self, session: &GameSession) -> GameResult<()> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn sessions_by_wallet(&self, wallet_id: &str) -> GameResult<Vec<GameSession>> {
        let mut out: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.wallet_id == wallet_id)
            .map(|entry| entry.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn load_config(&self, id: &str) -> GameResult<Option<GameConfig>> {
        Ok(self.configs.get(id).map(|c| c.clone()))
    }

    async fn save_config(&self, config: &GameConfig) -> GameResult<()> {
        self.configs.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn config_by_wallet(&self, wallet_id: &str) -> GameResult<Option<GameConfig>> {
        Ok(self
            .configs
            .iter()
            .filter(|entry| entry.wallet_id == wallet_id)
            .max_by_key(|entry| entry.updated_at)
            .map(|entry| entry.clone()))
    }

    async fn load_link(&self, id: &str) -> GameResult<Option<DiceLink>> {
        Ok(self.links.get(id).map(|l| l.clone()))
    }

    async fn save_link(&self, link: &DiceLink) -> GameResult<()> {
        self.links.insert(link.id.clone(), link.clone());
        Ok(())
    }

    async fn delete_link(&self, id: &str) -> GameResult<()> {
        self.links.remove(id);
        Ok(())
    }

    async fn links_by_wallet(&self, wallet_id: &str) -> GameResult<Vec<DiceLink>> {
        let mut out: Vec<_> = self
            .links
            .iter()
            .filter(|entry| entry.wallet_id == wallet_id)
            .map(|entry| entry.clone())
            .collect();
        out.sort_by(|a, b| a.open_time.cmp(&b.open_time));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::GameConfig;
    use chrono::Duration;

    #[tokio::test]
    async fn test_session_round_trip() {
        let repo = MemoryRepository::new();
        let mut config = GameConfig::new("wallet-1");
        config.enabled = true;
        let session = GameSession::new(&config, 1_000, 2).unwrap();

        repo.save_session(&session).await.unwrap();
        let loaded = repo.load_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.buy_in_sats, 1_000);

        assert!(repo.load_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sessions_listed_per_wallet() {
        let repo = MemoryRepository::new();
        for wallet in ["w1", "w1", "w2"] {
            let mut config = GameConfig::new(wallet);
            config.enabled = true;
            let session = GameSession::new(&config, 500, 2).unwrap();
            repo.save_session(&session).await.unwrap();
        }

        assert_eq!(repo.sessions_by_wallet("w1").await.unwrap().len(), 2);
        assert_eq!(repo.sessions_by_wallet("w2").await.unwrap().len(), 1);
        assert!(repo.sessions_by_wallet("w3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_config_supersede_returns_newest() {
        let repo = MemoryRepository::new();
        let older = GameConfig::new("wallet-1");
        let mut newer = GameConfig::new("wallet-1");
        newer.updated_at = older.updated_at + Duration::seconds(5);
        newer.haircut_pct = 7.5;

        repo.save_config(&older).await.unwrap();
        repo.save_config(&newer).await.unwrap();

        let active = repo.config_by_wallet("wallet-1").await.unwrap().unwrap();
        assert_eq!(active.id, newer.id);
        assert_eq!(active.haircut_pct, 7.5);

        // Superseded versions remain loadable by id.
        assert!(repo.load_config(&older.id).await.unwrap().is_some());
    }
}
