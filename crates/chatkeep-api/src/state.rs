//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by the CLI. Services
//! are generic over repository traits; AppState pins them to the SQLite
//! implementations.

use std::sync::Arc;

use chatkeep_core::service::ConversationService;
use chatkeep_infra::sqlite::migrate::{MigrationReport, MigrationRunner};
use chatkeep_infra::sqlite::message::SqliteMessageRepository;
use chatkeep_infra::sqlite::open_store;
use chatkeep_infra::sqlite::pool::ConnectionManager;
use chatkeep_infra::sqlite::user::SqliteUserRepository;
use chatkeep_types::config::AppConfig;

/// Concrete type alias for the service generics pinned to infra implementations.
pub type ConcreteConversationService =
    ConversationService<SqliteUserRepository, SqliteMessageRepository>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub conversation: Arc<ConcreteConversationService>,
    pub migrations: Arc<MigrationRunner>,
    /// What schema convergence did while this state was being built.
    pub startup_migrations: MigrationReport,
    pub db: ConnectionManager,
}

impl AppState {
    /// Initialize the application state: open and migrate the DB, wire services.
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let (db, startup_migrations) = open_store(&config.database).await?;

        let conversation = ConversationService::new(
            SqliteUserRepository::new(db.clone()),
            SqliteMessageRepository::new(db.clone()),
        );

        Ok(Self {
            conversation: Arc::new(conversation),
            migrations: Arc::new(MigrationRunner::embedded(db.clone())),
            startup_migrations,
            db,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatkeep_types::config::DatabaseConfig;

    #[tokio::test]
    async fn init_creates_and_migrates_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database: DatabaseConfig::at(dir.path().join("state.db")),
            ..AppConfig::default()
        };

        let state = AppState::init(&config).await.unwrap();
        assert_eq!(state.startup_migrations.current_version, 3);
        assert!(dir.path().join("state.db").exists());

        let user = state.conversation.start("Zoe").await.unwrap();
        let again = state.conversation.start("zoe").await.unwrap();
        assert_eq!(user.id, again.id);

        state.db.close().await;
        let reopened = AppState::init(&config).await.unwrap();
        assert!(reopened.startup_migrations.applied.is_empty());
    }
}
