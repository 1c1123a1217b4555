pub mod auth;
pub mod checkin;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod models;
pub mod seat_map;
pub mod store;

use std::sync::Arc;

use gateway::{Gateway, PgGateway};

// Shared state for the whole application
pub struct AppState {
    pub store: Arc<store::Store>,
    pub auth: auth::AuthService,
    pub checkin: checkin::CheckInDesk,
    pub config: config::Config,
}

impl AppState {
    /// Connects to PostgreSQL, runs migrations and loads the initial lists.
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let db = database::Database::connect(&config.database).await?;
        db.run_migrations().await?;

        let gateway = PgGateway::connect(db).await?;
        let state = Self::with_gateway(config, Arc::new(gateway)).await?;
        Ok(state)
    }

    /// Builds the state over any gateway, loads theaters and events, and
    /// starts reloading them on pushed changes.
    pub async fn with_gateway(
        config: config::Config,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Arc<Self>, error::RemoteOperationError> {
        let store = Arc::new(store::Store::new(gateway));
        store.load_all().await?;
        store.spawn_change_listener();

        let auth = auth::AuthService::new(store.clone(), &config.jwt);
        Ok(Arc::new(Self {
            store,
            auth,
            checkin: checkin::CheckInDesk::new(),
            config,
        }))
    }
}
