use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use axum::extract::FromRef;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::{config::AppConfig, web::session::SessionManager};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    sessions: SessionManager,
    config: Arc<AppConfig>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let options = config.database.connect_options()?;

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .max_lifetime(MAX_LIFETIME)
            .connect_with(options)
            .await
            .context("failed to connect to Postgres")?;

        info!(target = %config.database.safe_label(), "database connected");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        Ok(Self::from_parts(pool, config))
    }

    pub fn from_parts(pool: PgPool, config: AppConfig) -> Self {
        let sessions = SessionManager::new(&config.session_secret, config.https);
        Self {
            pool,
            sessions,
            config: Arc::new(config),
        }
    }

    /// Creates the configured administrator when the table is still empty.
    pub async fn ensure_seed_admin(&self) -> Result<()> {
        let Some(seed) = self.config.seed_admin.as_ref() else {
            return Ok(());
        };

        let has_admin: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM administrators)")
            .fetch_one(&self.pool)
            .await
            .context("failed to verify administrator presence")?;

        if has_admin {
            return Ok(());
        }

        let password_hash = crate::web::auth::hash_password(&seed.password)
            .map_err(|err| anyhow!("failed to hash seed admin password: {err}"))?;

        sqlx::query("INSERT INTO administrators (login, password_hash) VALUES ($1, $2)")
            .bind(&seed.login)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .context("failed to insert seed administrator")?;

        info!(login = %seed.login, "seeded administrator from ADMIN_LOGIN");
        Ok(())
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn upload_root(&self) -> &Path {
        &self.config.upload_dir
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
