use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use sigil_auth::password::hash_password;
use sigil_auth::{
    InMemoryRevocationStore, InMemoryUserStore, JwtAuth, JwtAuthenticator, RevocationStore,
    SharedContext, SystemClock, TokenContext, TokenService, UserStore, token_routes,
};
use sigil_auth_postgres::{PostgresAuthStorage, PostgresUserStore};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, SeedUser, StorageBackend, StorageConfig};

// =============================================================================
// Storage
// =============================================================================

/// The configured revocation and user stores.
#[derive(Clone)]
pub enum Storage {
    Memory {
        revocation: Arc<InMemoryRevocationStore>,
        users: Arc<InMemoryUserStore>,
    },
    Postgres(PostgresAuthStorage),
}

impl Storage {
    pub fn memory() -> Self {
        Self::Memory {
            revocation: Arc::new(InMemoryRevocationStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
        }
    }

    /// Opens the configured backend, running migrations for PostgreSQL.
    pub async fn open(cfg: &StorageConfig) -> anyhow::Result<Self> {
        match cfg.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; revocations are lost on restart");
                Ok(Self::memory())
            }
            StorageBackend::Postgres => {
                let url = cfg.url.as_deref().context("storage.url is not set")?;
                let storage = PostgresAuthStorage::connect(url)
                    .await
                    .context("failed to connect to PostgreSQL")?;
                storage.migrate().await?;
                Ok(Self::Postgres(storage))
            }
        }
    }

    pub fn revocation_store(&self) -> Arc<dyn RevocationStore> {
        match self {
            Self::Memory { revocation, .. } => revocation.clone(),
            Self::Postgres(pg) => Arc::new(pg.revocation_store()),
        }
    }

    pub fn user_store(&self) -> Arc<dyn UserStore> {
        match self {
            Self::Memory { users, .. } => users.clone(),
            Self::Postgres(pg) => Arc::new(pg.user_store()),
        }
    }

    /// Creates the seed accounts that do not exist yet. Returns how many
    /// were created.
    pub async fn seed_users(&self, seeds: &[SeedUser]) -> anyhow::Result<usize> {
        let mut created = 0;
        for seed in seeds {
            let was_created = match self {
                Self::Memory { users, .. } => {
                    if users.find_by_username(&seed.username).await?.is_some() {
                        false
                    } else {
                        let user = users.create_user(&seed.username, &seed.password)?;
                        if !seed.is_active {
                            users.insert(user.deactivated());
                        }
                        true
                    }
                }
                Self::Postgres(pg) => {
                    let hash = hash_password(&seed.password)?;
                    let store: PostgresUserStore = pg.user_store();
                    store
                        .create_if_missing(&seed.username, Some(&hash), seed.is_active)
                        .await?
                        .is_some()
                }
            };
            if was_created {
                tracing::info!(username = %seed.username, "Seed user created");
                created += 1;
            }
        }
        Ok(created)
    }
}

// =============================================================================
// Application
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub authenticator: JwtAuthenticator,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl FromRef<AppState> for JwtAuthenticator {
    fn from_ref(state: &AppState) -> Self {
        state.authenticator.clone()
    }
}

impl AppState {
    pub fn new(cfg: &AppConfig, storage: &Storage) -> anyhow::Result<Self> {
        let ctx = TokenContext::new(cfg.auth.clone(), Arc::new(SystemClock))?
            .with_revocation_store(storage.revocation_store());
        let tokens = TokenService::new(SharedContext::new(ctx), storage.user_store());
        let authenticator = JwtAuthenticator::from_service(&tokens);
        Ok(Self {
            tokens,
            authenticator,
        })
    }
}

/// `GET /api/me`
async fn me_handler(JwtAuth(auth): JwtAuth) -> Json<Value> {
    Json(json!({
        "id": auth.user.id,
        "username": auth.user.username,
        "token_class": auth.token.token_class(),
    }))
}

pub fn build_app(state: AppState) -> Router {
    token_routes()
        .route("/api/me", get(me_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

pub struct SigilServer {
    addr: SocketAddr,
    app: Router,
}

impl SigilServer {
    /// Opens storage, seeds users and builds the router.
    pub async fn build(cfg: &AppConfig) -> anyhow::Result<Self> {
        let storage = Storage::open(&cfg.storage).await?;
        storage.seed_users(&cfg.users).await?;
        let state = AppState::new(cfg, &storage)?;
        Ok(Self {
            addr: cfg.addr(),
            app: build_app(state),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
