//! Hubgate server binary.
//!
//! Wires the authentication service, OAuth2 provider, encryption
//! service, and security middleware pipeline over a single shared
//! store, and serves the HTTP surface. Downstream collaborators mount
//! their routes behind [`hubgate_auth::middleware::require_auth`].
//!
//! Single-node profile: the in-memory store backs all cross-process
//! state. A multi-node deployment swaps in a shared `KeyValueStore`
//! implementation and configured (non-generated) token secrets.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing_subscriber::EnvFilter;

use hubgate_auth::config::{AuthConfig, OAuth2Config};
use hubgate_auth::http::{AuthState, OAuthState, auth_router, oauth_router};
use hubgate_auth::service::JwtAuthService;
use hubgate_auth::storage::InMemoryUserRepository;
use hubgate_auth::oauth::provider::OAuth2Provider;
use hubgate_auth::types::user::{Role, User, hash_password};
use hubgate_crypto::{CryptoConfig, DataEncryptionService};
use hubgate_middleware::{SecurityConfig, SecurityPipeline};
use hubgate_store::{KeyValueStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    // User storage is an external collaborator; the in-memory repository
    // stands in for it here, seeded from the environment.
    let users = Arc::new(InMemoryUserRepository::new());
    seed_admin_user(&users)?;

    let auth = Arc::new(JwtAuthService::new(
        AuthConfig::default(),
        users,
        store.clone(),
    )?);
    let oauth = Arc::new(OAuth2Provider::new(OAuth2Config::default(), store.clone())?);

    let encryption = Arc::new(
        DataEncryptionService::new(CryptoConfig {
            key_store_path: std::env::var("HUBGATE_KEY_STORE")
                .unwrap_or_else(|_| "security/keys".to_string())
                .into(),
            ..CryptoConfig::default()
        })
        .await?,
    );
    let rotation_task = encryption.spawn_rotation_task();

    let pipeline = SecurityPipeline::new(SecurityConfig::default(), store)?;
    let metrics = pipeline.metrics();

    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/metrics/security",
            get({
                let metrics = metrics.clone();
                move || {
                    let metrics = metrics.clone();
                    async move { axum::Json(metrics.snapshot()) }
                }
            }),
        )
        .merge(auth_router(AuthState { auth: auth.clone() }))
        .merge(oauth_router(OAuthState {
            provider: oauth.clone(),
        }));
    let app = pipeline.apply(router);

    let addr: SocketAddr = std::env::var("HUBGATE_BIND")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;
    tracing::info!(%addr, "hubgate server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    rotation_task.abort();
    Ok(())
}

/// Seeds the demo admin user when `HUBGATE_ADMIN_PASSWORD` is set.
fn seed_admin_user(
    users: &InMemoryUserRepository,
) -> Result<(), Box<dyn std::error::Error>> {
    let Ok(password) = std::env::var("HUBGATE_ADMIN_PASSWORD") else {
        tracing::warn!("HUBGATE_ADMIN_PASSWORD not set, no users seeded");
        return Ok(());
    };

    let email =
        std::env::var("HUBGATE_ADMIN_EMAIL").unwrap_or_else(|_| "admin@hubgate.dev".to_string());
    users.insert(User {
        id: "admin".to_string(),
        email: email.clone(),
        password_hash: hash_password(&password)?,
        role: Role::Admin,
        mfa_enabled: false,
        mfa_secret: None,
    });

    tracing::info!(%email, "admin user seeded");
    Ok(())
}
