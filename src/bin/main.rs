use anyhow::{Context, Result};
use axum::{Json, Router, middleware::from_fn_with_state, routing::get};
use clap::{Parser, Subcommand};
use multiauth::config::ConfigStores;
use multiauth::middleware::{AuthState, require_auth};
use multiauth::store::hash_password;
use multiauth::{
    ApiKeyStore, AuthConfig, AuthenticatedUser, Authenticator, InMemoryUserStore, PasswordUserStore,
    SimpleUser,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "multiauth-demo")]
#[command(about = "Demo server for multi-strategy request authentication")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve `/health` (public) and `/me` (authenticated)
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
        /// Auth config file (falls back to $MULTIAUTH_CONFIG, then ./multiauth.json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON file with demo users
        #[arg(long, env = "MULTIAUTH_USERS")]
        users: PathBuf,
    },
    /// Print the argon2 PHC hash of a password
    HashPassword { password: String },
    /// Validate a config file and print the strategy order
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Entry in the users file.
#[derive(Debug, Deserialize)]
struct DemoUser {
    id: String,
    #[serde(default)]
    attributes: serde_json::Map<String, Value>,
    #[serde(default)]
    api_keys: Vec<String>,
    username: Option<String>,
    /// PHC string; takes precedence over `password`
    password_hash: Option<String>,
    /// Plain password, hashed at load
    password: Option<String>,
}

fn load_config(path: Option<&Path>) -> Result<AuthConfig> {
    match path {
        Some(p) => AuthConfig::from_path(p),
        None => AuthConfig::load(),
    }
}

fn load_stores(path: &Path) -> Result<ConfigStores> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let entries: Vec<DemoUser> = serde_json::from_str(&raw)?;

    let mut users = InMemoryUserStore::default();
    let mut api_keys = ApiKeyStore::default();
    let mut passwords = PasswordUserStore::new();

    for entry in entries {
        let user = SimpleUser::new(entry.id).with_attributes(entry.attributes).shared();
        for key in &entry.api_keys {
            api_keys = api_keys.with_key(key, user.clone());
        }
        if let Some(username) = entry.username {
            let phc = match (entry.password_hash, entry.password) {
                (Some(phc), _) => phc,
                (None, Some(plain)) => hash_password(&plain).map_err(|e| anyhow::anyhow!("hashing password: {}", e))?,
                (None, None) => anyhow::bail!("user {} has a username but no password", user.id()),
            };
            passwords = passwords.with_user(username, phc, user.clone());
        }
        users = users.with_user(user);
    }

    info!(
        "Loaded {} users, {} API keys, {} password logins",
        users.len(),
        api_keys.len(),
        passwords.len()
    );

    Ok(ConfigStores {
        api_keys: Arc::new(api_keys),
        passwords: Arc::new(passwords),
        users: Arc::new(users),
    })
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn me(user: AuthenticatedUser) -> Json<Value> {
    Json(serde_json::json!({
        "id": user.id(),
        "attributes": user.attributes(),
    }))
}

fn log_subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt().with_env_filter(filter).finish()
}

#[tokio::main]
async fn main() -> Result<()> {
    log_subscriber(EnvFilter::from_default_env().add_directive("multiauth=info".parse()?)).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config, users } => {
            let cfg = load_config(config.as_deref())?;
            let stores = load_stores(&users)?;
            let registry = cfg.build_registry(&stores).await?;

            let mut auth = AuthState::new(Authenticator::new(registry), cfg.strategy_order());
            if let Some(ms) = cfg.timeout_ms {
                auth = auth.timeout(Duration::from_millis(ms));
            }
            info!("Strategy order: {:?}", auth.strategies());

            let protected = Router::new()
                .route("/me", get(me))
                .layer(from_fn_with_state(auth, require_auth));

            let app = Router::new()
                .route("/health", get(health_check))
                .merge(protected)
                .layer(
                    ServiceBuilder::new()
                        .layer(TraceLayer::new_for_http())
                        .layer(CorsLayer::permissive()),
                );

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Listening on http://{}", bind);
            axum::serve(listener, app).await?;
        }
        Commands::HashPassword { password } => {
            let phc = hash_password(&password).map_err(|e| anyhow::anyhow!("hashing password: {}", e))?;
            println!("{}", phc);
        }
        Commands::CheckConfig { config } => {
            let cfg = load_config(config.as_deref())?;
            let order = cfg.strategy_order();
            if order.is_empty() {
                anyhow::bail!("No strategies configured");
            }
            println!("Strategy order: {}", order.join(", "));
        }
    }

    Ok(())
}
