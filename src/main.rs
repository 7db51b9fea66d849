#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;

    use axum::Router;
    use crm_session::core::auth::{AuthApiState, JwtService, TokenIssuer, auth_api_router};
    use crm_session::core::config::Config;
    use crm_session::core::db::{
        BCRYPT_COST, InMemoryUserStore, PgUserStore, UserStore,
        create_pool_with_migrations,
    };
    use crm_session::core::protocol::Role;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    // Development admin used by debug builds when no seed is configured
    const DEV_ADMIN: (&str, &str) = ("admin@example.com", "password123");

    fn auth_router<S: UserStore>(store: Arc<S>, jwt: JwtService) -> Router {
        auth_api_router(AuthApiState {
            issuer: TokenIssuer::new(store, jwt),
        })
    }

    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    tracing::info!(
        "Config loaded: database={}, seed_admin={}",
        config.has_database(),
        config.seed_admin().is_some()
    );

    let jwt = JwtService::new(config.jwt_config()?);

    let router = if let Some(db) = config.db_config() {
        let pool = create_pool_with_migrations(&db).await?;
        let store = PgUserStore::new(pool);
        let accounts = store.count().await?;
        if let (0, Some((email, password))) = (accounts, config.seed_admin()) {
            store.create(email, "Administrator", password, Role::Admin).await?;
            tracing::info!("Seeded empty account table with {}", email);
        }
        tracing::info!("Using PostgreSQL account store ({} accounts)", accounts);
        auth_router(Arc::new(store), jwt)
    } else {
        let store = InMemoryUserStore::new();
        let seed = config
            .seed_admin()
            .or(cfg!(debug_assertions).then_some(DEV_ADMIN));
        match seed {
            Some((email, password)) => {
                store.create(email, "Administrator", password, Role::Admin, BCRYPT_COST)?;
                tracing::info!("In-memory account store seeded with {}", email);
            }
            None => tracing::warn!("In-memory account store is empty; nobody can log in"),
        }
        auth_router(Arc::new(store), jwt)
    };

    let app = router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Listening on http://{}", config.server_addr);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // no server binary without the ssr feature
}
