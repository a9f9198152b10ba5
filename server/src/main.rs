use axum::http::{header, HeaderName, HeaderValue, Method};
use server::api;
use server::config::Config;
use server::retrieval::RetrievalClient;
use server::signed_url::UrlSigner;
use server::store::ChatStore;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(port = config.port, "docent server starting");

    // Database
    let pool = server::db::connect(&config.database_url).await?;
    let store = ChatStore::new(pool);
    store
        .migrate()
        .await
        .map_err(|e| anyhow::anyhow!("store migration failed: {e}"))?;

    let retrieval = RetrievalClient::new(config.retrieval_base_url.clone());
    let signer = UrlSigner::new(
        config.url_signing_key.clone().into_bytes(),
        config.preview_url_ttl,
    );

    let state = api::ApiState {
        store,
        retrieval,
        signer,
    };

    // Configure CORS to allow the web UI origins
    let allowed_origins = config
        .cors_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("invalid CORS origin: {e}"))?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-organization-id"),
        ])
        .max_age(std::time::Duration::from_secs(3600));

    let app = api::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("listening on http://0.0.0.0:{}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
