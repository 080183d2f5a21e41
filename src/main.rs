use axum::Router;
use beacon::clock::SystemClock;
use beacon::config::{Config, MarketDataKind};
use beacon::sources::{
    LlmRationaleService, MarketDataSource, MockMarketSource, RationaleService,
    YahooFinanceSource,
};
use beacon::{api, AppState};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Invalid configuration is fatal
    let config = Config::from_env()?;
    info!("Starting Beacon server on {}:{}", config.host, config.port);
    info!(
        "Refresh every {}ms (max backoff {}ms, stale after {}ms), SMA({}) RSI({}), symbols: {}",
        config.scheduler.refresh_interval_ms,
        config.scheduler.max_backoff_ms,
        config.scheduler.stale_threshold_ms,
        config.indicators.sma_window,
        config.indicators.rsi_window,
        config.symbols.join(", ")
    );

    let source: Arc<dyn MarketDataSource> = match config.market_data.kind {
        MarketDataKind::Yahoo => Arc::new(YahooFinanceSource::new(
            config.market_data.yahoo_range.clone(),
            config.market_data.yahoo_interval.clone(),
        )?),
        MarketDataKind::Mock => Arc::new(MockMarketSource::new()),
    };
    info!("Market data source: {}", source.name());

    let rationale: Option<Arc<dyn RationaleService>> =
        match LlmRationaleService::from_config(&config.rationale)? {
            Some(service) => {
                info!("Rationale enrichment enabled ({})", service.name());
                Some(Arc::new(service))
            }
            None => {
                warn!("No LLM_API_KEY set, rationale enrichment disabled");
                None
            }
        };

    let addr = format!("{}:{}", config.host, config.port);
    let symbols = config.symbols.clone();
    let state = AppState::new(config, source, rationale, Arc::new(SystemClock));

    // Start a refresh loop per configured symbol
    for symbol in &symbols {
        if let Err(e) = state.scheduler.register(symbol) {
            warn!("Skipping configured symbol {:?}: {}", symbol, e);
        }
    }

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let scheduler = Arc::clone(&state.scheduler);
    let app = Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Beacon server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
