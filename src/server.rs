use crate::cache::CacheClass;
use crate::config::Config;
use crate::handlers::{
    endpoint_stats, flush_cache, get_item, health_check, list_items, sla_report,
};
use crate::middleware::{logging_middleware, resilience_middleware, ResilienceState};
use crate::policy::ResiliencePolicy;
use axum::routing::{delete, get};
use axum::{middleware, Router};
use std::net::SocketAddr;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Build the application router: instrumented demo routes plus the
/// monitoring surface, sharing one set of resilience components.
pub fn create_app(state: ResilienceState, config: &Config) -> Router {
    let list_policy = ResiliencePolicy::cached(CacheClass::List)
        .deduplicated("items-list")
        .rate_limited(config.rate_limit_max_requests, config.rate_limit_window());

    let read_policy = ResiliencePolicy::cached(CacheClass::Read)
        .rate_limited(config.rate_limit_max_requests, config.rate_limit_window());

    let list_routes = Router::new()
        .route("/api/items", get(list_items))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), list_policy),
            resilience_middleware,
        ));

    let read_routes = Router::new()
        .route("/api/items/:id", get(get_item))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), read_policy),
            resilience_middleware,
        ));

    let monitoring = Router::new()
        .route("/sla", get(sla_report))
        .route("/sla/endpoint", get(endpoint_stats))
        .route("/health", get(health_check))
        .route("/cache", delete(flush_cache))
        .with_state(state);

    Router::new()
        .merge(list_routes)
        .merge(read_routes)
        .merge(monitoring)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    state: ResilienceState,
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let state = ResilienceState::new(&config);
        let app = create_app(state.clone(), &config);

        Self { app, state, config }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("resilience gateway starting on {}", self.config.bind_addr);
        tracing::info!("SLA report available at /sla");
        tracing::info!("health check available at /health");

        // Window resets stay lazy; this only bounds the counter table
        // for keys that stopped sending traffic.
        let state = self.state.clone();
        let cleanup_interval = self.config.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match state.limiter.prune(cleanup_interval) {
                    Ok(0) => {}
                    Ok(pruned) => {
                        debug!(target: "resilience::rate_limit", pruned, "pruned idle windows")
                    }
                    Err(err) => {
                        warn!(target: "resilience::rate_limit", error = %err, "window prune failed")
                    }
                }
            }
        });

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
