//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch handler
//! - Wire up middleware (request ID, tracing, timeout, response filters)
//! - Serve static roots and proxy upstream routes
//! - Swap the route table when the config file changes
//! - Bind server to listener and shut down gracefully

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, Uri};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::filter::ChainError;
use crate::http::middleware::{response_filter_middleware, FilterState, MatchedRoute};
use crate::http::proxy::{self, HttpClient};
use crate::http::request::{MakeRequestUuidV4, X_REQUEST_ID};
use crate::lifecycle::WorkerContext;
use crate::observability::metrics;
use crate::routing::{Route, RouteTable, RouteTarget};

/// Errors constructing the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to install response filters: {0}")]
    Filters(#[from] ChainError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub client: HttpClient,
}

/// HTTP server hosting the response filter chain.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    routes: Arc<ArcSwap<RouteTable>>,
}

impl HttpServer {
    /// Create a new HTTP server. The filter chain is installed here, once.
    pub fn new(config: ServerConfig, worker: &WorkerContext) -> Result<Self, ServerError> {
        let chain = Arc::new(worker.install_filters(&config)?);
        let routes = Arc::new(ArcSwap::from_pointee(RouteTable::from_config(&config)));
        tracing::info!(routes = routes.load().len(), "Route table compiled");

        let state = AppState {
            routes: routes.clone(),
            client: proxy::build_client(Duration::from_secs(config.timeouts.connect_secs)),
        };
        let filter_state = FilterState {
            chain,
            routes: routes.clone(),
        };

        let router = Self::build_router(&config, state, filter_state);
        Ok(Self {
            router,
            config,
            routes,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState, filter_state: FilterState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(from_fn_with_state(filter_state, response_filter_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
    }

    /// Router with all layers, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Live route table handle.
    pub fn routes(&self) -> Arc<ArcSwap<RouteTable>> {
        self.routes.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` replace the route table;
    /// the filter chain and type overrides stay as installed.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let routes = self.routes.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                let table = RouteTable::from_config(&config);
                tracing::info!(routes = table.len(), "Route table reloaded");
                routes.store(Arc::new(table));
            }
        });

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Serve a request from its matched route.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();

    let route = match request.extensions().get::<MatchedRoute>() {
        Some(matched) => matched.0.clone(),
        None => state.routes.load().match_request(&request),
    };

    let Some(route) = route else {
        tracing::debug!(path = %request.uri().path(), "No route matched");
        metrics::record_request("none", StatusCode::NOT_FOUND.as_u16(), start);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let response = match &route.target {
        RouteTarget::Static(root) => serve_static(root, &route, request).await,
        RouteTarget::Upstream(upstream) => proxy::forward(&state.client, upstream, request).await,
    };

    metrics::record_request(&route.name, response.status().as_u16(), start);
    response
}

async fn serve_static(root: &Path, route: &Route, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    let path = route.strip_prefix(parts.uri.path());
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    parts.uri = match path_and_query.parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response(),
    };

    match ServeDir::new(root).oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
