//! HTTP decision server.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all decision handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Bind server to listener and stop on shutdown
//! - Hand every request to the gateway and render its decision

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::gateway::Gateway;
use crate::http::request::{into_gateway_request, RequestOptions};
use crate::http::response;
use crate::lifecycle::Shutdown;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub options: Arc<RequestOptions>,
}

/// HTTP server answering dispatch decisions.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server over `gateway`.
    pub fn new(gateway: Arc<Gateway>, config: &ListenerConfig) -> Self {
        let state = AppState {
            gateway,
            options: Arc::new(RequestOptions {
                region_header: config.region_header.clone(),
                max_body_bytes: config.max_body_bytes,
            }),
        };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// The assembled router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(decision_handler))
            .route("/", any(decision_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Turns the request into a `GatewayRequest`, dispatches it and renders the decision.
async fn decision_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let request = match into_gateway_request(request, addr, &state.options).await {
        Ok(request) => request,
        Err(rejection) => {
            tracing::debug!(client = %addr, reason = %rejection.message(), "Request rejected before dispatch");
            return response::error(rejection.status(), &rejection.message());
        }
    };

    let decision = state.gateway.dispatch(&request);
    tracing::debug!(
        request_id = request.request_id.as_deref().unwrap_or("-"),
        method = %request.method,
        path = %request.path,
        decision = decision.label(),
        "Decision rendered"
    );
    response::render(&decision)
}
