//! Proxy entry point handlers

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use rondo_core::RondoError;
use rondo_network::Dispatcher;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Create the proxy router; every path is routed the same way
pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = Arc::new(AppState { dispatcher });

    Router::new()
        .fallback(proxy_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the proxy on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Serving requests on {}", addr);
    }

    let app = create_router(dispatcher);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Forward a request to the next live upstream
async fn proxy_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match state.dispatcher.dispatch(request).await {
        Ok(response) => response,
        Err(RondoError::ServiceUnavailable) => {
            (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
        }
        Err(e) => {
            error!(error = %e, "Upstream request failed");
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}
