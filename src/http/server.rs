//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router that hands every path to the application shell
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Run the blocking shell off the async workers
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::App;
use crate::config::SiteConfig;
use crate::http::request::{Request as SiteRequest, RequestOptions};
use crate::http::response::SiteResponse;
use crate::lifecycle::Shutdown;

/// State injected into the handler.
#[derive(Clone)]
struct ServerState {
    app: Arc<App>,
    options: Arc<RequestOptions>,
    max_body: usize,
}

/// HTTP server for a site.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(app: Arc<App>, config: &SiteConfig) -> Self {
        let state = ServerState {
            options: Arc::new(app.request_options().clone()),
            app,
            max_body: config.listener.max_body_size,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &SiteConfig, state: ServerState) -> Router {
        Router::new()
            .route("/{*path}", any(site_handler))
            .route("/", any(site_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve on `listener` until `shutdown` is triggered, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let rx = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(Shutdown::wait(rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn site_handler(State(state): State<ServerState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.max_body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, path = %parts.uri.path(), "Failed to read request body");
            return axum::http::StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let site_request = SiteRequest::from_http(&parts, &bytes, &state.options);
    let app = state.app.clone();
    match tokio::task::spawn_blocking(move || app.handle(site_request)).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!(error = %e, path = %parts.uri.path(), "Request task failed");
            SiteResponse::server_error().into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Handler;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let config = SiteConfig::default();
        let mut app = App::new(&config).unwrap();
        app.router_mut()
            .post(
                "/echo",
                Handler::function(|cx| {
                    let name = cx.request().input("name").unwrap_or_default();
                    cx.echo(name.as_str().unwrap_or("nobody"));
                    Ok(())
                }),
            )
            .unwrap();
        HttpServer::new(Arc::new(app), &config)
    }

    #[tokio::test]
    async fn test_form_body_reaches_handler() {
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("name=ada"))
            .unwrap();

        let response = server().router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ada");
    }

    #[tokio::test]
    async fn test_unrouted_path_is_404() {
        let request = Request::builder().uri("/missing").body(Body::empty()).unwrap();
        let response = server().router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
