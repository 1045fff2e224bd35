//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum router for the operator and executor endpoints
//! - Inject shared state (config, registry, lifecycle manager, authorizer)
//! - Serve with graceful shutdown, draining active sessions

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::Authorizer;
use crate::config::AgentConfig;
use crate::containerizer::Containerizer;
use crate::containers::NestedContainerManager;
use crate::state::Registry;

use super::dispatch::handle_api;
use super::executor::handle_executor;

/// Tag each request with an `x-request-id` so log lines and the response
/// can be correlated. A caller-supplied id is kept.
async fn request_id(mut request: Request<Body>, next: Next) -> axum::response::Response {
    let id = match request.headers().get("x-request-id") {
        Some(id) => id.clone(),
        None => {
            let generated = Uuid::new_v4().to_string();
            match HeaderValue::from_str(&generated) {
                Ok(value) => {
                    request.headers_mut().insert("x-request-id", value.clone());
                    value
                }
                Err(_) => return next.run(request).await,
            }
        }
    };

    let mut response = next.run(request).await;
    response.headers_mut().insert("x-request-id", id);
    response
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgentConfig>,
    pub registry: Registry,
    pub manager: Arc<NestedContainerManager>,
    pub authorizer: Option<Arc<dyn Authorizer>>,
}

/// HTTP server for the agent API.
pub struct HttpServer {
    router: Router,
    manager: Arc<NestedContainerManager>,
}

impl HttpServer {
    pub fn new(
        config: AgentConfig,
        registry: Registry,
        containerizer: Arc<dyn Containerizer>,
        authorizer: Option<Arc<dyn Authorizer>>,
    ) -> Self {
        let manager = Arc::new(NestedContainerManager::new(
            registry.clone(),
            containerizer,
            authorizer.clone(),
        ));

        let state = AppState {
            config: Arc::new(config),
            registry,
            manager: manager.clone(),
            authorizer,
        };

        let router = Router::new()
            .route("/api/v1", post(handle_api))
            .route("/api/v1/executor", post(handle_executor))
            .with_state(state)
            .layer(axum::middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http());

        Self { router, manager }
    }

    /// Run the server until the shutdown signal fires, then drain active
    /// attach/session streams before returning.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Agent API listening");

        let sessions = self.manager.sessions().clone();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        // In-flight streaming bodies are owned by their relay tasks; wait
        // for them to settle so containers get their destroy triggers.
        sessions.wait_idle().await;
        tracing::info!("Agent API stopped");
        Ok(())
    }
}
