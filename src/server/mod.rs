//! HTTP gateway.
//!
//! | Route                              | Handler                      |
//! |------------------------------------|------------------------------|
//! | `POST /api/process/{operation}`    | [`handlers::process`]        |
//! | `GET  /api/download/{filename}`    | [`handlers::download`]       |
//! | `GET  /api/health`                 | [`handlers::health`]         |
//! | `GET  /api/files/recent`           | [`handlers::recent`]         |
//!
//! Axum's default 2 MB body limit is disabled; the per-file limit is
//! enforced while each upload streams in (see [`upload`]).

pub mod handlers;
pub mod upload;

use crate::config::ServiceConfig;
use crate::dispatch::Dispatcher;
use crate::error::{DocsmithError, Result};
use crate::store::{spawn_sweeper, OutputStore, StagingArea};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use upload::UploadLimits;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub staging: StagingArea,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        let staging = StagingArea::new(&config.staging_dir);
        let dispatcher = Dispatcher::new(
            OutputStore::new(&config.output_dir),
            config.processing_timeout(),
        );
        Self {
            config: Arc::new(config),
            staging,
            dispatcher,
        }
    }

    pub fn output(&self) -> &OutputStore {
        self.dispatcher.output()
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_bytes: self.config.max_file_bytes,
            max_files: self.config.max_files,
        }
    }

    /// Create both store directories.
    pub async fn prepare(&self) -> Result<()> {
        self.staging.ensure().await?;
        self.output().ensure().await
    }
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/process/{operation}", post(handlers::process))
        .route("/api/download/{filename}", get(handlers::download))
        .route("/api/files/recent", get(handlers::recent))
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// A configured server: stores prepared, sweeper running, router built.
pub struct Application {
    state: AppState,
    shutdown: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl Application {
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let state = AppState::new(config);
        state.prepare().await?;

        let shutdown = CancellationToken::new();
        let sweeper = spawn_sweeper(
            vec![
                state.config.staging_dir.clone(),
                state.config.output_dir.clone(),
            ],
            state.config.retention,
            shutdown.clone(),
        );
        Ok(Self {
            state,
            shutdown,
            sweeper,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `signal` resolves, then stop the sweeper.
    pub async fn serve<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind = self.state.config.bind;
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| DocsmithError::Internal(format!("cannot bind {bind}: {e}")))?;
        info!(
            "docsmith listening on http://{} (staging: {}, output: {})",
            bind,
            self.state.config.staging_dir.display(),
            self.state.config.output_dir.display()
        );

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| DocsmithError::Internal(format!("server error: {e}")))?;

        info!("Shutting down background tasks");
        self.shutdown.cancel();
        if let Some(handle) = self.sweeper {
            let _ = handle.await;
        }
        Ok(())
    }
}
