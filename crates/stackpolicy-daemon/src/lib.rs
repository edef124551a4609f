//! Stack lifecycle policy daemon.
//!
//! ```text
//!   webhook / CLI / timer
//!            │
//!        Scheduler ──► Reconciler ──► ManagementApi (pulumi-cloud)
//!                          │
//!                     PolicyStore (stackpolicy-core)
//! ```

pub mod error;
pub mod reconciler;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use reconciler::{
    ReconcileReport, Reconciler, ReconcilerOptions, Step, StepOutcome, StepReport,
};
pub use scheduler::{Scheduler, SweepSummary};
pub use state::{scheduler_from_config, AppState, DaemonScheduler};

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::get_health))
        // Stacks
        .route("/api/stacks", get(routes::stacks::list_stacks))
        .route(
            "/api/stacks/{org}/{project}/{stack}",
            get(routes::stacks::get_stack),
        )
        .route(
            "/api/stacks/{org}/{project}/{stack}/reconcile",
            post(routes::stacks::reconcile_stack),
        )
        // Webhooks
        .route(
            "/api/webhooks/pulumi",
            post(routes::webhooks::pulumi_webhook),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serve the webhook API and run the periodic scheduler until Ctrl-C.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener).await
}

/// Like `serve`, on a pre-bound listener (lets callers bind port 0).
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    serve_until(app_state, listener, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await
}

/// Serve until `shutdown` resolves. The scheduler is stopped and awaited
/// whether the server exits cleanly or with an error.
pub async fn serve_until<F>(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let actual_port = listener.local_addr()?.port();
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);

    let scheduler = app_state.scheduler.clone();
    let sweeper = tokio::spawn(async move {
        let mut stop_rx = stop_rx;
        scheduler
            .run(async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });

    tracing::info!("stackpolicy daemon listening on http://localhost:{actual_port}");
    let served = axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown)
        .await;

    let _ = stop_tx.send(true);
    sweeper.await?;
    served?;
    Ok(())
}
