use crate::core::pipeline::SyncPipeline;
use crate::utils::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

pub fn router(pipeline: Arc<SyncPipeline>) -> Router {
    Router::new().route("/", get(index)).with_state(pipeline)
}

/// Serves the most recently published report. An empty cache slot triggers
/// one publish cycle before answering.
async fn index(
    State(pipeline): State<Arc<SyncPipeline>>,
) -> std::result::Result<Html<String>, (StatusCode, String)> {
    let slot = pipeline.cache_slot();
    if !slot.is_file() {
        tracing::info!("cache slot empty, running a publish cycle");
        if let Err(err) = pipeline.publish().await {
            tracing::error!(error = %err, "publish failed");
            return Err((StatusCode::BAD_GATEWAY, format!("report unavailable: {err}")));
        }
    }
    match tokio::fs::read_to_string(&slot).await {
        Ok(body) => Ok(Html(body)),
        Err(err) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to read report: {err}"),
        )),
    }
}

/// Binds the presentation route and refreshes the cache slot on a fixed
/// interval in the background.
pub async fn serve(pipeline: Arc<SyncPipeline>, port: u16, refresh: Duration) -> Result<()> {
    let refresher = Arc::clone(&pipeline);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh);
        // the immediate first tick is skipped; the lazy route covers startup
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = refresher.publish().await {
                tracing::error!(error = %err, "scheduled publish failed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "serving report");
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}
