use report_sync::{web, AppConfig, SyncPipeline};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config(root: &Path) -> AppConfig {
    AppConfig {
        providers: vec![],
        s3: None,
        gcs: None,
        base_url: "http://unused".to_string(),
        download_dir: root.join("downloads"),
        processed_dir: root.join("processed"),
        static_dir: root.join("static"),
        output_file: None,
        report_column: "Country_Region".to_string(),
        report_category: "Czechia".to_string(),
        template_path: None,
        port: 0,
        sync_interval_hours: 24,
    }
}

async fn spawn(pipeline: Arc<SyncPipeline>) -> SocketAddr {
    let app = web::router(pipeline);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn serves_the_published_report() {
    let root = TempDir::new().unwrap();
    let static_dir = root.path().join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), "<html>czechia report</html>").unwrap();

    let pipeline = Arc::new(SyncPipeline::new(config(root.path()), vec![]).unwrap());
    let addr = spawn(pipeline).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "<html>czechia report</html>");
}

#[tokio::test]
async fn empty_cache_slot_without_a_report_is_an_error_response() {
    let root = TempDir::new().unwrap();

    // no backends and no cached file: the lazy publish cycle produces
    // nothing, so the route reports the report as unavailable
    let pipeline = Arc::new(SyncPipeline::new(config(root.path()), vec![]).unwrap());
    let addr = spawn(pipeline).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert!(!response.status().is_success());
}
