//! Report Integration Tests
//!
//! Store -> refresh -> snapshot cache -> HTTP route.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chanstat_bot::refresh::build_report;
use chanstat_bot::{report_server, Edge, EventKind, EventStore, ReportSource, SnapshotCache};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tower::ServiceExt;

fn seeded_store(dir: &TempDir) -> std::path::PathBuf {
    let db_path = dir.path().join("bdd.sqlite");
    let mut store = EventStore::open(&db_path).expect("Failed to open store");
    let now = Utc::now();

    store
        .with_session(|s| {
            s.add_event_at("alice", EventKind::Msg, now)?;
            s.add_event_at("alice", EventKind::Msg, now)?;
            s.add_event_at("bob", EventKind::Msg, now)?;
            s.add_event_at("carol", EventKind::Join, now)?;
            s.add_event_at("dave", EventKind::Msg, now - Duration::days(30))?;
            s.add_edge(&Edge::new("bob", "alice"))?;
            s.add_edge(&Edge::new("alice", "bob"))?;
            Ok(())
        })
        .unwrap();

    db_path
}

#[tokio::test]
async fn test_published_snapshot_is_served() {
    let temp = TempDir::new().unwrap();
    let db_path = seeded_store(&temp);

    let cache = SnapshotCache::new();
    cache.publish(build_report(&db_path, "/pirc_bot").unwrap());
    let app = report_server::router(ReportSource::Cached(cache), "/pirc_bot");

    let response = app
        .oneshot(Request::builder().uri("/pirc_bot").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let report: serde_json::Value = serde_json::from_slice(&body).unwrap();

    let top = report["top_posters_day"].as_array().unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["pseudo"], "alice");
    assert_eq!(top[0]["count"], 2);
    assert_eq!(top[1]["pseudo"], "bob");

    assert_eq!(report["hourly_day"].as_array().unwrap().len(), 24);
    assert_eq!(report["weekday_averages"].as_array().unwrap().len(), 7);
    assert_eq!(report["path_prefix"], "/pirc_bot");

    // Both directions collapse into one weighted pair
    let graph = report["graph"].as_str().unwrap();
    assert_eq!(graph.matches(" -- ").count(), 1);
    assert!(graph.contains("\"alice\" -- \"bob\" [weight=2"));
}

#[tokio::test]
async fn test_realtime_route_reflects_latest_rows() {
    let temp = TempDir::new().unwrap();
    let db_path = seeded_store(&temp);
    let source = ReportSource::Realtime {
        db_path: db_path.clone(),
        path_prefix: "/stats".to_string(),
    };
    let app = report_server::router(source, "/stats");

    let mut store = EventStore::open(&db_path).unwrap();
    store.insert_event("erin", EventKind::Msg).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let pseudos: Vec<&str> = report["top_posters_day"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["pseudo"].as_str())
        .collect();
    assert!(pseudos.contains(&"erin"));
}
