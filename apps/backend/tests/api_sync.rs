//! Sync API tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running.

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;

use common::fixtures;
use common::TestContext;

/// Test pull returns null before any push.
#[tokio::test]
#[ignore = "requires database"]
async fn test_pull_before_first_push() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (device_id, token) = ctx.create_test_device(None).await;

    let response = server
        .post("/api/sync/pull")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.is_null());

    // Cleanup
    ctx.cleanup_device(device_id).await;
}

/// Test push then pull round-trips the snapshot.
#[tokio::test]
#[ignore = "requires database"]
async fn test_push_then_pull() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (device_id, token) = ctx.create_test_device(None).await;

    let snapshot = fixtures::sample_snapshot("course-a", 3);
    let response = server
        .post("/api/sync/push")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .json(&fixtures::push_request(&snapshot, &[], 1_000))
        .await;
    response.assert_status_ok();

    let response = server
        .post("/api/sync/pull")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert_eq!(body["updated_at"].as_i64().unwrap(), 1_000);
    assert!(body["snapshot"]["courses"].get("course-a").is_some());
    assert_eq!(body["snapshot"]["records"].as_object().unwrap().len(), 3);

    // Cleanup
    ctx.cleanup_device(device_id).await;
}

/// Test that a push omitting records does not delete the stored copies.
#[tokio::test]
#[ignore = "requires database"]
async fn test_push_union_keeps_omitted_records() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (device_id, token) = ctx.create_test_device(None).await;

    let full = fixtures::sample_snapshot("course-a", 3);
    server
        .post("/api/sync/push")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .json(&fixtures::push_request(&full, &[], 1_000))
        .await
        .assert_status_ok();

    // Client evicted two lesson payloads; the second push carries one.
    let mut thinned = full.clone();
    thinned.records.retain(|key, _| key.ends_with("lesson-2"));
    server
        .post("/api/sync/push")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .json(&fixtures::push_request(&thinned, &[], 2_000))
        .await
        .assert_status_ok();

    let response = server
        .get("/api/sync/records")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["keys"].as_array().unwrap().len(), 3);

    // Cleanup
    ctx.cleanup_device(device_id).await;
}

/// Test that explicitly removed keys are pruned by a push.
#[tokio::test]
#[ignore = "requires database"]
async fn test_push_removed_keys_are_pruned() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (device_id, token) = ctx.create_test_device(None).await;

    let full = fixtures::sample_snapshot("course-a", 2);
    server
        .post("/api/sync/push")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .json(&fixtures::push_request(&full, &[], 1_000))
        .await
        .assert_status_ok();

    let mut pruned = full.clone();
    pruned.records.remove("course-a/lesson-1");
    server
        .post("/api/sync/push")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .json(&fixtures::push_request(&pruned, &["course-a/lesson-1"], 2_000))
        .await
        .assert_status_ok();

    let response = server
        .get("/api/sync/records")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .await;
    let body: serde_json::Value = response.json();
    let keys: Vec<&str> = body["keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["course-a/lesson-2"]);

    // Cleanup
    ctx.cleanup_device(device_id).await;
}

/// Test fetching a single record by its slash-containing key.
#[tokio::test]
#[ignore = "requires database"]
async fn test_fetch_single_record() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (device_id, token) = ctx.create_test_device(None).await;

    let snapshot = fixtures::sample_snapshot("course-a", 2);
    server
        .post("/api/sync/push")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .json(&fixtures::push_request(&snapshot, &[], 1_000))
        .await
        .assert_status_ok();

    let response = server
        .get("/api/sync/records/course-a/lesson-2")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["body"].as_str().unwrap(), "Generated body for lesson 2");

    let missing = server
        .get("/api/sync/records/course-a/lesson-9")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&token),
        )
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);

    // Cleanup
    ctx.cleanup_device(device_id).await;
}

/// Test sync endpoints require authentication.
#[tokio::test]
#[ignore = "requires database"]
async fn test_sync_requires_auth() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();

    let response = server.post("/api/sync/pull").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server.get("/api/sync/records").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}
