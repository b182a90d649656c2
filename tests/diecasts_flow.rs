mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{DateTime, FixedOffset};
use common::{acquire_db_lock, body_to_vec, read_envelope, TestApp};
use diecast_tracker::models::{Condition, Status};
use diecast_tracker::routes::diecasts::DiecastResponse;
use diecast_tracker::schema::diecasts;
use diesel::prelude::*;
use serde_json::{json, Value};

async fn create(app: &TestApp, body: Value) -> Result<DiecastResponse> {
    let response = app.post_json("/api/diecasts", &body).await?;
    let envelope = read_envelope::<DiecastResponse>(response, StatusCode::CREATED).await?;
    assert!(envelope.success);
    Ok(envelope.data.expect("created diecast"))
}

fn timestamp(raw: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(raw).expect("RFC 3339 timestamp")
}

async fn count_rows(app: &TestApp) -> Result<i64> {
    app.with_conn(|conn| Ok(diecasts::table.count().get_result::<i64>(conn)?))
        .await
}

#[tokio::test]
async fn diecast_lifecycle() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let created = create(
        &app,
        json!({ "brand": "MINI GT", "model": "Nissan GT-R R34", "scale": "1:64" }),
    )
    .await?;
    assert_eq!(created.brand, "MINI GT");
    assert_eq!(created.model, "Nissan GT-R R34");
    assert_eq!(created.scale.as_deref(), Some("1:64"));
    assert_eq!(created.status, Status::Purchased);
    assert_eq!(created.condition, Condition::Sealed);
    assert_eq!(created.color, None);
    assert_eq!(created.image_url, None);
    assert_eq!(
        timestamp(&created.created_at),
        timestamp(&created.updated_at)
    );

    let path = format!("/api/diecasts/{}", created.id);
    let response = app.put_json(&path, &json!({ "status": "in-transit" })).await?;
    let updated = read_envelope::<DiecastResponse>(response, StatusCode::OK)
        .await?
        .data
        .expect("updated diecast");
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.status, Status::InTransit);
    assert_eq!(updated.model, "Nissan GT-R R34");
    assert_eq!(updated.scale.as_deref(), Some("1:64"));
    assert_eq!(updated.created_at, created.created_at);
    assert!(timestamp(&updated.updated_at) > timestamp(&created.updated_at));

    let response = app.get(&path).await?;
    let fetched = read_envelope::<DiecastResponse>(response, StatusCode::OK)
        .await?
        .data
        .expect("fetched diecast");
    assert_eq!(fetched.status, Status::InTransit);

    let response = app.delete(&path).await?;
    let deleted = read_envelope::<DiecastResponse>(response, StatusCode::OK)
        .await?
        .data
        .expect("deleted diecast");
    assert_eq!(deleted.id, created.id);

    let response = app.get(&path).await?;
    let missing = read_envelope::<Value>(response, StatusCode::NOT_FOUND).await?;
    assert!(!missing.success);
    assert_eq!(missing.error.as_deref(), Some("Diecast not found"));

    let response = app.delete(&path).await?;
    read_envelope::<Value>(response, StatusCode::NOT_FOUND).await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn partial_updates_touch_only_present_fields() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let created = create(
        &app,
        json!({
            "brand": "Tarmac Works",
            "model": "Porsche 911 GT3 R",
            "color": "White",
            "notes": "Le Mans livery",
            "condition": "unboxed"
        }),
    )
    .await?;
    assert_eq!(created.condition, Condition::Unboxed);
    let path = format!("/api/diecasts/{}", created.id);

    let response = app
        .put_json(&path, &json!({ "color": null, "notes": "" }))
        .await?;
    let updated = read_envelope::<DiecastResponse>(response, StatusCode::OK)
        .await?
        .data
        .expect("updated diecast");
    assert_eq!(updated.color, None);
    assert_eq!(updated.notes.as_deref(), Some(""));
    assert_eq!(updated.brand, "Tarmac Works");
    assert_eq!(updated.condition, Condition::Unboxed);

    let response = app.put_json(&path, &json!({})).await?;
    let touched = read_envelope::<DiecastResponse>(response, StatusCode::OK)
        .await?
        .data
        .expect("touched diecast");
    assert!(timestamp(&touched.updated_at) > timestamp(&updated.updated_at));
    assert_eq!(touched.notes.as_deref(), Some(""));

    let response = app.put_json(&path, &json!({ "brand": "" })).await?;
    read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;

    let response = app.put_json(&path, &json!({ "status": "sold" })).await?;
    let invalid = read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;
    assert!(invalid
        .error
        .unwrap_or_default()
        .contains("invalid status 'sold'"));

    let response = app
        .put_json("/api/diecasts/999999", &json!({ "notes": "ghost" }))
        .await?;
    read_envelope::<Value>(response, StatusCode::NOT_FOUND).await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejects_bad_input() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app.get("/api/diecasts/abc").await?;
    let invalid_id = read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;
    assert_eq!(invalid_id.error.as_deref(), Some("Invalid ID"));

    let response = app.delete("/api/diecasts/abc").await?;
    read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;

    let response = app
        .post_json("/api/diecasts", &json!({ "model": "Skyline" }))
        .await?;
    let missing_brand = read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;
    assert_eq!(
        missing_brand.error.as_deref(),
        Some("Brand and model are required")
    );

    let response = app
        .post_json("/api/diecasts", &json!({ "brand": "Tomica", "model": "" }))
        .await?;
    read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;

    let response = app
        .post_json(
            "/api/diecasts",
            &json!({ "brand": "Tomica", "model": "AE86", "status": "lost" }),
        )
        .await?;
    read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;

    let response = app
        .post_raw("/api/diecasts", "application/json", b"{\"brand\": ")
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());

    assert_eq!(count_rows(&app).await?, 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn list_filters_and_paginates() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let first = create(
        &app,
        json!({ "brand": "Hot Wheels", "model": "Datsun 510", "status": "pre-order" }),
    )
    .await?;
    let second = create(&app, json!({ "brand": "Tomica", "model": "Honda NSX" })).await?;
    let third = create(
        &app,
        json!({ "brand": "Hot Wheels", "model": "Mazda RX-7", "condition": "unboxed" }),
    )
    .await?;

    let response = app.get("/api/diecasts").await?;
    let all = read_envelope::<Vec<DiecastResponse>>(response, StatusCode::OK)
        .await?
        .data
        .unwrap_or_default();
    let ids: Vec<i32> = all.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![third.id, second.id, first.id]);

    let response = app.get("/api/diecasts?brand=Hot%20Wheels").await?;
    let hot_wheels = read_envelope::<Vec<DiecastResponse>>(response, StatusCode::OK)
        .await?
        .data
        .unwrap_or_default();
    let ids: Vec<i32> = hot_wheels.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![third.id, first.id]);

    let response = app.get("/api/diecasts?status=pre-order").await?;
    let pre_orders = read_envelope::<Vec<DiecastResponse>>(response, StatusCode::OK)
        .await?
        .data
        .unwrap_or_default();
    assert_eq!(pre_orders.len(), 1);
    assert_eq!(pre_orders[0].id, first.id);

    let response = app
        .get("/api/diecasts?brand=Hot%20Wheels&condition=unboxed")
        .await?;
    let combined = read_envelope::<Vec<DiecastResponse>>(response, StatusCode::OK)
        .await?
        .data
        .unwrap_or_default();
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].id, third.id);

    let response = app.get("/api/diecasts?limit=1&offset=1").await?;
    let page = read_envelope::<Vec<DiecastResponse>>(response, StatusCode::OK)
        .await?
        .data
        .unwrap_or_default();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, second.id);

    let response = app.get("/api/diecasts?limit=abc&offset=-4").await?;
    let fallback = read_envelope::<Vec<DiecastResponse>>(response, StatusCode::OK)
        .await?
        .data
        .unwrap_or_default();
    assert_eq!(fallback.len(), 3);

    let response = app.get("/api/diecasts?status=lost").await?;
    read_envelope::<Value>(response, StatusCode::BAD_REQUEST).await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn brand_and_model_are_stored_as_given() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let created = create(
        &app,
        json!({ "brand": "Hot Wheels ", "model": " Datsun 510" }),
    )
    .await?;
    assert_eq!(created.brand, "Hot Wheels ");
    assert_eq!(created.model, " Datsun 510");

    let response = app.get("/api/diecasts?brand=Hot%20Wheels%20").await?;
    let matched = read_envelope::<Vec<DiecastResponse>>(response, StatusCode::OK)
        .await?
        .data
        .unwrap_or_default();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, created.id);

    let response = app
        .put_json(
            &format!("/api/diecasts/{}", created.id),
            &json!({ "model": "Datsun 510 Wagon " }),
        )
        .await?;
    let updated = read_envelope::<DiecastResponse>(response, StatusCode::OK)
        .await?
        .data
        .expect("updated diecast");
    assert_eq!(updated.model, "Datsun 510 Wagon ");

    app.cleanup().await?;
    Ok(())
}
