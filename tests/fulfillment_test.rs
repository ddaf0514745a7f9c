//! Admin fulfillment tracking and order administration.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

async fn two_item_order(app: &TestApp) -> String {
    app.set_cart("alice", &[("p1", 1), ("p2", 2)]);
    app.place_cart_order("alice").await
}

#[tokio::test]
async fn marking_stages_advances_order_status_by_stage_precedence() {
    let app = TestApp::new();
    let order_id = two_item_order(&app).await;
    let admin = app.admin_token();

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{order_id}/item/p1"),
            Some(json!({"stage": "shipped"})),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "shipped");

    // p2 is still at placed; the most advanced stage on any item wins
    let (_, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{order_id}/item/p2"),
            Some(json!({"stage": "dispatched"})),
            Some(&admin),
        )
        .await;
    assert_eq!(body["data"]["status"], "shipped");

    let (_, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{order_id}/item/p2"),
            Some(json!({"stage": "delivered"})),
            Some(&admin),
        )
        .await;
    assert_eq!(body["data"]["status"], "delivered");

    let items = body["data"]["items"].as_array().unwrap();
    let p2_progress = items[1]["progress"].as_object().unwrap();
    assert!(p2_progress.contains_key("placed"));
    assert!(p2_progress.contains_key("dispatched"));
    assert!(p2_progress.contains_key("delivered"));
}

#[tokio::test]
async fn progress_entries_are_never_removed() {
    let app = TestApp::new();
    let order_id = two_item_order(&app).await;
    let admin = app.admin_token();
    let uri = format!("/api/v1/admin/orders/{order_id}/item/p1");

    for stage in ["dispatched", "delivered", "dispatched"] {
        let (status, _) = app
            .request(Method::PUT, &uri, Some(json!({ "stage": stage })), Some(&admin))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/admin/orders/{order_id}"),
            None,
            Some(&admin),
        )
        .await;
    let progress = body["data"]["items"][0]["progress"].as_object().unwrap();
    let stages: Vec<&str> = progress.keys().map(String::as_str).collect();
    assert!(stages.contains(&"placed"));
    assert!(stages.contains(&"dispatched"));
    assert!(stages.contains(&"delivered"));
    // Re-stamping an earlier stage does not pull the status back
    assert_eq!(body["data"]["status"], "delivered");
}

#[tokio::test]
async fn stage_updates_are_validated() {
    let app = TestApp::new();
    let order_id = two_item_order(&app).await;
    let admin = app.admin_token();

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{order_id}/item/p1"),
            Some(json!({"stage": "teleported"})),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{order_id}/item/p1"),
            Some(json!({})),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{order_id}/item/p9"),
            Some(json!({"stage": "in_transit"})),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/item/p1", uuid::Uuid::new_v4()),
            Some(json!({"stage": "in_transit"})),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Nothing changed on the real order
    let (_, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/admin/orders/{order_id}"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(body["data"]["status"], "placed");
    assert_eq!(
        body["data"]["items"][0]["progress"]
            .as_object()
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let app = TestApp::new();
    let order_id = two_item_order(&app).await;
    let customer = app.customer_token("alice");

    let (status, _) = app
        .request(Method::GET, "/api/v1/admin/orders", None, Some(&customer))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{order_id}/item/p1"),
            Some(json!({"stage": "delivered"})),
            Some(&customer),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, "/api/v1/admin/orders", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_can_override_status_without_touching_progress() {
    let app = TestApp::new();
    let order_id = two_item_order(&app).await;
    let admin = app.admin_token();
    let uri = format!("/api/v1/admin/orders/{order_id}");

    let (status, body) = app
        .request(Method::PUT, &uri, Some(json!({"status": "cancelled"})), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(
        body["data"]["items"][0]["progress"]
            .as_object()
            .unwrap()
            .len(),
        1
    );

    let (status, _) = app
        .request(Method::PUT, &uri, Some(json!({"status": "lost"})), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::PUT, &uri, Some(json!({})), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The customer sees the override too
    let customer = app.customer_token("alice");
    let (_, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            None,
            Some(&customer),
        )
        .await;
    assert_eq!(body["data"]["status"], "cancelled");
}

#[tokio::test]
async fn admin_listing_pages_and_filters_by_status() {
    let app = TestApp::new();
    let first = two_item_order(&app).await;
    app.set_cart("bob", &[("p3", 1)]);
    let second = app.place_cart_order("bob").await;
    app.set_cart("carol", &[("p1", 4)]);
    app.place_cart_order("carol").await;
    let admin = app.admin_token();

    app.request(
        Method::PUT,
        &format!("/api/v1/admin/orders/{second}/item/p3"),
        Some(json!({"stage": "shipped"})),
        Some(&admin),
    )
    .await;

    let (status, body) = app
        .request(Method::GET, "/api/v1/admin/orders?page=1&limit=2", None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    let page = &body["data"];
    assert_eq!(page["total"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let (_, body) = app
        .request(Method::GET, "/api/v1/admin/orders?status=shipped", None, Some(&admin))
        .await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], second.as_str());

    let (_, body) = app
        .request(Method::GET, "/api/v1/admin/orders?status=placed", None, Some(&admin))
        .await;
    let ids: Vec<&str> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.as_str()));
}

#[tokio::test]
async fn admin_reads_any_customers_order() {
    let app = TestApp::new();
    let order_id = two_item_order(&app).await;
    let admin = app.admin_token();

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/admin/orders/{order_id}"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["owner"], "alice");

    let (status, _) = app
        .request(Method::GET, "/api/v1/admin/orders/nope", None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
