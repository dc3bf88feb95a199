use actix_web::{http::StatusCode, web, web::ServiceConfig};
use bpg_common::Secret;
use bundle_payment_engine::{
    db_types::{FulfillmentStatus, PaymentStatus, TrackingStatus},
    events::EventProducers,
    OrderFlowApi,
};
use serde_json::json;

use super::{
    helpers::{get_request, post_request},
    mocks::{sample_order, sample_profit, sample_tracking, sample_webhook_event, MockPipelineDb},
};
use crate::{
    helpers::calculate_hmac,
    middleware::HmacMiddlewareFactory,
    routes::{webhook_challenge, FulfillmentWebhookRoute},
    server::WEBHOOK_SIGNATURE_HEADER,
};

const TEST_SECRET: &str = "test-webhook-secret";

fn delivered_body() -> serde_json::Value {
    json!({
        "event": "order.delivered",
        "order": { "id": "BP-1001", "status": "delivered", "message": "Delivered", "size_mb": 2048, "network": "MTN" }
    })
}

fn sign(body: &serde_json::Value) -> String {
    let payload = serde_json::to_string(body).unwrap();
    calculate_hmac(TEST_SECRET, payload.as_bytes())
}

#[actix_web::test]
async fn challenge_is_echoed_back() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/webhook/fulfillment?challenge=nonce-123", configure_challenge).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "nonce-123");
}

#[actix_web::test]
async fn unsigned_webhooks_are_rejected() {
    let _ = env_logger::try_init().ok();
    let err = post_request("/webhook/fulfillment", delivered_body(), &[], configure_delivery)
        .await
        .expect_err("Expected the middleware to reject the request");
    assert_eq!(err, "Webhook signature invalid or not provided");
}

#[actix_web::test]
async fn forged_signatures_are_rejected() {
    let _ = env_logger::try_init().ok();
    let headers = [(WEBHOOK_SIGNATURE_HEADER, "deadbeef")];
    let err = post_request("/webhook/fulfillment", delivered_body(), &headers, configure_delivery)
        .await
        .expect_err("Expected the middleware to reject the request");
    assert_eq!(err, "Webhook signature invalid or not provided");
}

#[actix_web::test]
async fn signed_delivery_webhook_is_processed() {
    let _ = env_logger::try_init().ok();
    let body = delivered_body();
    let signature = sign(&body);
    let headers = [(WEBHOOK_SIGNATURE_HEADER, signature.as_str())];
    let (status, body) = post_request("/webhook/fulfillment", body, &headers, configure_delivery).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "unexpected body: {body}");
    // The ack carries the id of the audit-log row the payload was recorded under
    assert!(body.contains(r#""traceId":1"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn lenient_mode_lets_unsigned_webhooks_through() {
    let _ = env_logger::try_init().ok();
    let body = json!({
        "event": "order.processing",
        "order": { "id": "BP-1001" }
    });
    let (status, body) = post_request("/webhook/fulfillment", body, &[], configure_lenient_processing).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "unexpected body: {body}");
}

fn install(cfg: &mut ServiceConfig, db: MockPipelineDb, enforce: bool) {
    let api = OrderFlowApi::new(db, EventProducers::default());
    cfg.service(
        web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(WEBHOOK_SIGNATURE_HEADER, Secret::new(TEST_SECRET.to_string()), enforce))
            .service(FulfillmentWebhookRoute::<MockPipelineDb>::new()),
    )
    .app_data(web::Data::new(api));
}

fn configure_challenge(cfg: &mut ServiceConfig) {
    cfg.service(webhook_challenge);
}

fn configure_delivery(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_insert_webhook_event().returning(|event_type, _, _| Ok(sample_webhook_event(event_type)));
    db.expect_mark_delivered().returning(|order_id, _| {
        Ok(Some(sample_order(order_id.as_str(), PaymentStatus::Completed, FulfillmentStatus::Delivered)))
    });
    db.expect_credit_profit().returning(|order| Ok(Some(sample_profit(order.order_id.as_str()))));
    install(cfg, db, true);
}

fn configure_lenient_processing(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_insert_webhook_event().returning(|event_type, _, _| Ok(sample_webhook_event(event_type)));
    db.expect_update_tracking_status()
        .returning(|order_id, status| Ok(Some(sample_tracking(order_id.as_str(), status, 1))));
    install(cfg, db, false);
}
