use actix_web::{http::StatusCode, web, web::ServiceConfig};
use bundle_payment_engine::{
    db_types::{FulfillmentStatus, PaymentStatus},
    events::EventProducers,
    FulfillmentDispatcher,
    OrderFlowApi,
};
use serde_json::json;

use super::{
    helpers::{get_request, post_request},
    mocks::{sample_order, MockPipelineDb, NullProvider},
};
use crate::routes::{CheckoutRoute, ClaimOrdersRoute, OrderRoute, PayOrderRoute};

fn checkout_body() -> serde_json::Value {
    json!({
        "orderId": "BP-1001",
        "shopId": 7,
        "msisdn": "+233 24 123 4567",
        "network": "Mtn",
        "volumeMb": 2048,
        "costPrice": 2500,
        "margin": 500
    })
}

#[actix_web::test]
async fn checkout_creates_an_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/orders", checkout_body(), &[], configure_new_checkout).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.contains(r#""order_id":"BP-1001""#), "unexpected body: {body}");
}

#[actix_web::test]
async fn resubmitted_checkout_returns_the_existing_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/orders", checkout_body(), &[], configure_existing_checkout).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""order_id":"BP-1001""#), "unexpected body: {body}");
}

#[actix_web::test]
async fn checkout_rejects_an_invalid_msisdn() {
    let _ = env_logger::try_init().ok();
    let mut body = checkout_body();
    body["msisdn"] = json!("12345");
    let (status, body) = post_request("/orders", body, &[], configure_lookup).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("not a valid mobile number"), "unexpected body: {body}");
}

#[actix_web::test]
async fn order_lookup_finds_existing_orders() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/orders/BP-1001", configure_lookup).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""payment_status":"Pending""#), "unexpected body: {body}");

    let (status, _) = get_request("/orders/NOPE", configure_lookup).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn wallet_payment_conflicts_when_already_settled() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/orders/BP-1001/pay", json!({ "userId": 42 }), &[], configure_settled_order).await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains(r#""alreadyProcessed":true"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn export_claim_reports_a_conflict_when_every_order_is_lost() {
    let _ = env_logger::try_init().ok();
    let body = json!({ "orderIds": ["BP-1001", "BP-1002"] });
    let (status, body) = post_request("/orders/claim", body, &[], configure_lost_claim).await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains(r#""alreadyDownloaded":true"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn redownload_claims_orders_already_exported() {
    let _ = env_logger::try_init().ok();
    let body = json!({ "orderIds": ["BP-1001"], "isRedownload": true });
    let (status, body) = post_request("/orders/claim", body, &[], configure_redownload_claim).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""order_id":"BP-1001""#), "unexpected body: {body}");
}

#[actix_web::test]
async fn export_claim_returns_the_orders_won() {
    let _ = env_logger::try_init().ok();
    let body = json!({ "orderIds": ["BP-1001", "BP-1002"] });
    let (status, body) = post_request("/orders/claim", body, &[], configure_won_claim).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""requested":2"#), "unexpected body: {body}");
    assert!(body.contains(r#""order_id":"BP-1001""#), "unexpected body: {body}");
    assert!(!body.contains("BP-1002"), "lost order should be omitted: {body}");
}

fn install(cfg: &mut ServiceConfig, db: MockPipelineDb) {
    let api = OrderFlowApi::new(db, EventProducers::default());
    // The pay route carries a dispatcher; these tests never reach the provider, so an expectation-free backend is
    // enough.
    let dispatcher = FulfillmentDispatcher::new(MockPipelineDb::new(), NullProvider, EventProducers::default());
    cfg.service(CheckoutRoute::<MockPipelineDb>::new())
        .service(OrderRoute::<MockPipelineDb>::new())
        .service(PayOrderRoute::<MockPipelineDb, NullProvider>::new())
        .service(ClaimOrdersRoute::<MockPipelineDb>::new())
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(dispatcher));
}

fn configure_new_checkout(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_is_blacklisted().returning(|_| Ok(false));
    db.expect_insert_order().returning(|order| {
        // The handler must have normalised the number before the order reaches the backend
        assert_eq!(order.msisdn, "0241234567");
        Ok((sample_order(order.order_id.as_str(), PaymentStatus::Pending, FulfillmentStatus::Unfulfilled), true))
    });
    install(cfg, db);
}

fn configure_existing_checkout(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_is_blacklisted().returning(|_| Ok(false));
    db.expect_insert_order().returning(|order| {
        Ok((sample_order(order.order_id.as_str(), PaymentStatus::Pending, FulfillmentStatus::Unfulfilled), false))
    });
    install(cfg, db);
}

fn configure_lookup(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_fetch_order_by_order_id().returning(|order_id| {
        Ok((order_id.as_str() == "BP-1001")
            .then(|| sample_order("BP-1001", PaymentStatus::Pending, FulfillmentStatus::Unfulfilled)))
    });
    install(cfg, db);
}

fn configure_settled_order(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_fetch_order_by_order_id().returning(|order_id| {
        Ok(Some(sample_order(order_id.as_str(), PaymentStatus::Completed, FulfillmentStatus::Unfulfilled)))
    });
    install(cfg, db);
}

fn configure_lost_claim(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_claim_orders_for_export().returning(|_, _, _| Ok(vec![]));
    install(cfg, db);
}

fn configure_won_claim(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_claim_orders_for_export().returning(|order_ids, expected, new_status| {
        assert_eq!(expected, FulfillmentStatus::Unfulfilled);
        assert_eq!(new_status, FulfillmentStatus::Processing);
        Ok(vec![sample_order(order_ids[0].as_str(), PaymentStatus::Completed, FulfillmentStatus::Processing)])
    });
    install(cfg, db);
}

fn configure_redownload_claim(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_claim_orders_for_export().returning(|order_ids, expected, new_status| {
        // A redownload re-claims orders that already left Unfulfilled
        assert_eq!(expected, FulfillmentStatus::Processing);
        assert_eq!(new_status, FulfillmentStatus::Processing);
        Ok(vec![sample_order(order_ids[0].as_str(), PaymentStatus::Completed, FulfillmentStatus::Processing)])
    });
    install(cfg, db);
}
