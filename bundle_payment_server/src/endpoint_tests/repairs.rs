use actix_web::{http::StatusCode, web, web::ServiceConfig};
use bundle_payment_engine::{
    db_types::{FulfillmentStatus, PaymentStatus},
    events::EventProducers,
    FulfillmentDispatcher,
    Reconciler,
    RepairApi,
};
use serde_json::json;

use super::{
    helpers::{get_request, post_request},
    mocks::{sample_order, MockPipelineDb, NullGateway, NullProvider},
};
use crate::{
    config::ReconcileOptions,
    routes::{ReconcileRoute, RepairFailedButPaidRoute},
};

#[actix_web::test]
async fn single_order_repair_resets_the_order() {
    let _ = env_logger::try_init().ok();
    let body = json!({ "orderId": "BP-9001" });
    let (status, body) = post_request("/repairs/failed-but-paid", body, &[], configure_single_repair).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""action":"reset""#), "unexpected body: {body}");
    assert!(body.contains(r#""orderId":"BP-9001""#), "unexpected body: {body}");
}

#[actix_web::test]
async fn repair_without_a_target_is_rejected() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/repairs/failed-but-paid", json!({}), &[], configure_single_repair)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("orderId or set fixAll"), "unexpected body: {body}");
}

#[actix_web::test]
async fn fix_all_runs_the_full_sweep() {
    let _ = env_logger::try_init().ok();
    let body = json!({ "fixAll": true });
    let (status, body) = post_request("/repairs/failed-but-paid", body, &[], configure_single_repair).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""examined":1"#), "unexpected body: {body}");
    assert!(body.contains(r#""repaired":1"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn reconcile_sweep_runs_on_a_get() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/reconcile", configure_reconcile).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "unexpected body: {body}");
    assert!(body.contains(r#""total":0"#), "unexpected body: {body}");
}

fn configure_single_repair(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_fetch_failed_but_paid().returning(|| {
        Ok(vec![sample_order("BP-9001", PaymentStatus::Failed, FulfillmentStatus::Unfulfilled)])
    });
    db.expect_reset_failed_order().returning(|order_id| {
        Ok(Some(sample_order(order_id.as_str(), PaymentStatus::Pending, FulfillmentStatus::Unfulfilled)))
    });
    let api = RepairApi::new(db);
    cfg.service(RepairFailedButPaidRoute::<MockPipelineDb>::new()).app_data(web::Data::new(api));
}

fn configure_reconcile(cfg: &mut ServiceConfig) {
    let mut db = MockPipelineDb::new();
    db.expect_fetch_stale_pending_orders().returning(|_| Ok(vec![]));
    let dispatcher = FulfillmentDispatcher::new(MockPipelineDb::new(), NullProvider, EventProducers::default());
    let reconciler = Reconciler::new(db, NullGateway, dispatcher, EventProducers::default());
    let options =
        ReconcileOptions { stale_order_age: chrono::Duration::minutes(10), item_delay: std::time::Duration::ZERO };
    cfg.service(ReconcileRoute::<MockPipelineDb, NullGateway, NullProvider>::new())
        .app_data(web::Data::new(reconciler))
        .app_data(web::Data::new(options));
}
