use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use bundle_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    FulfillmentDispatcher,
    OrderFlowApi,
    Reconciler,
    RepairApi,
    SqliteDatabase,
    WalletApi,
};
use log::*;

use crate::{
    config::{ReconcileOptions, ServerConfig},
    errors::ServerError,
    integrations::{TelcoGateway, TelcoProvider},
    middleware::HmacMiddlewareFactory,
    routes::{
        health,
        webhook_challenge,
        CheckoutRoute,
        ClaimOrdersRoute,
        FailedButPaidRoute,
        FulfillmentWebhookRoute,
        MissingProfitRoute,
        OrderRoute,
        OrderSearchRoute,
        PayOrderRoute,
        ReconcileRoute,
        RepairFailedButPaidRoute,
        RepairMissingProfitRoute,
        RunRetriesRoute,
        ShopBalanceRoute,
        TopUpRoute,
        WalletRoute,
    },
    workers::{start_reconcile_worker, start_retry_worker},
};

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = start_default_event_handlers().await;
    let gateway = TelcoGateway::new(config.gateway.clone())?;
    let provider = TelcoProvider::new(config.provider.clone())?;
    let options = ReconcileOptions::from_config(&config);
    start_reconcile_worker(
        db.clone(),
        gateway.clone(),
        provider.clone(),
        producers.clone(),
        options,
        config.reconcile_interval_secs,
    );
    start_retry_worker(db.clone(), provider.clone(), producers.clone(), config.retry_sweep_interval_secs);
    let srv = create_server_instance(config, db, gateway, provider, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Wires up the default event subscribers: pipeline milestones are logged, and terminal fulfillment failures are
/// logged loudly so an operator notices them.
async fn start_default_event_handlers() -> EventProducers {
    let mut hooks = EventHooks::default();
    hooks.on_order_delivered(|ev| {
        Box::pin(async move {
            debug!("📬️ Order {} delivered to {}", ev.order.order_id, ev.order.msisdn);
        })
    });
    hooks.on_order_failed(|ev| {
        Box::pin(async move {
            error!("📬️ Order {} failed terminally: {}. Manual intervention is required.", ev.order.order_id, ev.reason);
        })
    });
    let handlers = EventHandlers::new(25, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: TelcoGateway,
    provider: TelcoProvider,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let options = ReconcileOptions::from_config(&config);
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let wallet_api = WalletApi::new(db.clone());
        let repair_api = RepairApi::new(db.clone());
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), producers.clone());
        let reconciler = Reconciler::new(db.clone(), gateway.clone(), dispatcher.clone(), producers.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("bpg::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(wallet_api))
            .app_data(web::Data::new(repair_api))
            .app_data(web::Data::new(dispatcher))
            .app_data(web::Data::new(reconciler))
            .app_data(web::Data::new(options));
        let api_scope = web::scope("/api")
            .service(CheckoutRoute::<SqliteDatabase>::new())
            .service(OrderSearchRoute::<SqliteDatabase>::new())
            .service(OrderRoute::<SqliteDatabase>::new())
            .service(PayOrderRoute::<SqliteDatabase, TelcoProvider>::new())
            .service(ClaimOrdersRoute::<SqliteDatabase>::new())
            .service(WalletRoute::<SqliteDatabase>::new())
            .service(TopUpRoute::<SqliteDatabase>::new())
            .service(ShopBalanceRoute::<SqliteDatabase>::new())
            .service(ReconcileRoute::<SqliteDatabase, TelcoGateway, TelcoProvider>::new())
            .service(RunRetriesRoute::<SqliteDatabase, TelcoProvider>::new())
            .service(FailedButPaidRoute::<SqliteDatabase>::new())
            .service(RepairFailedButPaidRoute::<SqliteDatabase>::new())
            .service(MissingProfitRoute::<SqliteDatabase>::new())
            .service(RepairMissingProfitRoute::<SqliteDatabase>::new());
        // The provider signs POSTed callbacks only; the GET registration probe stays outside the HMAC scope.
        let webhook_scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                WEBHOOK_SIGNATURE_HEADER,
                config.webhook.hmac_secret.clone(),
                config.webhook.hmac_checks,
            ))
            .service(FulfillmentWebhookRoute::<SqliteDatabase>::new());
        app.service(health).service(webhook_challenge).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
