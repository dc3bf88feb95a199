//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. Any long, non-cpu-bound operation (I/O, database calls,
//! gateway and provider calls) must therefore be expressed as futures or asynchronous functions.

use actix_web::{get, web, HttpResponse, Responder};
use bpg_common::{normalize_msisdn, Cedis};
use bundle_payment_engine::{
    db_types::{FulfillmentStatus, Network, OrderId, PaymentStatus, TrackingStatus},
    traits::{FulfillmentProvider, OrderManagement, OrderQueryFilter, PaymentGateway, PaymentPipelineDatabase},
    FulfillmentDispatcher,
    OrderFlowApi,
    Reconciler,
    RepairApi,
    WalletApi,
};
use chrono::{DateTime, Utc};
use log::*;
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::ReconcileOptions,
    data_objects::{
        CheckoutRequest,
        ExportClaimRequest,
        FulfillmentWebhook,
        JsonResponse,
        RepairRequest,
        TopUpRequest,
        WalletPaymentRequest,
        WebhookAck,
        WebhookChallenge,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/orders" impl PaymentPipelineDatabase);
/// Creates a new order in `Pending`/`Unfulfilled` state. Idempotent with respect to the order id: resubmitting a
/// checkout returns the existing order with a 200 instead of a 201.
pub async fn checkout<B: PaymentPipelineDatabase>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let mut request = body.into_inner();
    trace!("💻️ POST checkout for order {}", request.order_id);
    let msisdn = normalize_msisdn(&request.msisdn)
        .ok_or_else(|| ServerError::RequestRejected(format!("{} is not a valid mobile number", request.msisdn)))?;
    request.msisdn = msisdn;
    let (order, created) = api.checkout(request.into_new_order()).await?;
    let response = if created { HttpResponse::Created().json(order) } else { HttpResponse::Ok().json(order) };
    Ok(response)
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order => Get "/orders/{order_id}" impl PaymentPipelineDatabase);
pub async fn order<B: PaymentPipelineDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    trace!("💻️ GET order {order_id}");
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))?;
    Ok(HttpResponse::Ok().json(order))
}

/// Query parameters for the order search endpoint. Every field is optional; an empty query returns all orders.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSearchParams {
    pub shop_id: Option<i64>,
    pub msisdn: Option<String>,
    pub network: Option<Network>,
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderSearchParams {
    fn into_filter(self) -> OrderQueryFilter {
        let mut query = OrderQueryFilter::default();
        if let Some(shop_id) = self.shop_id {
            query = query.with_shop_id(shop_id);
        }
        if let Some(msisdn) = self.msisdn {
            query = query.with_msisdn(msisdn);
        }
        if let Some(network) = self.network {
            query = query.with_network(network);
        }
        if let Some(status) = self.payment_status {
            query = query.with_payment_status(status);
        }
        if let Some(status) = self.fulfillment_status {
            query = query.with_fulfillment_status(status);
        }
        if let Some(since) = self.since {
            query = query.since(since);
        }
        if let Some(until) = self.until {
            query = query.until(until);
        }
        query
    }
}

route!(order_search => Get "/orders" impl PaymentPipelineDatabase);
pub async fn order_search<B: PaymentPipelineDatabase>(
    params: web::Query<OrderSearchParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let query = params.into_inner().into_filter();
    trace!("💻️ GET order search: {query:?}");
    let orders = api.search_orders(query).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(pay_order => Post "/orders/{order_id}/pay" impl PaymentPipelineDatabase, FulfillmentProvider);
/// Settles an order from the paying user's wallet. A 409 means a concurrent path (usually the reconciler)
/// settled it first; the money moved at most once either way.
///
/// Dispatch is spawned off the request so the payment response never waits on the provider; a failed dispatch is
/// picked up by the retry schedule.
pub async fn pay_order<B, P>(
    path: web::Path<String>,
    body: web::Json<WalletPaymentRequest>,
    api: web::Data<OrderFlowApi<B>>,
    dispatcher: web::Data<FulfillmentDispatcher<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentPipelineDatabase + 'static,
    P: FulfillmentProvider + 'static,
{
    let order_id = OrderId(path.into_inner());
    let user_id = body.user_id;
    debug!("💻️ POST wallet payment for order {order_id} by user {user_id}");
    let order = api.pay_from_wallet(&order_id, user_id).await?;
    let dispatcher = dispatcher.get_ref().clone();
    let id = order_id.clone();
    actix_web::rt::spawn(async move {
        match dispatcher.dispatch_order(&id).await {
            Ok(_) => {},
            Err(e) if e.is_benign() => {},
            Err(e) => warn!("💻️ Order {id} was paid but could not be dispatched: {e}"),
        }
    });
    Ok(HttpResponse::Ok().json(order))
}

route!(claim_orders => Post "/orders/claim" impl PaymentPipelineDatabase);
/// Claims a set of unfulfilled orders for out-of-band fulfillment (e.g. a manual batch export). Claimed orders
/// move to `Processing`, which keeps the automatic dispatcher off them. Orders lost to a concurrent claimant are
/// silently omitted; if every requested order was lost, the whole call fails with a 409 carrying an
/// `alreadyDownloaded` marker. With `isRedownload` set, orders that are already `Processing` are handed out
/// again.
pub async fn claim_orders<B: PaymentPipelineDatabase>(
    body: web::Json<ExportClaimRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    let order_ids = request.order_ids;
    if order_ids.is_empty() {
        return Err(ServerError::InvalidRequestBody("No order ids were supplied".to_string()));
    }
    debug!("💻️ POST claim for {} orders (redownload: {})", order_ids.len(), request.is_redownload);
    let expected = if request.is_redownload { FulfillmentStatus::Processing } else { FulfillmentStatus::Unfulfilled };
    let claimed = api.db().claim_orders_for_export(&order_ids, expected, FulfillmentStatus::Processing).await?;
    if claimed.is_empty() {
        return Err(ServerError::AlreadyDownloaded);
    }
    Ok(HttpResponse::Ok().json(json!({ "requested": order_ids.len(), "claimed": claimed })))
}

//----------------------------------------------   Wallets  ----------------------------------------------------
route!(wallet => Get "/wallet/{user_id}" impl PaymentPipelineDatabase);
pub async fn wallet<B: PaymentPipelineDatabase>(
    path: web::Path<i64>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    trace!("💻️ GET wallet for user {user_id}");
    let wallet = api
        .fetch_wallet(user_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("User {user_id} does not have a wallet")))?;
    Ok(HttpResponse::Ok().json(wallet))
}

route!(top_up => Post "/wallet/{user_id}/topup" impl PaymentPipelineDatabase);
/// Credits a wallet top-up. Idempotent with respect to the reference, so a gateway webhook retrying the same
/// top-up never double-credits.
pub async fn top_up<B: PaymentPipelineDatabase>(
    path: web::Path<i64>,
    body: web::Json<TopUpRequest>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    let request = body.into_inner();
    debug!("💻️ POST top-up [{}] for user {user_id}", request.reference);
    match api.top_up(user_id, Cedis::from_pesewas(request.amount), &request.reference).await? {
        Some(tx) => Ok(HttpResponse::Ok().json(tx)),
        None => Ok(HttpResponse::Ok().json(JsonResponse::success("Reference was already credited. No-op."))),
    }
}

//----------------------------------------------   Shops  ----------------------------------------------------
route!(shop_balance => Get "/shops/{shop_id}/balance" impl PaymentPipelineDatabase);
/// The shop's available balance, re-derived from the profit and withdrawal ledgers on every call.
pub async fn shop_balance<B: PaymentPipelineDatabase>(
    path: web::Path<i64>,
    api: web::Data<RepairApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let shop_id = path.into_inner();
    trace!("💻️ GET balance for shop #{shop_id}");
    let shop = api
        .db()
        .fetch_shop(shop_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Shop {shop_id} does not exist")))?;
    let balance = api.db().shop_available_balance(shop_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "shopId": shop.id, "name": shop.name, "availableBalance": balance })))
}

//----------------------------------------------   Reconciliation  ----------------------------------------------------
route!(reconcile => Get "/reconcile" impl PaymentPipelineDatabase, PaymentGateway, FulfillmentProvider);
/// Triggers one reconciliation sweep. A GET so an external scheduler can hit it on a timer; the sweep is
/// idempotent, so overlapping or repeated triggers converge on the same state.
pub async fn reconcile<B, G, P>(
    api: web::Data<Reconciler<B, G, P>>,
    options: web::Data<ReconcileOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentPipelineDatabase,
    G: PaymentGateway,
    P: FulfillmentProvider,
{
    info!("💻️ Reconcile sweep requested");
    let report = api.run(options.stale_order_age, options.item_delay).await?;
    Ok(HttpResponse::Ok().json(report))
}

route!(run_retries => Post "/retries/run" impl PaymentPipelineDatabase, FulfillmentProvider);
/// Runs all due fulfillment retries immediately, in addition to the background schedule.
pub async fn run_retries<B, P>(api: web::Data<FulfillmentDispatcher<B, P>>) -> Result<HttpResponse, ServerError>
where
    B: PaymentPipelineDatabase,
    P: FulfillmentProvider,
{
    info!("💻️ POST retry sweep requested");
    let attempted = api.run_due_retries().await?;
    Ok(HttpResponse::Ok().json(json!({ "attempted": attempted })))
}

//----------------------------------------------   Repairs  ----------------------------------------------------
route!(failed_but_paid => Get "/repairs/failed-but-paid" impl PaymentPipelineDatabase);
pub async fn failed_but_paid<B: PaymentPipelineDatabase>(
    api: web::Data<RepairApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET failed-but-paid candidates");
    let orders = api.find_failed_but_paid().await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(repair_failed_but_paid => Post "/repairs/failed-but-paid" impl PaymentPipelineDatabase);
/// Repairs failed-but-paid orders: one order with `{"orderId": ...}`, or the full sweep with `{"fixAll": true}`.
pub async fn repair_failed_but_paid<B: PaymentPipelineDatabase>(
    body: web::Json<RepairRequest>,
    api: web::Data<RepairApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    match (request.order_id, request.fix_all) {
        (Some(order_id), _) => {
            info!("💻️ POST failed-but-paid repair for order {order_id} (dry_run: {})", request.dry_run);
            let action = api.repair_failed_order(&order_id, request.dry_run).await?;
            Ok(HttpResponse::Ok().json(action))
        },
        (None, true) => {
            info!("💻️ POST failed-but-paid repair sweep (dry_run: {})", request.dry_run);
            let report = api.repair_failed_but_paid(request.dry_run).await?;
            Ok(HttpResponse::Ok().json(report))
        },
        (None, false) => Err(ServerError::InvalidRequestBody("Provide orderId or set fixAll".to_string())),
    }
}

route!(missing_profit => Get "/repairs/missing-profit" impl PaymentPipelineDatabase);
pub async fn missing_profit<B: PaymentPipelineDatabase>(
    api: web::Data<RepairApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET missing-profit candidates");
    let orders = api.find_missing_profit().await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(repair_missing_profit => Post "/repairs/missing-profit" impl PaymentPipelineDatabase);
/// Credits missing profits: one order with `{"orderId": ...}`, or the full sweep with `{"fixAll": true}`.
pub async fn repair_missing_profit<B: PaymentPipelineDatabase>(
    body: web::Json<RepairRequest>,
    api: web::Data<RepairApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    match (request.order_id, request.fix_all) {
        (Some(order_id), _) => {
            info!("💻️ POST missing-profit repair for order {order_id} (dry_run: {})", request.dry_run);
            let action = api.repair_profit_for_order(&order_id, request.dry_run).await?;
            Ok(HttpResponse::Ok().json(action))
        },
        (None, true) => {
            info!("💻️ POST missing-profit repair sweep (dry_run: {})", request.dry_run);
            let report = api.repair_missing_profit(request.dry_run).await?;
            Ok(HttpResponse::Ok().json(report))
        },
        (None, false) => Err(ServerError::InvalidRequestBody("Provide orderId or set fixAll".to_string())),
    }
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(fulfillment_webhook => Post "/fulfillment" impl PaymentPipelineDatabase);
/// The fulfillment provider's callback endpoint. The raw payload is written to the audit log before any action is
/// taken; if the audit write fails the provider gets a 5xx and retries. Everything after that responds 200 so the
/// provider does not retry events we have safely recorded -- every transition behind this handler is a claim or a
/// no-op, so replays are harmless.
pub async fn fulfillment_webhook<B: PaymentPipelineDatabase>(
    body: web::Json<FulfillmentWebhook>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let hook = body.into_inner();
    let order_id = hook.order.id.clone();
    trace!("📞️ Received {} webhook for order {order_id}", hook.event);
    let payload = serde_json::to_string(&hook).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let record = api.db().insert_webhook_event(&hook.event, None, &payload).await?;
    let result = match hook.event.as_str() {
        "order.delivered" | "order.completed" | "order.success" => {
            match api.confirm_delivery(&order_id, None).await {
                Ok(Some(_)) => JsonResponse::success("Order delivered."),
                Ok(None) => JsonResponse::success("Order was already delivered."),
                Err(e) => {
                    warn!("📞️ Could not process delivery confirmation for order {order_id}. {e}");
                    JsonResponse::failure(e)
                },
            }
        },
        "order.failed" | "order.error" => {
            let reason = hook.order.message.unwrap_or_else(|| "Provider reported a failure".to_string());
            match api.register_fulfillment_failure(&order_id, &reason).await {
                Ok(()) => JsonResponse::success("Failure recorded."),
                Err(e) => {
                    warn!("📞️ Could not register fulfillment failure for order {order_id}. {e}");
                    JsonResponse::failure(e)
                },
            }
        },
        "order.pending" | "order.processing" => {
            let status = if hook.event == "order.pending" { TrackingStatus::Pending } else { TrackingStatus::Sent };
            match api.update_provider_status(&order_id, status).await {
                Ok(()) => JsonResponse::success("Status updated."),
                Err(e) => {
                    warn!("📞️ Could not update provider status for order {order_id}. {e}");
                    JsonResponse::failure(e)
                },
            }
        },
        other => {
            info!("📞️ Ignoring unknown webhook event '{other}' for order {order_id}");
            JsonResponse::success("Event ignored.")
        },
    };
    Ok(HttpResponse::Ok().json(WebhookAck { success: result.success, message: result.message, trace_id: record.id }))
}

/// Endpoint registration probe. The provider calls this with a nonce and expects it echoed back verbatim.
#[get("/webhook/fulfillment")]
pub async fn webhook_challenge(query: web::Query<WebhookChallenge>) -> impl Responder {
    trace!("📞️ Received webhook challenge");
    HttpResponse::Ok().body(query.into_inner().challenge)
}
