//! HMAC middleware for Actix Web.
//!
//! The fulfillment provider signs every webhook callback with HMAC-SHA256 over the raw request body, using the
//! shared key from the server configuration, and puts the hex signature in the `x-webhook-signature` header.
//!
//! Wrap the webhook scope with this middleware to reject forged callbacks before they reach a handler. With
//! enforcement turned off (development instances only), an invalid or missing signature is logged and the request
//! is let through.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorBadRequest,
    web,
    Error,
};
use bpg_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{errors::ServerError, helpers::calculate_hmac};

pub struct HmacMiddlewareFactory {
    hmac_header: String,
    key: Secret<String>,
    // If false, a failed signature check is logged but the call is allowed through
    enforce: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(hmac_header: &str, key: Secret<String>, enforce: bool) -> Self {
        HmacMiddlewareFactory { hmac_header: hmac_header.into(), key, enforce }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            hmac_header: self.hmac_header.clone(),
            key: self.key.clone(),
            enforce: self.enforce,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    hmac_header: String,
    key: Secret<String>,
    enforce: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let hmac_header = self.hmac_header.clone();
        let enforce = self.enforce;
        Box::pin(async move {
            trace!("🔐️ Checking HMAC for request");
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let hmac_calc = calculate_hmac(&secret, data.as_ref());
            let validated = match req.headers().get(&hmac_header) {
                Some(hmac) => hmac == hmac_calc.as_str(),
                None => {
                    warn!("🔐️ No HMAC signature found in request.");
                    false
                },
            };
            if validated {
                trace!("🔐️ HMAC check for request ✅️");
            } else if enforce {
                warn!("🔐️ Invalid HMAC signature found in request. Denying access.");
                return Err(ServerError::InvalidWebhookSignature.into());
            } else {
                warn!("🔐️ Invalid HMAC signature found in request, but enforcement is off. Allowing request.");
            }
            req.set_payload(bytes_to_payload(data));
            service.call(req).await
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
