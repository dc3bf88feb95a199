//! # Bundle payment server
//! This module hosts the HTTP surface of the bundle payment gateway. It is responsible for:
//! Serving the storefront API (checkout, wallet settlement, order queries and claims).
//! Listening for incoming webhook callbacks from the fulfillment provider and verifying their signatures.
//! Running the background reconciliation and retry workers against the payment gateway and provider APIs.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/...`: The storefront and operations API.
//! * `/webhook/fulfillment`: The callback route for receiving fulfillment events from the provider.

pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
