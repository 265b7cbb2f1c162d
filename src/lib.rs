//! Backend for a local multi-vertical marketplace: groceries, restaurants,
//! street food, beauty and cake shops, and on-site home services, with
//! customer, provider and delivery-rider roles.
//!
//!
//!
//! # General Infrastructure
//! - One axum service in front of a single SQLite store
//! - Clients are polling SPAs: status changes are learned by re-fetching the
//!   tracking and list endpoints every few seconds, there is no push channel
//! - The payment gateway, maps/geocoding, and SMS routing are external
//!   collaborators reached through their public interfaces only
//!
//!
//!
//! # Order & Booking Lifecycles
//!
//! **Goal**: every status change is legal per a closed transition table and
//! survives concurrent writers.
//!
//! - Delivery orders: pending → accepted → preparing → ready_for_pickup →
//!   assigned → arrived_at_pickup → out_for_delivery → delivered
//! - Self-fulfilled orders: pending → confirmed → delivered
//! - Service bookings: pending → accepted → in_progress → awaiting_otp →
//!   awaiting_billing → pending_payment → completed
//! - decline/cancel are one-way terminal states with a closing window
//! - Every status write is a conditional UPDATE on the expected prior state,
//!   so a rider claim race has exactly one winner and the loser is told
//!   `already_assigned`
//! - Handoff is gated by a 6-digit code generated at pickup and consumed at
//!   delivery, shown only on the owning customer's tracking page
//! - The payment verification callback is idempotent because gateways
//!   redeliver webhooks
//!
//!
//!
//! # Notes
//!
//! ## SQLite over a key-value store
//! Orders, bookings and invoices are joined, filtered and conditionally
//! updated; that is relational work. The dataset is city-scale, a single
//! file database holds it comfortably, and the conditional UPDATE gives the
//! at-most-one-winner guarantee without any in-process locking.
//!
//! ## Polling over push
//! A tracking page that re-fetches every 5-10 seconds is the simplest
//! correct design at this scale. Push notifications exist as a best-effort
//! collaborator on the client side and carry no correctness weight.
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, patch, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod bookings;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod orders;
pub mod otp;
pub mod payments;
pub mod repository;
pub mod routes;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

use routes::{
    accept_order_handler, arrived_at_pickup_handler, available_orders_handler,
    booking_status_handler, create_booking_handler, create_invoice_handler, create_order_handler,
    create_payment_order_handler, list_products_handler, list_providers_handler,
    my_active_orders_handler, order_history_handler, order_status_handler, picked_up_handler,
    rider_location_handler, rider_presence_handler, track_order_handler,
    verify_completion_handler, verify_delivery_handler, verify_payment_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/providers", get(list_providers_handler))
        .route("/providers/{id}/products", get(list_products_handler))
        .route("/orders", post(create_order_handler))
        .route("/orders/{id}/track", get(track_order_handler))
        .route("/orders/{id}/status", patch(order_status_handler))
        .route("/bookings", post(create_booking_handler))
        .route("/bookings/{id}/status", patch(booking_status_handler))
        .route(
            "/bookings/{id}/verify-completion",
            post(verify_completion_handler),
        )
        .route("/invoices", post(create_invoice_handler))
        .route(
            "/invoices/{id}/create-payment-order",
            post(create_payment_order_handler),
        )
        .route("/invoices/verify-payment", post(verify_payment_handler))
        .route("/rider/orders/available", get(available_orders_handler))
        .route("/rider/orders/my-active", get(my_active_orders_handler))
        .route("/rider/orders/history", get(order_history_handler))
        .route("/rider/orders/{id}/accept", post(accept_order_handler))
        .route(
            "/rider/orders/{id}/arrived-at-pickup",
            post(arrived_at_pickup_handler),
        )
        .route("/rider/orders/{id}/picked-up", post(picked_up_handler))
        .route(
            "/rider/orders/{id}/verify-delivery",
            post(verify_delivery_handler),
        )
        .route("/rider/{id}/presence", post(rider_presence_handler))
        .route("/rider/{id}/location", post(rider_location_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
