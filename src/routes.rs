//! Route handlers. Thin by design: they own the request/response shapes and
//! reject malformed bodies, then hand off to the lifecycle managers and the
//! repository. No transition rules live here.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    bookings,
    error::AppError,
    models::{BookingStatus, Fulfillment, OrderKind, OrderStatus, Role, SparePart},
    orders,
    repository::{self, NewBooking, NewOrder, NewOrderItem},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Providers and products
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ProviderFilter {
    category: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    radius_km: Option<f64>,
}

pub async fn list_providers_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProviderFilter>,
) -> Result<impl IntoResponse, AppError> {
    let near = match (filter.lat, filter.lng, filter.radius_km) {
        (Some(lat), Some(lng), Some(radius_km)) => Some((lat, lng, radius_km)),
        (None, None, None) => None,
        _ => return Err(AppError::MalformedPayload),
    };

    let providers =
        repository::list_providers(&state.pool, filter.category.as_deref(), near).await?;

    Ok(Json(providers))
}

#[derive(Deserialize)]
pub struct PriceFilter {
    min_price_cents: Option<i64>,
    max_price_cents: Option<i64>,
}

pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
    Query(filter): Query<PriceFilter>,
) -> Result<impl IntoResponse, AppError> {
    let products = repository::list_products(
        &state.pool,
        provider_id,
        filter.min_price_cents,
        filter.max_price_cents,
    )
    .await?;

    Ok(Json(products))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateOrderItem {
    product_id: Uuid,
    quantity: i64,
}

#[derive(Deserialize)]
pub struct CreateOrder {
    customer_id: Uuid,
    provider_id: Uuid,
    kind: OrderKind,
    fulfillment: Fulfillment,
    items: Vec<CreateOrderItem>,
    address: String,
    lat: f64,
    lng: f64,
}

/// Nobody orders a thousand of anything from a street stall.
const MAX_ITEM_QUANTITY: i64 = 1000;

pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrder>,
) -> Result<impl IntoResponse, AppError> {
    if payload.items.is_empty()
        || payload
            .items
            .iter()
            .any(|i| i.quantity < 1 || i.quantity > MAX_ITEM_QUANTITY)
        || payload.address.trim().is_empty()
    {
        return Err(AppError::MalformedPayload);
    }

    let order = repository::create_order(
        &state.pool,
        NewOrder {
            customer_id: payload.customer_id,
            provider_id: payload.provider_id,
            kind: payload.kind,
            fulfillment: payload.fulfillment,
            items: payload
                .items
                .into_iter()
                .map(|i| NewOrderItem {
                    product_id: i.product_id,
                    quantity: i.quantity,
                })
                .collect(),
            address: payload.address,
            lat: payload.lat,
            lng: payload.lng,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn track_order_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = orders::track(&state.pool, order_id).await?;

    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct OrderStatusChange {
    target: OrderStatus,
    role: Role,
}

pub async fn order_status_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<OrderStatusChange>,
) -> Result<impl IntoResponse, AppError> {
    let order =
        orders::advance_status(&state.pool, order_id, payload.target, payload.role).await?;

    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// Rider surface
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RiderQuery {
    rider_id: Uuid,
}

pub async fn available_orders_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RiderQuery>,
) -> Result<impl IntoResponse, AppError> {
    let available = orders::list_available(&state.pool, query.rider_id).await?;

    Ok(Json(available))
}

pub async fn my_active_orders_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RiderQuery>,
) -> Result<impl IntoResponse, AppError> {
    let active = orders::list_active(&state.pool, query.rider_id).await?;

    Ok(Json(active))
}

pub async fn order_history_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RiderQuery>,
) -> Result<impl IntoResponse, AppError> {
    let history = orders::list_history(&state.pool, query.rider_id).await?;

    Ok(Json(history))
}

#[derive(Deserialize)]
pub struct RiderAction {
    rider_id: Uuid,
}

pub async fn accept_order_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RiderAction>,
) -> Result<impl IntoResponse, AppError> {
    let order = orders::assign_rider(&state.pool, order_id, payload.rider_id).await?;

    Ok(Json(order))
}

pub async fn arrived_at_pickup_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RiderAction>,
) -> Result<impl IntoResponse, AppError> {
    let order = orders::mark_arrived(&state.pool, order_id, payload.rider_id).await?;

    Ok(Json(order))
}

#[derive(Serialize)]
pub struct PickupResponse {
    order: crate::models::Order,
    otp: String,
}

pub async fn picked_up_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RiderAction>,
) -> Result<impl IntoResponse, AppError> {
    let (order, otp) = orders::mark_picked_up(&state.pool, order_id, payload.rider_id).await?;

    Ok(Json(PickupResponse { order, otp }))
}

#[derive(Deserialize)]
pub struct DeliveryProof {
    rider_id: Uuid,
    otp: String,
}

pub async fn verify_delivery_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<DeliveryProof>,
) -> Result<impl IntoResponse, AppError> {
    let order =
        orders::verify_delivery(&state.pool, order_id, payload.rider_id, &payload.otp).await?;

    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct Presence {
    online: bool,
}

pub async fn rider_presence_handler(
    State(state): State<Arc<AppState>>,
    Path(rider_id): Path<Uuid>,
    Json(payload): Json<Presence>,
) -> Result<impl IntoResponse, AppError> {
    repository::set_rider_presence(&state.pool, rider_id, payload.online).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct LocationPing {
    lat: f64,
    lng: f64,
}

pub async fn rider_location_handler(
    State(state): State<Arc<AppState>>,
    Path(rider_id): Path<Uuid>,
    Json(payload): Json<LocationPing>,
) -> Result<impl IntoResponse, AppError> {
    repository::set_rider_location(&state.pool, rider_id, payload.lat, payload.lng).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Bookings and invoices
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateBooking {
    customer_id: Uuid,
    provider_id: Uuid,
    service: String,
    scheduled_for: DateTime<Utc>,
    address: String,
    phone: String,
    notes: Option<String>,
}

pub async fn create_booking_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBooking>,
) -> Result<impl IntoResponse, AppError> {
    if payload.service.trim().is_empty()
        || payload.address.trim().is_empty()
        || payload.phone.trim().is_empty()
    {
        return Err(AppError::MalformedPayload);
    }

    let booking = repository::create_booking(
        &state.pool,
        NewBooking {
            customer_id: payload.customer_id,
            provider_id: payload.provider_id,
            service: payload.service,
            scheduled_for: payload.scheduled_for,
            address: payload.address,
            phone: payload.phone,
            notes: payload.notes,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Deserialize)]
pub struct BookingStatusChange {
    target: BookingStatus,
    role: Role,
    actor_id: Uuid,
}

#[derive(Serialize)]
pub struct BookingStatusResponse {
    booking: crate::models::Booking,
    #[serde(skip_serializing_if = "Option::is_none")]
    otp: Option<String>,
}

pub async fn booking_status_handler(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<BookingStatusChange>,
) -> Result<impl IntoResponse, AppError> {
    let (booking, otp) = bookings::advance_status(
        &state.pool,
        booking_id,
        payload.target,
        payload.role,
        payload.actor_id,
    )
    .await?;

    Ok(Json(BookingStatusResponse { booking, otp }))
}

#[derive(Deserialize)]
pub struct CompletionProof {
    provider_id: Uuid,
    otp: String,
}

pub async fn verify_completion_handler(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<CompletionProof>,
) -> Result<impl IntoResponse, AppError> {
    let booking =
        bookings::verify_completion(&state.pool, booking_id, payload.provider_id, &payload.otp)
            .await?;

    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct CreateInvoice {
    booking_id: Uuid,
    provider_id: Uuid,
    service_charge_cents: i64,
    #[serde(default)]
    spare_parts: Vec<SparePart>,
}

pub async fn create_invoice_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateInvoice>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = bookings::create_invoice(
        &state.pool,
        payload.booking_id,
        payload.provider_id,
        payload.service_charge_cents,
        payload.spare_parts,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(invoice)))
}

#[derive(Serialize)]
pub struct PaymentOrderResponse {
    invoice: crate::models::Invoice,
    gateway_order: crate::payments::GatewayOrder,
}

pub async fn create_payment_order_handler(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (invoice, gateway_order) =
        bookings::create_payment_order(&state.pool, state.gateway.as_ref(), invoice_id).await?;

    Ok(Json(PaymentOrderResponse {
        invoice,
        gateway_order,
    }))
}

#[derive(Deserialize)]
pub struct PaymentCallback {
    gateway_order_id: String,
    payment_id: String,
    signature: String,
}

pub async fn verify_payment_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PaymentCallback>,
) -> Result<impl IntoResponse, AppError> {
    if payload.gateway_order_id.is_empty()
        || payload.payment_id.is_empty()
        || payload.signature.is_empty()
    {
        return Err(AppError::MalformedPayload);
    }

    let invoice = bookings::record_payment(
        &state.pool,
        &state.verifier,
        &payload.gateway_order_id,
        &payload.payment_id,
        &payload.signature,
    )
    .await?;

    Ok(Json(invoice))
}
