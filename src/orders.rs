//! # Order lifecycle
//!
//! Advances an order through its status chain, claims it for a rider, and
//! runs the OTP handoff. All writes go through the conditional updates in
//! [`crate::repository`]; when a conditional update loses, the row is
//! re-read once to produce the precise rejection (`AlreadyAssigned` vs
//! `InvalidTransition` vs `NotFound`). Nothing here retries: the acting
//! client re-fetches and re-attempts.

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Order, OrderEvent, OrderItem, OrderStatus, Role},
    otp, repository, utils,
};

/// Provider- or customer-driven status change. Rider-owned transitions
/// (claim, arrival, pickup, handoff) are rejected here; they have their own
/// operations below.
pub async fn advance_status(
    pool: &SqlitePool,
    order_id: Uuid,
    target: OrderStatus,
    role: Role,
) -> Result<Order, AppError> {
    let order = repository::get_order(pool, order_id).await?;

    match target {
        OrderStatus::Cancelled | OrderStatus::Declined => {
            let allowed = match target {
                OrderStatus::Cancelled => role == Role::Customer,
                _ => role == Role::Provider,
            };
            if !allowed {
                return Err(AppError::NotEligible);
            }
            if !order.status.can_fail() {
                return Err(AppError::InvalidTransition);
            }
        }
        _ => {
            if role != Role::Provider {
                return Err(AppError::NotEligible);
            }
            if target.is_rider_owned() || order.status.is_rider_owned() {
                return Err(AppError::NotEligible);
            }
            if order.status.successor(order.fulfillment) != Some(target) {
                return Err(AppError::InvalidTransition);
            }
        }
    }

    if !repository::transition_order(pool, order_id, order.status, target).await? {
        // Lost to a concurrent writer; the caller re-fetches and decides.
        return Err(AppError::InvalidTransition);
    }

    repository::get_order(pool, order_id).await
}

/// Rider claim. At most one concurrent caller wins the conditional update;
/// everyone else sees `AlreadyAssigned` once a rider reference exists.
pub async fn assign_rider(
    pool: &SqlitePool,
    order_id: Uuid,
    rider_id: Uuid,
) -> Result<Order, AppError> {
    let rider = repository::get_rider(pool, rider_id).await?;
    if !rider.online {
        return Err(AppError::NotEligible);
    }

    if repository::claim_order(pool, order_id, rider_id).await? {
        return repository::get_order(pool, order_id).await;
    }

    let order = repository::get_order(pool, order_id).await?;
    if order.rider_id.is_some() {
        return Err(AppError::AlreadyAssigned);
    }

    Err(AppError::InvalidTransition)
}

pub async fn mark_arrived(
    pool: &SqlitePool,
    order_id: Uuid,
    rider_id: Uuid,
) -> Result<Order, AppError> {
    if repository::transition_order_by_rider(
        pool,
        order_id,
        rider_id,
        OrderStatus::Assigned,
        OrderStatus::ArrivedAtPickup,
    )
    .await?
    {
        return repository::get_order(pool, order_id).await;
    }

    Err(rider_rejection(pool, order_id, rider_id).await?)
}

/// Pickup transition. Generates the handoff code exactly once; the code is
/// returned to the rider's app and surfaced to the customer on the tracking
/// page, never in any shared channel.
pub async fn mark_picked_up(
    pool: &SqlitePool,
    order_id: Uuid,
    rider_id: Uuid,
) -> Result<(Order, String), AppError> {
    let code = otp::generate();

    if repository::set_picked_up(pool, order_id, rider_id, &code).await? {
        let order = repository::get_order(pool, order_id).await?;
        return Ok((order, code));
    }

    Err(rider_rejection(pool, order_id, rider_id).await?)
}

/// OTP-gated handoff. A wrong code never mutates the order; a correct code
/// completes it exactly once and bumps the rider's delivery count.
pub async fn verify_delivery(
    pool: &SqlitePool,
    order_id: Uuid,
    rider_id: Uuid,
    submitted: &str,
) -> Result<Order, AppError> {
    let order = repository::get_order(pool, order_id).await?;

    if order.rider_id != Some(rider_id) {
        return Err(AppError::NotAssignedRider);
    }
    if order.status != OrderStatus::OutForDelivery {
        return Err(AppError::NotInDeliverableState);
    }

    let stored = order.otp.as_deref().ok_or(AppError::NotInDeliverableState)?;
    if !otp::matches(stored, submitted) {
        return Err(AppError::InvalidOtp);
    }

    if !repository::complete_delivery(pool, order_id, rider_id, submitted).await? {
        // Checked state raced away between the read and the write.
        return Err(AppError::NotInDeliverableState);
    }

    repository::get_order(pool, order_id).await
}

/// Why did a rider-gated conditional update lose? Wrong rider beats wrong
/// state in the answer, so a rider never learns about an order that is not
/// theirs beyond "not yours".
async fn rider_rejection(
    pool: &SqlitePool,
    order_id: Uuid,
    rider_id: Uuid,
) -> Result<AppError, AppError> {
    let order = repository::get_order(pool, order_id).await?;

    if order.rider_id != Some(rider_id) {
        return Ok(AppError::NotAssignedRider);
    }

    Ok(AppError::InvalidTransition)
}

/// Pickup-ready orders this rider could claim, scoped to their operating
/// radius once they have reported a position. A rider who has never pinged
/// a location sees the unscoped list.
pub async fn list_available(pool: &SqlitePool, rider_id: Uuid) -> Result<Vec<Order>, AppError> {
    let rider = repository::get_rider(pool, rider_id).await?;
    if !rider.online {
        return Err(AppError::NotEligible);
    }

    let near = (rider.lat != 0.0 || rider.lng != 0.0)
        .then_some((rider.lat, rider.lng, utils::OPERATING_RADIUS_KM));

    repository::available_orders(pool, near).await
}

pub async fn list_active(pool: &SqlitePool, rider_id: Uuid) -> Result<Vec<Order>, AppError> {
    repository::get_rider(pool, rider_id).await?;
    repository::rider_active_orders(pool, rider_id).await
}

pub async fn list_history(pool: &SqlitePool, rider_id: Uuid) -> Result<Vec<Order>, AppError> {
    repository::get_rider(pool, rider_id).await?;
    repository::rider_order_history(pool, rider_id).await
}

/// Customer-facing tracking view: current status, the append-only timeline,
/// and the handoff code once pickup has happened. Polled by the client.
#[derive(Debug, Serialize)]
pub struct TrackView {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub timeline: Vec<OrderEvent>,
    pub otp: Option<String>,
}

pub async fn track(pool: &SqlitePool, order_id: Uuid) -> Result<TrackView, AppError> {
    let order = repository::get_order(pool, order_id).await?;
    let items = repository::get_order_items(pool, order_id).await?;
    let timeline = repository::get_order_events(pool, order_id).await?;
    let otp = order.otp.clone();

    Ok(TrackView {
        order,
        items,
        timeline,
        otp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Fulfillment, OrderKind},
        otp,
        test_support::{seed_marketplace, seed_order, test_pool},
    };

    async fn ready_order(
        pool: &SqlitePool,
        seed: &crate::test_support::Seed,
    ) -> Order {
        let order = seed_order(pool, seed, Fulfillment::Rider).await;

        for target in [
            OrderStatus::Accepted,
            OrderStatus::Preparing,
            OrderStatus::ReadyForPickup,
        ] {
            advance_status(pool, order.id, target, Role::Provider)
                .await
                .unwrap();
        }

        repository::get_order(pool, order.id).await.unwrap()
    }

    #[tokio::test]
    async fn totals_are_fixed_at_creation() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;

        let order = seed_order(&pool, &seed, Fulfillment::Rider).await;

        // one item at 500.00 plus flat 50.00 delivery, no platform fee
        assert_eq!(order.subtotal_cents, 50_000);
        assert_eq!(order.platform_fee_cents, 0);
        assert_eq!(order.delivery_fee_cents, 5_000);
        assert_eq!(order.total_cents, 55_000);

        advance_status(&pool, order.id, OrderStatus::Accepted, Role::Provider)
            .await
            .unwrap();
        advance_status(&pool, order.id, OrderStatus::Preparing, Role::Provider)
            .await
            .unwrap();

        let after = repository::get_order(&pool, order.id).await.unwrap();
        assert_eq!(after.total_cents, 55_000);
        assert_eq!(after.subtotal_cents, 50_000);
    }

    #[tokio::test]
    async fn oversized_quantity_cannot_wrap_the_subtotal() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;

        let err = repository::create_order(
            &pool,
            repository::NewOrder {
                customer_id: seed.customer_id,
                provider_id: seed.provider.id,
                kind: OrderKind::Grocery,
                fulfillment: Fulfillment::Rider,
                items: vec![repository::NewOrderItem {
                    product_id: seed.product.id,
                    quantity: i64::MAX,
                }],
                address: "12 MG Road".to_string(),
                lat: seed.provider.lat,
                lng: seed.provider.lng,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::MalformedPayload));
    }

    #[tokio::test]
    async fn skipped_transition_is_rejected() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = seed_order(&pool, &seed, Fulfillment::Rider).await;

        let err = advance_status(&pool, order.id, OrderStatus::Preparing, Role::Provider)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition));

        let unchanged = repository::get_order(&pool, order.id).await.unwrap();
        assert_eq!(unchanged.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn customer_cancels_provider_declines() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;

        let order = seed_order(&pool, &seed, Fulfillment::Rider).await;
        let err = advance_status(&pool, order.id, OrderStatus::Cancelled, Role::Provider)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotEligible));

        let cancelled = advance_status(&pool, order.id, OrderStatus::Cancelled, Role::Customer)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // terminal states are one-way
        let err = advance_status(&pool, order.id, OrderStatus::Accepted, Role::Provider)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition));

        let other = seed_order(&pool, &seed, Fulfillment::Rider).await;
        let declined = advance_status(&pool, other.id, OrderStatus::Declined, Role::Provider)
            .await
            .unwrap();
        assert_eq!(declined.status, OrderStatus::Declined);
    }

    #[tokio::test]
    async fn offline_rider_cannot_claim() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = ready_order(&pool, &seed).await;

        repository::set_rider_presence(&pool, seed.rider_id, false)
            .await
            .unwrap();

        let err = assign_rider(&pool, order.id, seed.rider_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotEligible));
    }

    #[tokio::test]
    async fn claim_requires_pickup_ready_state() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = seed_order(&pool, &seed, Fulfillment::Rider).await;

        let err = assign_rider(&pool, order.id, seed.rider_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition));
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = ready_order(&pool, &seed).await;
        let rider_b = crate::test_support::seed_rider(&pool, "scooter").await;

        let (a, b) = tokio::join!(
            assign_rider(&pool, order.id, seed.rider_id),
            assign_rider(&pool, order.id, rider_b),
        );

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);

        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser.unwrap_err(), AppError::AlreadyAssigned));

        let after = repository::get_order(&pool, order.id).await.unwrap();
        assert_eq!(after.status, OrderStatus::Assigned);
        assert!(after.rider_id == Some(seed.rider_id) || after.rider_id == Some(rider_b));
    }

    #[tokio::test]
    async fn full_delivery_flow_with_otp() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = ready_order(&pool, &seed).await;

        assign_rider(&pool, order.id, seed.rider_id).await.unwrap();
        mark_arrived(&pool, order.id, seed.rider_id).await.unwrap();

        let (picked, code) = mark_picked_up(&pool, order.id, seed.rider_id).await.unwrap();
        assert_eq!(picked.status, OrderStatus::OutForDelivery);
        assert!(otp::is_well_formed(&code));

        // wrong code rejects and mutates nothing
        let wrong = if code == "000000" { "000001" } else { "000000" };
        let err = verify_delivery(&pool, order.id, seed.rider_id, wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOtp));
        let still = repository::get_order(&pool, order.id).await.unwrap();
        assert_eq!(still.status, OrderStatus::OutForDelivery);

        let delivered = verify_delivery(&pool, order.id, seed.rider_id, &code)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        let rider = repository::get_rider(&pool, seed.rider_id).await.unwrap();
        assert_eq!(rider.deliveries, 1);

        // replay of the same code on a finished order
        let err = verify_delivery(&pool, order.id, seed.rider_id, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotInDeliverableState));

        let view = track(&pool, order.id).await.unwrap();
        let statuses: Vec<OrderStatus> = view.timeline.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Pending,
                OrderStatus::Accepted,
                OrderStatus::Preparing,
                OrderStatus::ReadyForPickup,
                OrderStatus::Assigned,
                OrderStatus::ArrivedAtPickup,
                OrderStatus::OutForDelivery,
                OrderStatus::Delivered,
            ]
        );
    }

    #[tokio::test]
    async fn foreign_rider_is_turned_away() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = ready_order(&pool, &seed).await;
        let stranger = crate::test_support::seed_rider(&pool, "cycle").await;

        assign_rider(&pool, order.id, seed.rider_id).await.unwrap();

        let err = mark_arrived(&pool, order.id, stranger).await.unwrap_err();
        assert!(matches!(err, AppError::NotAssignedRider));

        mark_arrived(&pool, order.id, seed.rider_id).await.unwrap();
        let err = mark_picked_up(&pool, order.id, stranger).await.unwrap_err();
        assert!(matches!(err, AppError::NotAssignedRider));
    }

    #[tokio::test]
    async fn no_cancel_once_out_for_delivery() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = ready_order(&pool, &seed).await;

        assign_rider(&pool, order.id, seed.rider_id).await.unwrap();
        mark_arrived(&pool, order.id, seed.rider_id).await.unwrap();
        mark_picked_up(&pool, order.id, seed.rider_id).await.unwrap();

        let err = advance_status(&pool, order.id, OrderStatus::Cancelled, Role::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition));
    }

    #[tokio::test]
    async fn self_fulfilled_orders_skip_rider_states() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        let order = seed_order(&pool, &seed, Fulfillment::SelfFulfilled).await;

        assert_eq!(order.kind, OrderKind::Grocery);
        assert_eq!(order.delivery_fee_cents, 0);

        let confirmed = advance_status(&pool, order.id, OrderStatus::Confirmed, Role::Provider)
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);

        let delivered = advance_status(&pool, order.id, OrderStatus::Delivered, Role::Provider)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn available_list_hides_claimed_orders() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;

        let first = ready_order(&pool, &seed).await;
        let second = ready_order(&pool, &seed).await;
        seed_order(&pool, &seed, Fulfillment::SelfFulfilled).await;

        let available = list_available(&pool, seed.rider_id).await.unwrap();
        assert_eq!(available.len(), 2);

        assign_rider(&pool, first.id, seed.rider_id).await.unwrap();

        let available = list_available(&pool, seed.rider_id).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, second.id);

        let active = list_active(&pool, seed.rider_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
        assert!(list_history(&pool, seed.rider_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn available_list_respects_operating_radius() {
        let pool = test_pool().await;
        let seed = seed_marketplace(&pool).await;
        ready_order(&pool, &seed).await;

        // ping next to the provider: the pickup is offered
        repository::set_rider_location(&pool, seed.rider_id, seed.provider.lat, seed.provider.lng)
            .await
            .unwrap();
        let available = list_available(&pool, seed.rider_id).await.unwrap();
        assert_eq!(available.len(), 1);

        // a degree of latitude north is over a hundred km out of range
        repository::set_rider_location(
            &pool,
            seed.rider_id,
            seed.provider.lat + 1.0,
            seed.provider.lng,
        )
        .await
        .unwrap();
        let available = list_available(&pool, seed.rider_id).await.unwrap();
        assert!(available.is_empty());
    }
}
