//! Shared fixtures for the async tests: an in-memory pool plus a minimal
//! seeded marketplace (one customer, one grocery provider with a product,
//! one online rider).

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::{
    database,
    models::{Booking, Fulfillment, Order, OrderKind, Product, Provider, Role},
    repository::{self, NewBooking, NewOrder, NewOrderItem},
};

pub struct Seed {
    pub customer_id: Uuid,
    pub provider: Provider,
    pub product: Product,
    pub rider_id: Uuid,
}

/// Single-connection in-memory database; concurrent writers serialize at the
/// pool, which is exactly the contention the CAS tests want.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    database::migrate(&pool).await.unwrap();

    pool
}

pub async fn seed_marketplace(pool: &SqlitePool) -> Seed {
    let customer_id = repository::create_user(pool, "Asha", "9000000001", Role::Customer)
        .await
        .unwrap();

    let owner_id = repository::create_user(pool, "Sharma", "9000000002", Role::Provider)
        .await
        .unwrap();
    let provider = repository::create_provider(
        pool,
        owner_id,
        "Sharma Stores",
        "Grocery",
        12.9716,
        77.5946,
    )
    .await
    .unwrap();

    let product = repository::create_product(pool, provider.id, "Rice 5kg", 50_000)
        .await
        .unwrap();

    let rider_id = seed_rider(pool, "bike").await;

    Seed {
        customer_id,
        provider,
        product,
        rider_id,
    }
}

pub async fn seed_rider(pool: &SqlitePool, vehicle: &str) -> Uuid {
    let user_id = repository::create_user(pool, "Ravi", "9000000003", Role::Rider)
        .await
        .unwrap();
    let rider = repository::create_rider(pool, user_id, vehicle).await.unwrap();

    repository::set_rider_presence(pool, rider.id, true)
        .await
        .unwrap();

    rider.id
}

/// One line item at the seeded product's price, dropoff at the provider's
/// own coordinates so the delivery fee is the flat base.
pub async fn seed_order(pool: &SqlitePool, seed: &Seed, fulfillment: Fulfillment) -> Order {
    repository::create_order(
        pool,
        NewOrder {
            customer_id: seed.customer_id,
            provider_id: seed.provider.id,
            kind: OrderKind::Grocery,
            fulfillment,
            items: vec![NewOrderItem {
                product_id: seed.product.id,
                quantity: 1,
            }],
            address: "12 MG Road".to_string(),
            lat: seed.provider.lat,
            lng: seed.provider.lng,
        },
    )
    .await
    .unwrap()
}

pub async fn seed_booking(pool: &SqlitePool, seed: &Seed) -> Booking {
    repository::create_booking(
        pool,
        NewBooking {
            customer_id: seed.customer_id,
            provider_id: seed.provider.id,
            service: "ceiling fan repair".to_string(),
            scheduled_for: Utc::now(),
            address: "12 MG Road".to_string(),
            phone: "9000000001".to_string(),
            notes: None,
        },
    )
    .await
    .unwrap()
}
