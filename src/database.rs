//! # SQLite
//!
//! Single relational store for every entity. Identifiers are UUID blobs,
//! timestamps are RFC 3339 text, statuses are text backed by the closed
//! enums in [`crate::models`].
//!
//! All status mutations elsewhere in the crate are single conditional
//! UPDATE statements keyed on the expected prior state, so concurrent
//! writers on the same row resolve to exactly one winner without any
//! in-process locking.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub async fn init_pool(database_url: &str) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await
        .unwrap();

    migrate(&pool).await.unwrap();

    pool
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        name TEXT NOT NULL,
        phone TEXT NOT NULL,
        role TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS providers (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        lat REAL NOT NULL,
        lng REAL NOT NULL,
        open INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id BLOB PRIMARY KEY,
        provider_id BLOB NOT NULL REFERENCES providers(id),
        name TEXT NOT NULL,
        price_cents INTEGER NOT NULL,
        available INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS riders (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL REFERENCES users(id),
        online INTEGER NOT NULL DEFAULT 0,
        lat REAL NOT NULL DEFAULT 0,
        lng REAL NOT NULL DEFAULT 0,
        vehicle TEXT NOT NULL DEFAULT '',
        deliveries INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id BLOB PRIMARY KEY,
        customer_id BLOB NOT NULL REFERENCES users(id),
        provider_id BLOB NOT NULL REFERENCES providers(id),
        kind TEXT NOT NULL,
        fulfillment TEXT NOT NULL,
        status TEXT NOT NULL,
        rider_id BLOB REFERENCES riders(id),
        otp TEXT,
        subtotal_cents INTEGER NOT NULL,
        platform_fee_cents INTEGER NOT NULL,
        delivery_fee_cents INTEGER NOT NULL,
        total_cents INTEGER NOT NULL,
        address TEXT NOT NULL,
        lat REAL NOT NULL,
        lng REAL NOT NULL,
        created_at TEXT NOT NULL,
        delivered_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS order_items (
        order_id BLOB NOT NULL REFERENCES orders(id),
        product_id BLOB NOT NULL REFERENCES products(id),
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price_cents INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS order_events (
        order_id BLOB NOT NULL REFERENCES orders(id),
        status TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS bookings (
        id BLOB PRIMARY KEY,
        customer_id BLOB NOT NULL REFERENCES users(id),
        provider_id BLOB NOT NULL REFERENCES providers(id),
        service TEXT NOT NULL,
        status TEXT NOT NULL,
        otp TEXT,
        scheduled_for TEXT NOT NULL,
        address TEXT NOT NULL,
        phone TEXT NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS invoices (
        id BLOB PRIMARY KEY,
        booking_id BLOB NOT NULL UNIQUE REFERENCES bookings(id),
        service_charge_cents INTEGER NOT NULL,
        spare_parts TEXT NOT NULL,
        total_cents INTEGER NOT NULL,
        payment_status TEXT NOT NULL,
        gateway_order_id TEXT,
        payment_id TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_rider ON orders(rider_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
    "CREATE INDEX IF NOT EXISTS idx_order_events_order ON order_events(order_id)",
    "CREATE INDEX IF NOT EXISTS idx_invoices_gateway ON invoices(gateway_order_id)",
];
