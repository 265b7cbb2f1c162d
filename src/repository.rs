//! # Query layer
//!
//! Every read and write against SQLite lives here. The lifecycle managers
//! never touch SQL directly; they call the conditional-update helpers below
//! and interpret `false` ("the row was not in the expected prior state") by
//! re-reading the row.
//!
//! The conditional updates are the concurrency story: a status change is one
//! UPDATE keyed on the expected prior status (and rider column, for claims),
//! so two writers racing on the same order resolve to exactly one winner at
//! the database, with no read-modify-write window in between.

use chrono::Utc;
use sqlx::{SqlitePool, types::Json};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        Booking, BookingStatus, Fulfillment, Invoice, Order, OrderEvent, OrderItem, OrderKind,
        OrderStatus, PaymentStatus, Product, Provider, Rider, Role, SparePart,
    },
    utils,
};

const ORDER_COLUMNS: &str = "id, customer_id, provider_id, kind, fulfillment, status, rider_id, \
     otp, subtotal_cents, platform_fee_cents, delivery_fee_cents, total_cents, address, lat, lng, \
     created_at, delivered_at";

const BOOKING_COLUMNS: &str =
    "id, customer_id, provider_id, service, status, otp, scheduled_for, address, phone, notes, \
     created_at";

const INVOICE_COLUMNS: &str = "id, booking_id, service_charge_cents, spare_parts, total_cents, \
     payment_status, gateway_order_id, payment_id, created_at";

// ---------------------------------------------------------------------------
// Users, providers, products, riders
// ---------------------------------------------------------------------------

pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    phone: &str,
    role: Role,
) -> Result<Uuid, AppError> {
    let id = Uuid::new_v4();

    sqlx::query("INSERT INTO users (id, name, phone, role) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(phone)
        .bind(role)
        .execute(pool)
        .await?;

    Ok(id)
}

pub async fn create_provider(
    pool: &SqlitePool,
    user_id: Uuid,
    name: &str,
    category: &str,
    lat: f64,
    lng: f64,
) -> Result<Provider, AppError> {
    let provider = Provider {
        id: Uuid::new_v4(),
        user_id,
        name: name.to_string(),
        category: utils::normalize_name(category),
        lat,
        lng,
        open: true,
    };

    sqlx::query(
        "INSERT INTO providers (id, user_id, name, category, lat, lng, open) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(provider.id)
    .bind(provider.user_id)
    .bind(&provider.name)
    .bind(&provider.category)
    .bind(provider.lat)
    .bind(provider.lng)
    .bind(provider.open)
    .execute(pool)
    .await?;

    Ok(provider)
}

pub async fn get_provider(pool: &SqlitePool, id: Uuid) -> Result<Provider, AppError> {
    sqlx::query_as::<_, Provider>(
        "SELECT id, user_id, name, category, lat, lng, open FROM providers WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("provider"))
}

/// Filtered provider listing. Category matches the normalized form; the
/// geo-radius filter runs in Rust since the table stays small per city.
pub async fn list_providers(
    pool: &SqlitePool,
    category: Option<&str>,
    near: Option<(f64, f64, f64)>,
) -> Result<Vec<Provider>, AppError> {
    let providers = match category {
        Some(category) => {
            sqlx::query_as::<_, Provider>(
                "SELECT id, user_id, name, category, lat, lng, open FROM providers \
                 WHERE open = 1 AND category = ?",
            )
            .bind(utils::normalize_name(category))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Provider>(
                "SELECT id, user_id, name, category, lat, lng, open FROM providers WHERE open = 1",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(match near {
        Some((lat, lng, radius_km)) => providers
            .into_iter()
            .filter(|p| utils::distance_km(lat, lng, p.lat, p.lng) <= radius_km)
            .collect(),
        None => providers,
    })
}

pub async fn create_product(
    pool: &SqlitePool,
    provider_id: Uuid,
    name: &str,
    price_cents: i64,
) -> Result<Product, AppError> {
    let product = Product {
        id: Uuid::new_v4(),
        provider_id,
        name: name.to_string(),
        price_cents,
        available: true,
    };

    sqlx::query(
        "INSERT INTO products (id, provider_id, name, price_cents, available) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(product.id)
    .bind(product.provider_id)
    .bind(&product.name)
    .bind(product.price_cents)
    .bind(product.available)
    .execute(pool)
    .await?;

    Ok(product)
}

pub async fn list_products(
    pool: &SqlitePool,
    provider_id: Uuid,
    min_price_cents: Option<i64>,
    max_price_cents: Option<i64>,
) -> Result<Vec<Product>, AppError> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT id, provider_id, name, price_cents, available FROM products \
         WHERE provider_id = ? AND available = 1 AND price_cents >= ? AND price_cents <= ? \
         ORDER BY price_cents",
    )
    .bind(provider_id)
    .bind(min_price_cents.unwrap_or(0))
    .bind(max_price_cents.unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    Ok(products)
}

pub async fn get_product(pool: &SqlitePool, id: Uuid) -> Result<Product, AppError> {
    sqlx::query_as::<_, Product>(
        "SELECT id, provider_id, name, price_cents, available FROM products WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("product"))
}

pub async fn create_rider(
    pool: &SqlitePool,
    user_id: Uuid,
    vehicle: &str,
) -> Result<Rider, AppError> {
    let rider = Rider {
        id: Uuid::new_v4(),
        user_id,
        online: false,
        lat: 0.0,
        lng: 0.0,
        vehicle: vehicle.to_string(),
        deliveries: 0,
    };

    sqlx::query(
        "INSERT INTO riders (id, user_id, online, lat, lng, vehicle, deliveries) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(rider.id)
    .bind(rider.user_id)
    .bind(rider.online)
    .bind(rider.lat)
    .bind(rider.lng)
    .bind(&rider.vehicle)
    .bind(rider.deliveries)
    .execute(pool)
    .await?;

    Ok(rider)
}

pub async fn get_rider(pool: &SqlitePool, id: Uuid) -> Result<Rider, AppError> {
    sqlx::query_as::<_, Rider>(
        "SELECT id, user_id, online, lat, lng, vehicle, deliveries FROM riders WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("rider"))
}

pub async fn set_rider_presence(
    pool: &SqlitePool,
    id: Uuid,
    online: bool,
) -> Result<(), AppError> {
    let affected = sqlx::query("UPDATE riders SET online = ? WHERE id = ?")
        .bind(online)
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("rider"));
    }

    Ok(())
}

pub async fn set_rider_location(
    pool: &SqlitePool,
    id: Uuid,
    lat: f64,
    lng: f64,
) -> Result<(), AppError> {
    let affected = sqlx::query("UPDATE riders SET lat = ?, lng = ? WHERE id = ?")
        .bind(lat)
        .bind(lng)
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("rider"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i64,
}

pub struct NewOrder {
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub kind: OrderKind,
    pub fulfillment: Fulfillment,
    pub items: Vec<NewOrderItem>,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

/// Create a `pending` order. Unit prices are captured from the product rows
/// at this moment and never re-read; the totals are fixed for the life of
/// the order.
pub async fn create_order(pool: &SqlitePool, new: NewOrder) -> Result<Order, AppError> {
    let provider = get_provider(pool, new.provider_id).await?;

    let mut items = Vec::with_capacity(new.items.len());
    let mut subtotal_cents: i64 = 0;

    for line in &new.items {
        let product = get_product(pool, line.product_id).await?;
        // quantities come from the wire; a wrapped subtotal would break the
        // total = subtotal + fees invariant for the life of the order
        let line_total = product
            .price_cents
            .checked_mul(line.quantity)
            .ok_or(AppError::MalformedPayload)?;
        subtotal_cents = subtotal_cents
            .checked_add(line_total)
            .ok_or(AppError::MalformedPayload)?;
        items.push(OrderItem {
            order_id: Uuid::nil(),
            product_id: product.id,
            name: product.name,
            quantity: line.quantity,
            unit_price_cents: product.price_cents,
        });
    }

    let delivery_fee_cents = match new.fulfillment {
        Fulfillment::Rider => utils::delivery_fee_cents(utils::distance_km(
            provider.lat,
            provider.lng,
            new.lat,
            new.lng,
        )),
        Fulfillment::SelfFulfilled => 0,
    };

    let total_cents = subtotal_cents
        .checked_add(utils::PLATFORM_FEE_CENTS)
        .and_then(|t| t.checked_add(delivery_fee_cents))
        .ok_or(AppError::MalformedPayload)?;

    let order = Order {
        id: Uuid::new_v4(),
        customer_id: new.customer_id,
        provider_id: new.provider_id,
        kind: new.kind,
        fulfillment: new.fulfillment,
        status: OrderStatus::Pending,
        rider_id: None,
        otp: None,
        subtotal_cents,
        platform_fee_cents: utils::PLATFORM_FEE_CENTS,
        delivery_fee_cents,
        total_cents,
        address: new.address,
        lat: new.lat,
        lng: new.lng,
        created_at: Utc::now(),
        delivered_at: None,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO orders (id, customer_id, provider_id, kind, fulfillment, status, rider_id, \
         otp, subtotal_cents, platform_fee_cents, delivery_fee_cents, total_cents, address, lat, \
         lng, created_at, delivered_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(order.id)
    .bind(order.customer_id)
    .bind(order.provider_id)
    .bind(order.kind)
    .bind(order.fulfillment)
    .bind(order.status)
    .bind(order.rider_id)
    .bind(&order.otp)
    .bind(order.subtotal_cents)
    .bind(order.platform_fee_cents)
    .bind(order.delivery_fee_cents)
    .bind(order.total_cents)
    .bind(&order.address)
    .bind(order.lat)
    .bind(order.lng)
    .bind(order.created_at)
    .bind(order.delivered_at)
    .execute(&mut *tx)
    .await?;

    for item in &items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, name, quantity, unit_price_cents) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order.id)
        .bind(item.product_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("INSERT INTO order_events (order_id, status, recorded_at) VALUES (?, ?, ?)")
        .bind(order.id)
        .bind(order.status)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(order)
}

pub async fn get_order(pool: &SqlitePool, id: Uuid) -> Result<Order, AppError> {
    sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("order"))
}

pub async fn get_order_items(pool: &SqlitePool, order_id: Uuid) -> Result<Vec<OrderItem>, AppError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT order_id, product_id, name, quantity, unit_price_cents FROM order_items \
         WHERE order_id = ?",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn get_order_events(
    pool: &SqlitePool,
    order_id: Uuid,
) -> Result<Vec<OrderEvent>, AppError> {
    let events = sqlx::query_as::<_, OrderEvent>(
        "SELECT order_id, status, recorded_at FROM order_events WHERE order_id = ? \
         ORDER BY recorded_at",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(events)
}

/// CAS status change: applies only if the order is still in `from`.
/// Returns whether this caller won the write.
pub async fn transition_order(
    pool: &SqlitePool,
    id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let affected = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if affected == 1 {
        sqlx::query("INSERT INTO order_events (order_id, status, recorded_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(to)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(affected == 1)
}

/// Rider claim. The rider column is part of the condition, so of any number
/// of concurrent claims exactly one sets it.
pub async fn claim_order(pool: &SqlitePool, id: Uuid, rider_id: Uuid) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let affected = sqlx::query(
        "UPDATE orders SET status = ?, rider_id = ? \
         WHERE id = ? AND status = ? AND rider_id IS NULL",
    )
    .bind(OrderStatus::Assigned)
    .bind(rider_id)
    .bind(id)
    .bind(OrderStatus::ReadyForPickup)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 1 {
        sqlx::query("INSERT INTO order_events (order_id, status, recorded_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(OrderStatus::Assigned)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(affected == 1)
}

/// Rider-gated CAS: like [`transition_order`] but only for the assigned rider.
pub async fn transition_order_by_rider(
    pool: &SqlitePool,
    id: Uuid,
    rider_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let affected =
        sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ? AND rider_id = ?")
            .bind(to)
            .bind(id)
            .bind(from)
            .bind(rider_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

    if affected == 1 {
        sqlx::query("INSERT INTO order_events (order_id, status, recorded_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(to)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(affected == 1)
}

/// Pickup: moves to `out_for_delivery` and stores the handoff code. The CAS
/// on `arrived_at_pickup` means the code is written exactly once.
pub async fn set_picked_up(
    pool: &SqlitePool,
    id: Uuid,
    rider_id: Uuid,
    otp: &str,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let affected = sqlx::query(
        "UPDATE orders SET status = ?, otp = ? WHERE id = ? AND status = ? AND rider_id = ?",
    )
    .bind(OrderStatus::OutForDelivery)
    .bind(otp)
    .bind(id)
    .bind(OrderStatus::ArrivedAtPickup)
    .bind(rider_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 1 {
        sqlx::query("INSERT INTO order_events (order_id, status, recorded_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(OrderStatus::OutForDelivery)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(affected == 1)
}

/// Final handoff: the stored code is part of the condition, so the same
/// transaction that checks it also consumes it. Increments the rider's
/// delivery count on success.
pub async fn complete_delivery(
    pool: &SqlitePool,
    id: Uuid,
    rider_id: Uuid,
    otp: &str,
) -> Result<bool, AppError> {
    let delivered_at = Utc::now();
    let mut tx = pool.begin().await?;

    let affected = sqlx::query(
        "UPDATE orders SET status = ?, delivered_at = ? \
         WHERE id = ? AND status = ? AND rider_id = ? AND otp = ?",
    )
    .bind(OrderStatus::Delivered)
    .bind(delivered_at)
    .bind(id)
    .bind(OrderStatus::OutForDelivery)
    .bind(rider_id)
    .bind(otp)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 1 {
        sqlx::query("INSERT INTO order_events (order_id, status, recorded_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(OrderStatus::Delivered)
            .bind(delivered_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE riders SET deliveries = deliveries + 1 WHERE id = ?")
            .bind(rider_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(affected == 1)
}

/// Unclaimed pickup-ready orders across all kinds. Claimed orders never show
/// up here because the claim CAS sets the rider column in the same write.
/// `near` scopes the list to pickups within a radius of a position; the
/// distance check runs in Rust against the provider coordinates, like the
/// provider geo filter above.
pub async fn available_orders(
    pool: &SqlitePool,
    near: Option<(f64, f64, f64)>,
) -> Result<Vec<Order>, AppError> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE status = ? AND rider_id IS NULL AND fulfillment = ? ORDER BY created_at"
    ))
    .bind(OrderStatus::ReadyForPickup)
    .bind(Fulfillment::Rider)
    .fetch_all(pool)
    .await?;

    let Some((lat, lng, radius_km)) = near else {
        return Ok(orders);
    };

    let mut in_range = Vec::with_capacity(orders.len());
    for order in orders {
        let provider = get_provider(pool, order.provider_id).await?;
        if utils::distance_km(lat, lng, provider.lat, provider.lng) <= radius_km {
            in_range.push(order);
        }
    }

    Ok(in_range)
}

pub async fn rider_active_orders(
    pool: &SqlitePool,
    rider_id: Uuid,
) -> Result<Vec<Order>, AppError> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE rider_id = ? AND status NOT IN (?, ?, ?) ORDER BY created_at"
    ))
    .bind(rider_id)
    .bind(OrderStatus::Delivered)
    .bind(OrderStatus::Declined)
    .bind(OrderStatus::Cancelled)
    .fetch_all(pool)
    .await?;

    Ok(orders)
}

pub async fn rider_order_history(
    pool: &SqlitePool,
    rider_id: Uuid,
) -> Result<Vec<Order>, AppError> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE rider_id = ? AND status IN (?, ?, ?) ORDER BY created_at DESC"
    ))
    .bind(rider_id)
    .bind(OrderStatus::Delivered)
    .bind(OrderStatus::Declined)
    .bind(OrderStatus::Cancelled)
    .fetch_all(pool)
    .await?;

    Ok(orders)
}

// ---------------------------------------------------------------------------
// Bookings and invoices
// ---------------------------------------------------------------------------

pub struct NewBooking {
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub service: String,
    pub scheduled_for: chrono::DateTime<Utc>,
    pub address: String,
    pub phone: String,
    pub notes: Option<String>,
}

pub async fn create_booking(pool: &SqlitePool, new: NewBooking) -> Result<Booking, AppError> {
    let booking = Booking {
        id: Uuid::new_v4(),
        customer_id: new.customer_id,
        provider_id: new.provider_id,
        service: new.service,
        status: BookingStatus::Pending,
        otp: None,
        scheduled_for: new.scheduled_for,
        address: new.address,
        phone: new.phone,
        notes: new.notes,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO bookings (id, customer_id, provider_id, service, status, otp, scheduled_for, \
         address, phone, notes, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(booking.id)
    .bind(booking.customer_id)
    .bind(booking.provider_id)
    .bind(&booking.service)
    .bind(booking.status)
    .bind(&booking.otp)
    .bind(booking.scheduled_for)
    .bind(&booking.address)
    .bind(&booking.phone)
    .bind(&booking.notes)
    .bind(booking.created_at)
    .execute(pool)
    .await?;

    Ok(booking)
}

pub async fn get_booking(pool: &SqlitePool, id: Uuid) -> Result<Booking, AppError> {
    sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("booking"))
}

pub async fn transition_booking(
    pool: &SqlitePool,
    id: Uuid,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<bool, AppError> {
    let affected = sqlx::query("UPDATE bookings SET status = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected == 1)
}

/// `in_progress -> awaiting_otp`, storing the completion code in the same
/// conditional write.
pub async fn set_booking_otp(pool: &SqlitePool, id: Uuid, otp: &str) -> Result<bool, AppError> {
    let affected =
        sqlx::query("UPDATE bookings SET status = ?, otp = ? WHERE id = ? AND status = ?")
            .bind(BookingStatus::AwaitingOtp)
            .bind(otp)
            .bind(id)
            .bind(BookingStatus::InProgress)
            .execute(pool)
            .await?
            .rows_affected();

    Ok(affected == 1)
}

/// Invoice creation and the booking's move to `pending_payment` commit
/// together or not at all.
pub async fn create_invoice(
    pool: &SqlitePool,
    booking_id: Uuid,
    service_charge_cents: i64,
    spare_parts: Vec<SparePart>,
) -> Result<Invoice, AppError> {
    let parts_total: i64 = spare_parts.iter().map(|p| p.cost_cents).sum();

    let invoice = Invoice {
        id: Uuid::new_v4(),
        booking_id,
        service_charge_cents,
        total_cents: service_charge_cents + parts_total,
        spare_parts: Json(spare_parts),
        payment_status: PaymentStatus::Pending,
        gateway_order_id: None,
        payment_id: None,
        created_at: Utc::now(),
    };

    let mut tx = pool.begin().await?;

    let affected = sqlx::query("UPDATE bookings SET status = ? WHERE id = ? AND status = ?")
        .bind(BookingStatus::PendingPayment)
        .bind(booking_id)
        .bind(BookingStatus::AwaitingBilling)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if affected == 0 {
        tx.rollback().await?;
        return Err(AppError::InvalidTransition);
    }

    sqlx::query(
        "INSERT INTO invoices (id, booking_id, service_charge_cents, spare_parts, total_cents, \
         payment_status, gateway_order_id, payment_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(invoice.id)
    .bind(invoice.booking_id)
    .bind(invoice.service_charge_cents)
    .bind(&invoice.spare_parts)
    .bind(invoice.total_cents)
    .bind(invoice.payment_status)
    .bind(&invoice.gateway_order_id)
    .bind(&invoice.payment_id)
    .bind(invoice.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(invoice)
}

pub async fn get_invoice(pool: &SqlitePool, id: Uuid) -> Result<Invoice, AppError> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("invoice"))
}

pub async fn get_invoice_by_gateway_order(
    pool: &SqlitePool,
    gateway_order_id: &str,
) -> Result<Invoice, AppError> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE gateway_order_id = ?"
    ))
    .bind(gateway_order_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("invoice"))
}

pub async fn set_invoice_gateway_order(
    pool: &SqlitePool,
    id: Uuid,
    gateway_order_id: &str,
) -> Result<(), AppError> {
    let affected = sqlx::query("UPDATE invoices SET gateway_order_id = ? WHERE id = ?")
        .bind(gateway_order_id)
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("invoice"));
    }

    Ok(())
}

/// Mark the invoice paid and complete its booking in one transaction.
/// Returns `false` without touching anything when the invoice was already
/// paid, which is what makes the verification callback safely re-deliverable.
pub async fn mark_invoice_paid(
    pool: &SqlitePool,
    id: Uuid,
    payment_id: &str,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let affected = sqlx::query(
        "UPDATE invoices SET payment_status = ?, payment_id = ? \
         WHERE id = ? AND payment_status = ?",
    )
    .bind(PaymentStatus::Paid)
    .bind(payment_id)
    .bind(id)
    .bind(PaymentStatus::Pending)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 1 {
        sqlx::query(
            "UPDATE bookings SET status = ? \
             WHERE id = (SELECT booking_id FROM invoices WHERE id = ?) AND status = ?",
        )
        .bind(BookingStatus::Completed)
        .bind(id)
        .bind(BookingStatus::PendingPayment)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(affected == 1)
}
