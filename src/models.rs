//! # Entities
//!
//! Row types and the closed status enums.
//!
//! Statuses are TEXT in SQLite but never free-form strings in Rust: every
//! status column round-trips through one of the enums below, and the only
//! way to move between statuses is the successor tables here. Route handlers
//! hold no transition knowledge of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Provider,
    Rider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OrderKind {
    Grocery,
    Restaurant,
    StreetFood,
}

/// How the order reaches the customer. Rider orders walk the full delivery
/// chain; self-fulfilled orders are handed over by the provider directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Fulfillment {
    Rider,
    SelfFulfilled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    ReadyForPickup,
    Assigned,
    ArrivedAtPickup,
    OutForDelivery,
    Confirmed,
    Delivered,
    Declined,
    Cancelled,
}

impl OrderStatus {
    /// The single legal next status for the given fulfillment mode, or `None`
    /// for terminal states.
    pub fn successor(self, fulfillment: Fulfillment) -> Option<OrderStatus> {
        use OrderStatus::*;

        match fulfillment {
            Fulfillment::Rider => match self {
                Pending => Some(Accepted),
                Accepted => Some(Preparing),
                Preparing => Some(ReadyForPickup),
                ReadyForPickup => Some(Assigned),
                Assigned => Some(ArrivedAtPickup),
                ArrivedAtPickup => Some(OutForDelivery),
                OutForDelivery => Some(Delivered),
                Confirmed | Delivered | Declined | Cancelled => None,
            },
            Fulfillment::SelfFulfilled => match self {
                Pending => Some(Confirmed),
                Confirmed => Some(Delivered),
                _ => None,
            },
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Declined | OrderStatus::Cancelled
        )
    }

    /// Whether a terminal decline/cancel is still allowed. Once the rider is
    /// out for delivery the order can only end in `delivered`.
    pub fn can_fail(self) -> bool {
        use OrderStatus::*;

        matches!(
            self,
            Pending | Accepted | Preparing | ReadyForPickup | Assigned | ArrivedAtPickup | Confirmed
        )
    }

    /// Statuses owned by the rider endpoints. `advance_status` rejects them
    /// so claims, pickups and handoffs always go through the OTP/CAS paths.
    pub fn is_rider_owned(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::ArrivedAtPickup | OrderStatus::OutForDelivery
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    InProgress,
    AwaitingOtp,
    AwaitingBilling,
    PendingPayment,
    Completed,
    Declined,
    Cancelled,
}

impl BookingStatus {
    pub fn successor(self) -> Option<BookingStatus> {
        use BookingStatus::*;

        match self {
            Pending => Some(Accepted),
            Accepted => Some(InProgress),
            InProgress => Some(AwaitingOtp),
            AwaitingOtp => Some(AwaitingBilling),
            AwaitingBilling => Some(PendingPayment),
            PendingPayment => Some(Completed),
            Completed | Declined | Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Declined | BookingStatus::Cancelled
        )
    }

    /// Decline/cancel window: only before work starts.
    pub fn can_fail(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Provider {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub open: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub kind: OrderKind,
    pub fulfillment: Fulfillment,
    pub status: OrderStatus,
    pub rider_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub otp: Option<String>,
    pub subtotal_cents: i64,
    pub platform_fee_cents: i64,
    pub delivery_fee_cents: i64,
    pub total_cents: i64,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub service: String,
    pub status: BookingStatus,
    #[serde(skip_serializing)]
    pub otp: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub address: String,
    pub phone: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SparePart {
    pub part: String,
    pub cost_cents: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub service_charge_cents: i64,
    pub spare_parts: Json<Vec<SparePart>>,
    pub total_cents: i64,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Rider {
    pub id: Uuid,
    pub user_id: Uuid,
    pub online: bool,
    pub lat: f64,
    pub lng: f64,
    pub vehicle: String,
    pub deliveries: i64,
}
