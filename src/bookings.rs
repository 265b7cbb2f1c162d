//! # Booking lifecycle and invoicing
//!
//! Service bookings walk `pending -> accepted -> in_progress -> awaiting_otp
//! -> awaiting_billing -> pending_payment -> completed`. The provider drives
//! the first half; the customer's completion code closes the visit; billing
//! and the gateway callback drive the rest. Payment completion is the only
//! way into `completed`, and it is idempotent because gateways redeliver
//! their callbacks.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Booking, BookingStatus, Invoice, Role, SparePart},
    otp,
    payments::{GatewayOrder, PaymentGateway, SignatureVerifier},
    repository,
};

/// Provider/customer-driven booking status change. The owning provider
/// accepts, declines, starts work and requests the completion code; only
/// the owning customer cancels. Entering `awaiting_otp` generates the
/// completion code, returned alongside the booking so the handler can show
/// it to the customer. `awaiting_billing` (OTP check), `pending_payment`
/// (invoice creation) and `completed` (payment callback) have dedicated
/// operations and are rejected here.
pub async fn advance_status(
    pool: &SqlitePool,
    booking_id: Uuid,
    target: BookingStatus,
    role: Role,
    actor_id: Uuid,
) -> Result<(Booking, Option<String>), AppError> {
    let booking = repository::get_booking(pool, booking_id).await?;

    let authorized = match target {
        BookingStatus::Cancelled => role == Role::Customer && actor_id == booking.customer_id,
        _ => role == Role::Provider && actor_id == booking.provider_id,
    };
    if !authorized {
        return Err(AppError::NotEligible);
    }

    match target {
        BookingStatus::Declined | BookingStatus::Cancelled => {
            if !booking.status.can_fail() {
                return Err(AppError::InvalidTransition);
            }
            if !repository::transition_booking(pool, booking_id, booking.status, target).await? {
                return Err(AppError::InvalidTransition);
            }
        }
        BookingStatus::AwaitingOtp => {
            if booking.status.successor() != Some(target) {
                return Err(AppError::InvalidTransition);
            }

            let code = otp::generate();
            if !repository::set_booking_otp(pool, booking_id, &code).await? {
                return Err(AppError::InvalidTransition);
            }

            let booking = repository::get_booking(pool, booking_id).await?;
            return Ok((booking, Some(code)));
        }
        BookingStatus::Accepted | BookingStatus::InProgress => {
            if booking.status.successor() != Some(target) {
                return Err(AppError::InvalidTransition);
            }
            if !repository::transition_booking(pool, booking_id, booking.status, target).await? {
                return Err(AppError::InvalidTransition);
            }
        }
        _ => return Err(AppError::InvalidTransition),
    }

    let booking = repository::get_booking(pool, booking_id).await?;
    Ok((booking, None))
}

/// Customer's completion code, entered by the owning provider, closes the
/// visit and opens billing.
pub async fn verify_completion(
    pool: &SqlitePool,
    booking_id: Uuid,
    provider_id: Uuid,
    submitted: &str,
) -> Result<Booking, AppError> {
    let booking = repository::get_booking(pool, booking_id).await?;

    if booking.provider_id != provider_id {
        return Err(AppError::NotEligible);
    }
    if booking.status != BookingStatus::AwaitingOtp {
        return Err(AppError::InvalidTransition);
    }

    let stored = booking.otp.as_deref().ok_or(AppError::InvalidTransition)?;
    if !otp::matches(stored, submitted) {
        return Err(AppError::InvalidOtp);
    }

    if !repository::transition_booking(
        pool,
        booking_id,
        BookingStatus::AwaitingOtp,
        BookingStatus::AwaitingBilling,
    )
    .await?
    {
        return Err(AppError::InvalidTransition);
    }

    repository::get_booking(pool, booking_id).await
}

/// The owning provider bills the visit: service charge plus itemized spare
/// parts. Only legal at `awaiting_billing`; moves the booking to
/// `pending_payment` in the same transaction as the insert.
pub async fn create_invoice(
    pool: &SqlitePool,
    booking_id: Uuid,
    provider_id: Uuid,
    service_charge_cents: i64,
    spare_parts: Vec<SparePart>,
) -> Result<Invoice, AppError> {
    if service_charge_cents < 0 || spare_parts.iter().any(|p| p.cost_cents < 0) {
        return Err(AppError::MalformedPayload);
    }

    let booking = repository::get_booking(pool, booking_id).await?;
    if booking.provider_id != provider_id {
        return Err(AppError::NotEligible);
    }

    repository::create_invoice(pool, booking_id, service_charge_cents, spare_parts).await
}

/// Hand the invoice off to the payment gateway and remember its reference,
/// which the verification callback later keys on.
pub async fn create_payment_order(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    invoice_id: Uuid,
) -> Result<(Invoice, GatewayOrder), AppError> {
    let invoice = repository::get_invoice(pool, invoice_id).await?;

    if invoice.payment_status == crate::models::PaymentStatus::Paid {
        return Err(AppError::InvalidTransition);
    }

    let gateway_order = gateway
        .create_order(invoice.total_cents, &invoice.id.to_string())
        .await?;

    repository::set_invoice_gateway_order(pool, invoice_id, &gateway_order.id).await?;
    let invoice = repository::get_invoice(pool, invoice_id).await?;

    Ok((invoice, gateway_order))
}

/// Gateway verification callback. Rejects a bad signature outright; a valid
/// callback marks the invoice paid and completes the booking. Redelivered
/// callbacks for an already-paid invoice are a no-op, not an error.
pub async fn record_payment(
    pool: &SqlitePool,
    verifier: &SignatureVerifier,
    gateway_order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<Invoice, AppError> {
    let invoice = repository::get_invoice_by_gateway_order(pool, gateway_order_id).await?;

    if !verifier.verify(gateway_order_id, payment_id, signature) {
        return Err(AppError::InvalidSignature);
    }

    // false means a previous callback already completed this payment
    repository::mark_invoice_paid(pool, invoice.id, payment_id).await?;

    repository::get_invoice(pool, invoice.id).await
}
