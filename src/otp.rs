//! Handoff codes.
//!
//! A 6-digit numeric code generated once at pickup (or when a service visit
//! finishes) and compared by exact match at handoff. The stored code is only
//! ever shown on the owning customer's tracking page, never logged.

use rand::Rng;

pub const OTP_LEN: usize = 6;

pub fn generate() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);

    format!("{code:06}")
}

/// Exact match, leading zeros included.
pub fn matches(stored: &str, submitted: &str) -> bool {
    submitted.len() == OTP_LEN && stored == submitted
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_LEN && code.bytes().all(|b| b.is_ascii_digit())
}
