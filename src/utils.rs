use std::sync::LazyLock;

use regex::Regex;

/// Flat platform fee, currently waived.
pub const PLATFORM_FEE_CENTS: i64 = 0;

/// Delivery pricing: flat base within [`FREE_RADIUS_KM`], then per started km.
pub const DELIVERY_BASE_CENTS: i64 = 5000;
pub const DELIVERY_PER_KM_CENTS: i64 = 700;
pub const FREE_RADIUS_KM: f64 = 2.0;

/// How far from their last reported position a rider is offered pickups.
pub const OPERATING_RADIUS_KM: f64 = 10.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance between two coordinates, in km.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

pub fn delivery_fee_cents(distance_km: f64) -> i64 {
    let extra_km = (distance_km - FREE_RADIUS_KM).max(0.0).ceil() as i64;

    DELIVERY_BASE_CENTS + extra_km * DELIVERY_PER_KM_CENTS
}

static NON_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9- ]").unwrap());
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());

/// Normalize category and business names before storing or filtering:
/// underscores become spaces, anything outside alphanumerics/dash/space is
/// dropped, space runs collapse, and the result is lowercased.
pub fn normalize_name(input: &str) -> String {
    let spaced = input.replace('_', " ");
    let stripped = NON_NAME.replace_all(&spaced, "");
    let collapsed = SPACE_RUNS.replace_all(stripped.trim(), " ");

    collapsed.to_lowercase()
}
