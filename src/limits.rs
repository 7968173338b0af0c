use crate::model::{DAY_MS, Money, Ms};

/// 2000-01-01T00:00:00Z. Earlier timestamps are rejected as malformed input.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 9999-12-31T23:59:59.999Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Longest window a single rental or reservation may request.
pub const MAX_RENT_DURATION_MS: Ms = 2 * 366 * DAY_MS;
/// Widest window accepted by free-window and quote queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 400 * DAY_MS;

pub const MAX_SPOTS: usize = 100_000;
pub const MAX_RENTS_PER_SPOT: usize = 10_000;
pub const MAX_CALENDAR_DAYS_PER_SPOT: usize = 4_000;

/// Upper bound for any single configured rate.
pub const MAX_RATE: Money = 1_000_000_000;
