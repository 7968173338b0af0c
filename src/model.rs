use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Amount in the smallest currency unit.
pub type Money = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HALF_HOUR_MS: Ms = 30 * MINUTE_MS;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Requested rental window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Booking conflict test. Inclusive on both ends: a window that ends
    /// exactly when another begins still conflicts with it.
    pub fn conflicts_with(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpotKind {
    Mechanical,
    Flat,
}

impl SpotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotKind::Mechanical => "mechanical",
            SpotKind::Flat => "flat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mechanical" => Some(SpotKind::Mechanical),
            "flat" => Some(SpotKind::Flat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingType {
    Hourly,
    Monthly,
}

impl PricingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingType::Hourly => "hourly",
            PricingType::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hourly" => Some(PricingType::Hourly),
            "monthly" => Some(PricingType::Monthly),
            _ => None,
        }
    }
}

/// Owner-declared rates. Only the rates relevant to `pricing_type` must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub pricing_type: PricingType,
    pub price_per_half_hour: Money,
    pub daily_max_price: Money,
    pub monthly_price: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpotStatus {
    Available,
    Occupied,
    Reserved,
}

impl SpotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotStatus::Available => "available",
            SpotStatus::Occupied => "occupied",
            SpotStatus::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentStatus {
    /// Granted and in effect (or starting later the same way an immediate rental does).
    Pending,
    /// Granted for a future window, waiting for confirmation at its start.
    Reserved,
    Canceled,
    Completed,
}

impl RentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RentStatus::Canceled | RentStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RentStatus::Pending => "pending",
            RentStatus::Reserved => "reserved",
            RentStatus::Canceled => "canceled",
            RentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rent {
    pub id: Ulid,
    pub spot_id: Ulid,
    pub renter_id: Ulid,
    pub span: Span,
    /// Set iff `status == Completed`.
    pub actual_end: Option<Ms>,
    pub total_cost: Money,
    pub status: RentStatus,
}

impl Rent {
    /// Not terminal and never settled.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal() && self.actual_end.is_none()
    }

    /// Open and scheduled to end after `now` (running now or starting later).
    pub fn is_active_or_upcoming(&self, now: Ms) -> bool {
        self.is_open() && self.span.end > now
    }

    /// Open and running at `now`.
    pub fn is_running(&self, now: Ms) -> bool {
        self.is_open() && self.span.contains_instant(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableDay {
    pub spot_id: Ulid,
    pub date: NaiveDate,
    pub is_available: bool,
}

/// A registered spot together with its offer calendar and every rent that references it.
#[derive(Debug, Clone)]
pub struct SpotState {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub kind: SpotKind,
    pub pricing: Pricing,
    pub location: GeoPoint,
    /// Status derived at the last write boundary. Reads re-derive it.
    pub status: SpotStatus,
    pub calendar: BTreeMap<NaiveDate, bool>,
    /// All rents of this spot, terminal ones included, sorted by `span.start`.
    pub rents: Vec<Rent>,
}

impl SpotState {
    pub fn new(id: Ulid, owner_id: Ulid, kind: SpotKind, pricing: Pricing, location: GeoPoint) -> Self {
        Self {
            id,
            owner_id,
            kind,
            pricing,
            location,
            status: SpotStatus::Occupied,
            calendar: BTreeMap::new(),
            rents: Vec::new(),
        }
    }

    /// True iff a calendar row exists for `date` and marks it available.
    pub fn is_offered_on(&self, date: NaiveDate) -> bool {
        self.calendar.get(&date).copied().unwrap_or(false)
    }

    /// Insert rent maintaining sort order by span.start.
    pub fn insert_rent(&mut self, rent: Rent) {
        let pos = self
            .rents
            .binary_search_by_key(&rent.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.rents.insert(pos, rent);
    }

    pub fn rent(&self, id: Ulid) -> Option<&Rent> {
        self.rents.iter().find(|r| r.id == id)
    }

    pub fn rent_mut(&mut self, id: Ulid) -> Option<&mut Rent> {
        self.rents.iter_mut().find(|r| r.id == id)
    }

    /// Return rents whose window conflicts with `query` (inclusive endpoints).
    /// Uses binary search to skip rents starting after `query.end`.
    pub fn conflicting(&self, query: &Span) -> impl Iterator<Item = &Rent> {
        let right_bound = self.rents.partition_point(|r| r.span.start <= query.end);
        self.rents[..right_bound]
            .iter()
            .filter(move |r| r.span.end >= query.start)
    }

    pub fn open_rents(&self) -> impl Iterator<Item = &Rent> {
        self.rents.iter().filter(|r| r.is_open())
    }
}

/// One event per committed transaction. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    SpotRegistered {
        id: Ulid,
        owner_id: Ulid,
        kind: SpotKind,
        pricing: Pricing,
        location: GeoPoint,
    },
    SpotPricingUpdated {
        id: Ulid,
        pricing: Pricing,
    },
    SpotDeleted {
        id: Ulid,
    },
    DayOffered {
        spot_id: Ulid,
        date: NaiveDate,
        is_available: bool,
        spot_status: SpotStatus,
    },
    RentCreated {
        rent: Rent,
        spot_status: SpotStatus,
    },
    RentConfirmed {
        id: Ulid,
        spot_id: Ulid,
        spot_status: SpotStatus,
    },
    RentCanceled {
        id: Ulid,
        spot_id: Ulid,
        spot_status: SpotStatus,
    },
    RentSettled {
        id: Ulid,
        spot_id: Ulid,
        actual_end: Ms,
        total_cost: Money,
        spot_status: SpotStatus,
    },
    /// Administrative cascade: drops the member's spots and every rent they hold.
    MemberPurged {
        member_id: Ulid,
        spot_statuses: Vec<(Ulid, SpotStatus)>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SpotInfo {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub kind: SpotKind,
    pub pricing: Pricing,
    pub location: GeoPoint,
    pub status: SpotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub rent_id: Ulid,
    pub total_cost: Money,
}
