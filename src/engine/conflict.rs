use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Validate a requested `[start, end)` window before any store access.
pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidTime("end must be after start"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_RENT_DURATION_MS {
        return Err(EngineError::LimitExceeded("rent window too long"));
    }
    Ok(Span::new(start, end))
}

/// Same bounds for read-only range queries, with the wider query limit.
pub(crate) fn validate_query_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidTime("end must be after start"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(Span::new(start, end))
}

/// First non-terminal rent whose window conflicts with `span`.
pub(crate) fn find_conflict<'a>(ss: &'a SpotState, span: &Span) -> Option<&'a Rent> {
    ss.conflicting(span).find(|r| !r.status.is_terminal())
}

/// First open rent whose scheduled end is after `now`, running or not yet
/// started. Its presence vetoes immediate rentals.
pub(crate) fn active_occupant(ss: &SpotState, now: Ms) -> Option<&Rent> {
    ss.rents.iter().find(|r| r.is_active_or_upcoming(now))
}

impl Engine {
    /// True iff `[start, end)` conflicts with a non-terminal rent of the spot.
    pub async fn has_conflict(&self, spot_id: Ulid, start: Ms, end: Ms) -> Result<bool, EngineError> {
        let span = validate_window(start, end)?;
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let guard = ss.read().await;
        Ok(find_conflict(&guard, &span).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Ms = 1_792_108_800_000;

    fn spot_with(rents: &[(Ms, Ms, RentStatus)]) -> SpotState {
        let mut ss = SpotState::new(
            Ulid::new(),
            Ulid::new(),
            SpotKind::Flat,
            Pricing {
                pricing_type: PricingType::Hourly,
                price_per_half_hour: 20,
                daily_max_price: 300,
                monthly_price: 0,
            },
            GeoPoint { lat: 0.0, lng: 0.0 },
        );
        for &(start, end, status) in rents {
            ss.insert_rent(Rent {
                id: Ulid::new(),
                spot_id: ss.id,
                renter_id: Ulid::new(),
                span: Span::new(start, end),
                actual_end: None,
                total_cost: 0,
                status,
            });
        }
        ss
    }

    #[test]
    fn window_validation() {
        assert!(matches!(validate_window(T0, T0), Err(EngineError::InvalidTime(_))));
        assert!(matches!(validate_window(T0 + 1, T0), Err(EngineError::InvalidTime(_))));
        assert!(matches!(validate_window(0, T0), Err(EngineError::LimitExceeded(_))));
        assert!(matches!(
            validate_window(T0, T0 + MAX_RENT_DURATION_MS + 1),
            Err(EngineError::LimitExceeded(_))
        ));
        assert_eq!(validate_window(T0, T0 + HOUR_MS).unwrap(), Span::new(T0, T0 + HOUR_MS));
    }

    #[test]
    fn overlap_examples() {
        let ss = spot_with(&[(T0 + 11 * HOUR_MS, T0 + 13 * HOUR_MS, RentStatus::Pending)]);
        let clash = Span::new(T0 + 10 * HOUR_MS, T0 + 12 * HOUR_MS);
        let clear = Span::new(T0 + 8 * HOUR_MS, T0 + 10 * HOUR_MS);
        assert!(find_conflict(&ss, &clash).is_some());
        assert!(find_conflict(&ss, &clear).is_none());
    }

    #[test]
    fn touching_end_conflicts() {
        let ss = spot_with(&[(T0 + 11 * HOUR_MS, T0 + 13 * HOUR_MS, RentStatus::Reserved)]);
        let touching = Span::new(T0 + 9 * HOUR_MS, T0 + 11 * HOUR_MS);
        assert!(find_conflict(&ss, &touching).is_some());
    }

    #[test]
    fn terminal_rents_do_not_conflict() {
        let ss = spot_with(&[
            (T0, T0 + HOUR_MS, RentStatus::Canceled),
            (T0, T0 + HOUR_MS, RentStatus::Completed),
        ]);
        assert!(find_conflict(&ss, &Span::new(T0, T0 + HOUR_MS)).is_none());
    }

    #[test]
    fn occupant_until_scheduled_end() {
        let ss = spot_with(&[(T0, T0 + HOUR_MS, RentStatus::Pending)]);
        assert!(active_occupant(&ss, T0 - DAY_MS).is_some());
        assert!(active_occupant(&ss, T0).is_some());
        assert!(active_occupant(&ss, T0 + HOUR_MS - 1).is_some());
        assert!(active_occupant(&ss, T0 + HOUR_MS).is_none());
    }

    #[test]
    fn closed_rents_never_occupy() {
        let mut ss = spot_with(&[
            (T0, T0 + HOUR_MS, RentStatus::Canceled),
            (T0, T0 + HOUR_MS, RentStatus::Completed),
        ]);
        assert!(active_occupant(&ss, T0).is_none());

        ss.insert_rent(Rent {
            id: Ulid::new(),
            spot_id: ss.id,
            renter_id: Ulid::new(),
            span: Span::new(T0 + DAY_MS, T0 + DAY_MS + HOUR_MS),
            actual_end: Some(T0 + DAY_MS + 10 * MINUTE_MS),
            total_cost: 20,
            status: RentStatus::Pending,
        });
        assert!(active_occupant(&ss, T0).is_none());
    }
}
