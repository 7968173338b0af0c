use std::iter;

use ulid::Ulid;

use crate::limits::MAX_RENTS_PER_SPOT;
use crate::model::*;
use crate::observability::BOOKINGS_TOTAL;

use super::conflict::{active_occupant, find_conflict, validate_window};
use super::status::status_with;
use super::txn::Commit;
use super::{Caller, Engine, EngineError};

/// Immediate rental or reservation for a later window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingKind {
    Rental,
    Reservation,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingKind::Rental => "rental",
            BookingKind::Reservation => "reservation",
        }
    }

    fn initial_status(&self) -> RentStatus {
        match self {
            BookingKind::Rental => RentStatus::Pending,
            BookingKind::Reservation => RentStatus::Reserved,
        }
    }
}

impl Engine {
    /// Rent a spot. Vetoed while any other open rent on it has not reached its scheduled end.
    pub async fn book_rental(
        &self,
        id: Ulid,
        spot_id: Ulid,
        renter_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Rent, EngineError> {
        self.book(BookingKind::Rental, id, spot_id, renter_id, start, end).await
    }

    /// Reserve a spot. Same checks as a rental minus the occupancy veto.
    pub async fn book_reservation(
        &self,
        id: Ulid,
        spot_id: Ulid,
        renter_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Rent, EngineError> {
        self.book(BookingKind::Reservation, id, spot_id, renter_id, start, end).await
    }

    async fn book(
        &self,
        kind: BookingKind,
        id: Ulid,
        spot_id: Ulid,
        renter_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Rent, EngineError> {
        let result = self.try_book(kind, id, spot_id, renter_id, start, end).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics::counter!(BOOKINGS_TOTAL, "kind" => kind.as_str(), "outcome" => outcome).increment(1);
        if let Ok(rent) = &result {
            tracing::info!(
                rent_id = %rent.id,
                %spot_id,
                %renter_id,
                kind = kind.as_str(),
                start = rent.span.start,
                end = rent.span.end,
                "rent created"
            );
        }
        result
    }

    async fn try_book(
        &self,
        kind: BookingKind,
        id: Ulid,
        spot_id: Ulid,
        renter_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Rent, EngineError> {
        let span = validate_window(start, end)?;
        if self.rent_to_spot.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let config = self.config;

        self.transact(spot_id, move |ss, now| {
            if ss.rent(id).is_some() {
                return Err(EngineError::AlreadyExists(id));
            }
            if ss.rents.len() >= MAX_RENTS_PER_SPOT {
                return Err(EngineError::LimitExceeded("too many rents on spot"));
            }
            if ss.owner_id == renter_id {
                return Err(EngineError::SpotNotAvailable(spot_id));
            }
            let start_date = config.local_date(span.start);
            if start_date < config.local_date(now) {
                return Err(EngineError::DateNotAvailable(start_date));
            }
            if kind == BookingKind::Rental
                && let Some(occupant) = active_occupant(ss, now)
            {
                return Err(EngineError::ActiveRentConflict(occupant.id));
            }
            if let Some(other) = find_conflict(ss, &span) {
                return Err(EngineError::TimeOverlap(other.id));
            }
            if !ss.is_offered_on(start_date) {
                return Err(EngineError::DateNotAvailable(start_date));
            }

            let rent = Rent {
                id,
                spot_id,
                renter_id,
                span,
                actual_end: None,
                total_cost: 0,
                status: kind.initial_status(),
            };
            let spot_status = status_with(ss, &config, now, ss.rents.iter().chain(iter::once(&rent)));
            let event = Event::RentCreated {
                rent: rent.clone(),
                spot_status,
            };
            Ok(Commit::new(event, rent))
        })
        .await
    }

    /// Turn a reservation into an active rental once its window has begun.
    pub async fn confirm_reservation(&self, rent_id: Ulid) -> Result<(), EngineError> {
        let config = self.config;
        self.transact_rent(rent_id, None, move |ss, rent, now| {
            if rent.status != RentStatus::Reserved {
                return Err(EngineError::InvalidStatus {
                    id: rent_id,
                    status: rent.status,
                });
            }
            if now < rent.span.start {
                return Err(EngineError::NotStarted(rent_id));
            }
            let confirmed = Rent {
                status: RentStatus::Pending,
                ..rent.clone()
            };
            let others = ss.rents.iter().filter(|r| r.id != rent_id);
            let spot_status = status_with(ss, &config, now, others.chain(iter::once(&confirmed)));
            let event = Event::RentConfirmed {
                id: rent_id,
                spot_id: ss.id,
                spot_status,
            };
            Ok(Commit::new(event, ()))
        })
        .await?;
        tracing::info!(%rent_id, "reservation confirmed");
        Ok(())
    }

    /// Cancel an open rent. Allowed to the renter, the spot owner, or an admin.
    pub async fn cancel_rental(&self, rent_id: Ulid, caller: Caller) -> Result<(), EngineError> {
        let config = self.config;
        self.transact_rent(rent_id, None, move |ss, rent, now| {
            if rent.actual_end.is_some() || rent.status == RentStatus::Completed {
                return Err(EngineError::AlreadySettled(rent_id));
            }
            if !caller.acts_for(rent.renter_id) && !caller.acts_for(ss.owner_id) {
                return Err(EngineError::Forbidden);
            }
            if !matches!(rent.status, RentStatus::Pending | RentStatus::Reserved) {
                return Err(EngineError::InvalidStatus {
                    id: rent_id,
                    status: rent.status,
                });
            }
            let others = ss.rents.iter().filter(|r| r.id != rent_id);
            let spot_status = status_with(ss, &config, now, others);
            let event = Event::RentCanceled {
                id: rent_id,
                spot_id: ss.id,
                spot_status,
            };
            Ok(Commit::new(event, ()))
        })
        .await?;
        tracing::info!(%rent_id, ?caller, "rent canceled");
        Ok(())
    }
}
