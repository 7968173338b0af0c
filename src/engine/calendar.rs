use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_CALENDAR_DAYS_PER_SPOT;
use crate::model::*;

use super::status::derive_spot_status;
use super::txn::Commit;
use super::{Caller, Engine, EngineError};

impl Engine {
    /// True iff the spot has a calendar row for `date` marked available.
    pub async fn is_offered_on(&self, spot_id: Ulid, date: NaiveDate) -> Result<bool, EngineError> {
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let guard = ss.read().await;
        Ok(guard.is_offered_on(date))
    }

    /// Upsert the offer flag for one date. Only the owner (or an admin) may.
    pub async fn set_available_day(
        &self,
        spot_id: Ulid,
        caller: Caller,
        date: NaiveDate,
        is_available: bool,
    ) -> Result<(), EngineError> {
        let config = self.config;
        self.transact(spot_id, move |ss, now| {
            if !caller.acts_for(ss.owner_id) {
                return Err(EngineError::Forbidden);
            }
            if !ss.calendar.contains_key(&date) && ss.calendar.len() >= MAX_CALENDAR_DAYS_PER_SPOT {
                return Err(EngineError::LimitExceeded("too many calendar days on spot"));
            }
            let today = config.local_date(now);
            let today_offered = if date == today {
                is_available
            } else {
                ss.is_offered_on(today)
            };
            let spot_status = derive_spot_status(&ss.rents, today_offered, now);
            let event = Event::DayOffered {
                spot_id,
                date,
                is_available,
                spot_status,
            };
            Ok(Commit::new(event, ()))
        })
        .await?;
        tracing::debug!(%spot_id, %date, is_available, "calendar day set");
        Ok(())
    }

    /// Every calendar row of the spot in date order.
    pub async fn calendar(&self, spot_id: Ulid) -> Result<Vec<AvailableDay>, EngineError> {
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let guard = ss.read().await;
        Ok(guard
            .calendar
            .iter()
            .map(|(date, is_available)| AvailableDay {
                spot_id,
                date: *date,
                is_available: *is_available,
            })
            .collect())
    }
}
