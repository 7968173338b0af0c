use ulid::Ulid;

use crate::model::*;
use crate::pricing::{price, Usage};

use super::availability::free_windows;
use super::conflict::{validate_query_window, validate_window};
use super::status::current_status;
use super::{Engine, EngineError};

fn spot_info(ss: &SpotState, status: SpotStatus) -> SpotInfo {
    SpotInfo {
        id: ss.id,
        owner_id: ss.owner_id,
        kind: ss.kind,
        pricing: ss.pricing,
        location: ss.location,
        status,
    }
}

impl Engine {
    /// Spot details with the status re-derived at the current time.
    pub async fn get_spot(&self, spot_id: Ulid) -> Result<SpotInfo, EngineError> {
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let guard = ss.read().await;
        let status = current_status(&guard, &self.config, self.now_ms());
        Ok(spot_info(&guard, status))
    }

    /// All spots, optionally only those of one owner, ordered by id.
    pub async fn list_spots(&self, owner_id: Option<Ulid>) -> Vec<SpotInfo> {
        let spots: Vec<_> = self.spots.iter().map(|e| e.value().clone()).collect();
        let now = self.now_ms();
        let mut out = Vec::new();
        for ss in spots {
            let guard = ss.read().await;
            if owner_id.is_some_and(|o| o != guard.owner_id) {
                continue;
            }
            out.push(spot_info(&guard, current_status(&guard, &self.config, now)));
        }
        out.sort_by_key(|s| s.id);
        out
    }

    pub async fn rent(&self, rent_id: Ulid) -> Result<Rent, EngineError> {
        let spot_id = self
            .get_spot_for_rent(&rent_id)
            .ok_or(EngineError::NotFound(rent_id))?;
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(rent_id))?;
        let guard = ss.read().await;
        guard.rent(rent_id).cloned().ok_or(EngineError::NotFound(rent_id))
    }

    /// Every rent of a spot, terminal ones included, by start time.
    pub async fn rents_for_spot(&self, spot_id: Ulid) -> Result<Vec<Rent>, EngineError> {
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let guard = ss.read().await;
        Ok(guard.rents.clone())
    }

    /// Every rent held by a renter across all spots, by start time. Unknown renters get an empty list.
    pub async fn rents_for_renter(&self, renter_id: Ulid) -> Vec<Rent> {
        self.collect_rents(|r| r.renter_id == renter_id).await
    }

    /// Rents with no actual end that are not terminal.
    pub async fn open_rents(&self) -> Vec<Rent> {
        self.collect_rents(Rent::is_open).await
    }

    async fn collect_rents(&self, keep: impl Fn(&Rent) -> bool) -> Vec<Rent> {
        let spots: Vec<_> = self.spots.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for ss in spots {
            let guard = ss.read().await;
            out.extend(guard.rents.iter().filter(|r| keep(*r)).cloned());
        }
        out.sort_by_key(|r| (r.span.start, r.id));
        out
    }

    /// Bookable windows of a spot inside `[start, end)`.
    pub async fn free_windows(&self, spot_id: Ulid, start: Ms, end: Ms) -> Result<Vec<Span>, EngineError> {
        let query = validate_query_window(start, end)?;
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let guard = ss.read().await;
        Ok(free_windows(&guard, &self.config, &query))
    }

    /// Price preview for parking on the spot over `[start, end)`. Mutates nothing.
    pub async fn quote(&self, spot_id: Ulid, start: Ms, end: Ms) -> Result<Money, EngineError> {
        let span = validate_window(start, end)?;
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let guard = ss.read().await;
        let usage = Usage {
            start: span.start,
            booked_end: span.end,
            end: span.end,
        };
        Ok(price(usage, &guard.pricing, &self.config.pricing)?)
    }
}
