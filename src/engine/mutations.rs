use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::pricing::validate_pricing;

use super::status::status_with;
use super::txn::Commit;
use super::{Caller, Engine, EngineError, WalCommand};

/// Everything needed to register a spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotSpec {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub kind: SpotKind,
    pub pricing: Pricing,
    pub location: GeoPoint,
}

/// What a member purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub spots_removed: usize,
    pub rents_removed: usize,
}

fn check_pricing(pricing: &Pricing) -> Result<(), EngineError> {
    validate_pricing(pricing)?;
    let rates = [pricing.price_per_half_hour, pricing.daily_max_price, pricing.monthly_price];
    if rates.iter().any(|r| *r < 0) {
        return Err(EngineError::InvalidPricing("rates may not be negative".into()));
    }
    if rates.iter().any(|r| *r > MAX_RATE) {
        return Err(EngineError::LimitExceeded("rate too large"));
    }
    Ok(())
}

impl Engine {
    pub async fn register_spot(&self, spec: SpotSpec) -> Result<(), EngineError> {
        check_pricing(&spec.pricing)?;
        if !spec.location.is_valid() {
            return Err(EngineError::InvalidInput("location out of range"));
        }
        if self.spots.len() >= MAX_SPOTS {
            return Err(EngineError::LimitExceeded("too many spots"));
        }

        // Claim the id with the new spot already write-locked, so nothing can
        // act on it before its registration is durable.
        let ss = Arc::new(RwLock::new(SpotState::new(
            spec.id,
            spec.owner_id,
            spec.kind,
            spec.pricing,
            spec.location,
        )));
        let guard = ss.clone().try_write_owned().map_err(|_| EngineError::Internal)?;
        match self.spots.entry(spec.id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(spec.id)),
            Entry::Vacant(slot) => {
                slot.insert(ss);
            }
        }

        let event = Event::SpotRegistered {
            id: spec.id,
            owner_id: spec.owner_id,
            kind: spec.kind,
            pricing: spec.pricing,
            location: spec.location,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.spots.remove(&spec.id);
            return Err(e);
        }
        drop(guard);
        tracing::info!(spot_id = %spec.id, owner_id = %spec.owner_id, "spot registered");
        Ok(())
    }

    /// Replace a spot's rates. Open rents are billed at the rates in force when they settle.
    pub async fn update_spot_pricing(
        &self,
        spot_id: Ulid,
        caller: Caller,
        pricing: Pricing,
    ) -> Result<(), EngineError> {
        check_pricing(&pricing)?;
        self.transact(spot_id, move |ss, _now| {
            if !caller.acts_for(ss.owner_id) {
                return Err(EngineError::Forbidden);
            }
            Ok(Commit::new(Event::SpotPricingUpdated { id: spot_id, pricing }, ()))
        })
        .await
    }

    /// Remove a spot that has no open rents left.
    pub async fn delete_spot(&self, spot_id: Ulid, caller: Caller) -> Result<(), EngineError> {
        self.transact(spot_id, move |ss, _now| {
            if !caller.acts_for(ss.owner_id) {
                return Err(EngineError::Forbidden);
            }
            if ss.open_rents().next().is_some() {
                return Err(EngineError::SpotInUse(spot_id));
            }
            Ok(Commit::new(Event::SpotDeleted { id: spot_id }, ()))
        })
        .await?;
        tracing::info!(%spot_id, "spot deleted");
        Ok(())
    }

    /// Administrative cascade for a removed member: drops the spots they own
    /// and every rent they hold, physically. Admin only.
    pub async fn purge_member(&self, caller: Caller, member_id: Ulid) -> Result<PurgeSummary, EngineError> {
        if !caller.is_admin() {
            return Err(EngineError::Forbidden);
        }

        // Write locks in sorted order to prevent deadlocks.
        let mut spot_ids: Vec<Ulid> = self.spots.iter().map(|e| *e.key()).collect();
        spot_ids.sort();
        let mut guards = Vec::with_capacity(spot_ids.len());
        for id in &spot_ids {
            if let Some(ss) = self.get_spot_state(id) {
                guards.push(ss.write_owned().await);
            }
        }
        guards.retain(|g| self.spots.contains_key(&g.id));

        let now = self.now_ms();
        let mut summary = PurgeSummary::default();
        let mut spot_statuses = Vec::new();
        for guard in &guards {
            if guard.owner_id == member_id {
                summary.spots_removed += 1;
                summary.rents_removed += guard.rents.len();
                continue;
            }
            let held = guard.rents.iter().filter(|r| r.renter_id == member_id).count();
            if held > 0 {
                summary.rents_removed += held;
                let kept = guard.rents.iter().filter(|r| r.renter_id != member_id);
                spot_statuses.push((guard.id, status_with(guard, &self.config, now, kept)));
            }
        }
        if summary == PurgeSummary::default() {
            return Ok(summary);
        }

        let event = Event::MemberPurged {
            member_id,
            spot_statuses: spot_statuses.clone(),
        };
        self.wal_append(&event).await?;
        self.apply_member_purge(member_id, &spot_statuses, &mut guards);
        tracing::info!(
            %member_id,
            spots = summary.spots_removed,
            rents = summary.rents_removed,
            "member purged"
        );
        Ok(summary)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    /// Read locks on every spot are held until the new log is in place.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut spot_ids: Vec<Ulid> = self.spots.iter().map(|e| *e.key()).collect();
        spot_ids.sort();
        let mut guards = Vec::with_capacity(spot_ids.len());
        for id in &spot_ids {
            if let Some(ss) = self.get_spot_state(id) {
                guards.push(ss.read_owned().await);
            }
        }

        let mut events = Vec::new();
        for guard in &guards {
            if !self.spots.contains_key(&guard.id) {
                continue;
            }
            events.push(Event::SpotRegistered {
                id: guard.id,
                owner_id: guard.owner_id,
                kind: guard.kind,
                pricing: guard.pricing,
                location: guard.location,
            });
            for (date, is_available) in &guard.calendar {
                events.push(Event::DayOffered {
                    spot_id: guard.id,
                    date: *date,
                    is_available: *is_available,
                    spot_status: guard.status,
                });
            }
            // Rents are written in their final state.
            for rent in &guard.rents {
                events.push(Event::RentCreated {
                    rent: rent.clone(),
                    spot_status: guard.status,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()));
        drop(guards);
        result
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
