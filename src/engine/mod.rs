mod availability;
mod booking;
mod calendar;
mod conflict;
mod error;
mod mutations;
mod queries;
mod settlement;
mod status;
mod txn;

pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use booking::BookingKind;
pub use error::EngineError;
pub use mutations::{PurgeSummary, SpotSpec};
pub use settlement::BatchReport;
pub use status::derive_spot_status;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::model::*;
use crate::wal::Wal;

pub type SharedSpotState = Arc<RwLock<SpotState>>;

/// Who is asking. Authentication happens upstream; the engine only authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Admin,
    Member(Ulid),
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        matches!(self, Caller::Admin)
    }

    /// Admins act for everyone; members only for themselves.
    pub fn acts_for(&self, member_id: Ulid) -> bool {
        match self {
            Caller::Admin => true,
            Caller::Member(id) => *id == member_id,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a sync is in flight are buffered
/// together and made durable with one `flush_sync`. Compaction and counter
/// reads run only after the batch ahead of them has been committed.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut batch: Vec<PendingAppend> = Vec::new();
    while let Some(first) = rx.recv().await {
        let mut next = Some(first);
        while let Some(cmd) = next.take() {
            match cmd {
                WalCommand::Append { event, response } => {
                    batch.push((event, response));
                    next = rx.try_recv().ok();
                }
                WalCommand::Compact { events, response } => {
                    commit_batch(&mut wal, &mut batch);
                    let result = Wal::write_compact_file(wal.path(), &events)
                        .and_then(|()| wal.swap_compact_file());
                    let _ = response.send(result);
                }
                WalCommand::AppendsSinceCompact { response } => {
                    commit_batch(&mut wal, &mut batch);
                    let _ = response.send(wal.appends_since_compact());
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
    }
}

/// Buffer every pending event, sync once, and answer each sender with the outcome.
fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // Sync even after a failed append; the whole batch is reported failed.
    let synced = wal.flush_sync();
    let result = appended.and(synced);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let outcome = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(outcome);
    }
}

pub struct Engine {
    pub(super) spots: DashMap<Ulid, SharedSpotState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: rent id → spot id
    pub(super) rent_to_spot: DashMap<Ulid, Ulid>,
    pub(super) config: EngineConfig,
    pub(super) clock: Arc<dyn Clock>,
}

/// Apply a spot-scoped event directly to a SpotState (no locking; caller holds the lock).
fn apply_to_spot(ss: &mut SpotState, event: &Event, rent_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::SpotPricingUpdated { pricing, .. } => {
            ss.pricing = *pricing;
        }
        Event::DayOffered {
            date,
            is_available,
            spot_status,
            ..
        } => {
            ss.calendar.insert(*date, *is_available);
            ss.status = *spot_status;
        }
        Event::RentCreated { rent, spot_status } => {
            rent_index.insert(rent.id, rent.spot_id);
            ss.insert_rent(rent.clone());
            ss.status = *spot_status;
        }
        Event::RentConfirmed { id, spot_status, .. } => {
            if let Some(rent) = ss.rent_mut(*id) {
                rent.status = RentStatus::Pending;
            }
            ss.status = *spot_status;
        }
        Event::RentCanceled { id, spot_status, .. } => {
            if let Some(rent) = ss.rent_mut(*id) {
                rent.status = RentStatus::Canceled;
            }
            ss.status = *spot_status;
        }
        Event::RentSettled {
            id,
            actual_end,
            total_cost,
            spot_status,
            ..
        } => {
            if let Some(rent) = ss.rent_mut(*id) {
                rent.actual_end = Some(*actual_end);
                rent.total_cost = *total_cost;
                rent.status = RentStatus::Completed;
            }
            ss.status = *spot_status;
        }
        // Registry-level events are handled at the DashMap level, not here
        Event::SpotRegistered { .. } | Event::SpotDeleted { .. } | Event::MemberPurged { .. } => {}
    }
}

/// Drop every rent held by `member_id` from one spot and install the spot's new status.
fn purge_member_from_spot(
    ss: &mut SpotState,
    member_id: Ulid,
    status: Option<SpotStatus>,
    rent_index: &DashMap<Ulid, Ulid>,
) {
    ss.rents.retain(|r| {
        if r.renter_id == member_id {
            rent_index.remove(&r.id);
            false
        } else {
            true
        }
    });
    if let Some(status) = status {
        ss.status = status;
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, config: EngineConfig, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            spots: DashMap::new(),
            wal_tx,
            rent_to_spot: DashMap::new(),
            config,
            clock,
        };

        // Replay events. We're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::SpotRegistered { id, owner_id, kind, pricing, location } => {
                    let ss = SpotState::new(*id, *owner_id, *kind, *pricing, *location);
                    engine.spots.insert(*id, Arc::new(RwLock::new(ss)));
                }
                Event::SpotDeleted { id } => {
                    if let Some(ss) = engine.get_spot_state(id) {
                        let guard = ss.try_read().expect("replay: uncontended read");
                        engine.forget_spot(&guard);
                    }
                }
                Event::MemberPurged { member_id, spot_statuses } => {
                    let all: Vec<SharedSpotState> = engine.spots.iter().map(|e| e.value().clone()).collect();
                    let mut guards: Vec<_> = all
                        .into_iter()
                        .map(|ss| ss.try_write_owned().expect("replay: uncontended write"))
                        .collect();
                    engine.apply_member_purge(*member_id, spot_statuses, &mut guards);
                }
                other => {
                    if let Some(spot_id) = event_spot_id(other)
                        && let Some(entry) = engine.spots.get(&spot_id) {
                            let ss = entry.clone();
                            let mut guard = ss.try_write().expect("replay: uncontended write");
                            apply_to_spot(&mut guard, other, &engine.rent_to_spot);
                        }
                }
            }
        }

        tracing::info!(
            spots = engine.spots.len(),
            rents = engine.rent_to_spot.len(),
            events = events.len(),
            "engine state replayed"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_spot_state(&self, id: &Ulid) -> Option<SharedSpotState> {
        self.spots.get(id).map(|e| e.value().clone())
    }

    pub fn get_spot_for_rent(&self, rent_id: &Ulid) -> Option<Ulid> {
        self.rent_to_spot.get(rent_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call. Nothing is applied if the append fails.
    /// A new rent's id is claimed in the rent index before the append, so the
    /// same id cannot commit on two spots at once.
    pub(super) async fn persist_and_apply(
        &self,
        ss: &mut SpotState,
        event: &Event,
    ) -> Result<(), EngineError> {
        let claimed = match event {
            Event::RentCreated { rent, .. } => {
                self.claim_rent_id(rent.id, rent.spot_id)?;
                Some(rent.id)
            }
            _ => None,
        };
        if let Err(e) = self.wal_append(event).await {
            if let Some(id) = claimed {
                self.rent_to_spot.remove(&id);
            }
            return Err(e);
        }
        match event {
            Event::SpotDeleted { .. } => self.forget_spot(ss),
            _ => apply_to_spot(ss, event, &self.rent_to_spot),
        }
        Ok(())
    }

    fn claim_rent_id(&self, rent_id: Ulid, spot_id: Ulid) -> Result<(), EngineError> {
        match self.rent_to_spot.entry(rent_id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(rent_id)),
            Entry::Vacant(slot) => {
                slot.insert(spot_id);
                Ok(())
            }
        }
    }

    /// Remove a spot and its rents from the indexes. Caller holds the spot's lock.
    pub(super) fn forget_spot(&self, ss: &SpotState) {
        for rent in &ss.rents {
            self.rent_to_spot.remove(&rent.id);
        }
        self.spots.remove(&ss.id);
    }

    /// Apply a member purge across every spot. `guards` must cover all spots.
    pub(super) fn apply_member_purge(
        &self,
        member_id: Ulid,
        spot_statuses: &[(Ulid, SpotStatus)],
        guards: &mut [OwnedRwLockWriteGuard<SpotState>],
    ) {
        let statuses: HashMap<Ulid, SpotStatus> = spot_statuses.iter().copied().collect();
        for guard in guards.iter_mut() {
            if guard.owner_id == member_id {
                self.forget_spot(&**guard);
            } else {
                let status = statuses.get(&guard.id).copied();
                purge_member_from_spot(&mut **guard, member_id, status, &self.rent_to_spot);
            }
        }
    }
}

/// Extract the spot id from a spot-scoped event.
fn event_spot_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::SpotPricingUpdated { id, .. } => Some(*id),
        Event::DayOffered { spot_id, .. }
        | Event::RentConfirmed { spot_id, .. }
        | Event::RentCanceled { spot_id, .. }
        | Event::RentSettled { spot_id, .. } => Some(*spot_id),
        Event::RentCreated { rent, .. } => Some(rent.spot_id),
        Event::SpotRegistered { .. } | Event::SpotDeleted { .. } | Event::MemberPurged { .. } => None,
    }
}
