use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::*;
use crate::observability::{BATCH_SETTLEMENT_DURATION_SECONDS, SETTLED_AMOUNT_TOTAL, SETTLEMENTS_TOTAL};
use crate::pricing::{price, Usage};

use super::status::status_with;
use super::txn::Commit;
use super::{Engine, EngineError};

/// Outcome of one batch settlement run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub settled: Vec<Settlement>,
    /// Open rents left alone: not started yet, or closed by someone else mid-run.
    pub skipped: usize,
    pub failures: Vec<(Ulid, EngineError)>,
}

impl BatchReport {
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }
}

/// Price `rent` ending at `actual_end` and build the settle event.
fn settle_commit(
    ss: &SpotState,
    rent: &Rent,
    actual_end: Ms,
    now: Ms,
    config: &EngineConfig,
) -> Result<Commit<Settlement>, EngineError> {
    let usage = Usage {
        start: rent.span.start,
        booked_end: rent.span.end,
        end: actual_end,
    };
    let total_cost = price(usage, &ss.pricing, &config.pricing)?;
    let others = ss.rents.iter().filter(|r| r.id != rent.id);
    let spot_status = status_with(ss, config, now, others);
    let event = Event::RentSettled {
        id: rent.id,
        spot_id: ss.id,
        actual_end,
        total_cost,
        spot_status,
    };
    Ok(Commit::new(
        event,
        Settlement {
            rent_id: rent.id,
            total_cost,
        },
    ))
}

/// Terminal states never transition again.
fn check_settleable(rent: &Rent) -> Result<(), EngineError> {
    if rent.actual_end.is_some() || rent.status == RentStatus::Completed {
        return Err(EngineError::AlreadySettled(rent.id));
    }
    if rent.status == RentStatus::Canceled {
        return Err(EngineError::InvalidStatus {
            id: rent.id,
            status: rent.status,
        });
    }
    Ok(())
}

fn record_settlement(settlement: &Settlement, source: &'static str) {
    metrics::counter!(SETTLEMENTS_TOTAL, "source" => source).increment(1);
    if settlement.total_cost > 0 {
        metrics::counter!(SETTLED_AMOUNT_TOTAL).increment(settlement.total_cost as u64);
    }
}

impl Engine {
    /// "Leave and pay": close a rent at a caller-supplied end time.
    ///
    /// `actual_end` must not precede the rent's start, must not lie in the
    /// future, and may trail `now` by at most the configured grace.
    pub async fn settle_rental(&self, rent_id: Ulid, actual_end: Ms) -> Result<Settlement, EngineError> {
        let config = self.config;
        let settlement = self
            .transact_rent(rent_id, None, move |ss, rent, now| {
                check_settleable(rent)?;
                if actual_end < rent.span.start {
                    return Err(EngineError::InvalidTime("actual end precedes start"));
                }
                if actual_end > now {
                    return Err(EngineError::InvalidTime("actual end is in the future"));
                }
                if actual_end < now - config.settle_grace_ms {
                    return Err(EngineError::InvalidTime("actual end is too far in the past"));
                }
                settle_commit(ss, rent, actual_end, now, &config)
            })
            .await?;
        record_settlement(&settlement, "request");
        tracing::info!(%rent_id, total_cost = settlement.total_cost, "rent settled");
        Ok(settlement)
    }

    /// Settle with `now` as the actual end, bypassing the grace window.
    pub async fn force_settle(&self, rent_id: Ulid, now: Ms) -> Result<Settlement, EngineError> {
        let config = self.config;
        let settlement = self
            .transact_rent(rent_id, Some(now), move |ss, rent, now| {
                check_settleable(rent)?;
                if now < rent.span.start {
                    return Err(EngineError::NotStarted(rent_id));
                }
                settle_commit(ss, rent, now, now, &config)
            })
            .await?;
        record_settlement(&settlement, "batch");
        Ok(settlement)
    }

    /// Force-settle every open rent that has started by `now`.
    /// Each rent is its own transaction; a failure is recorded and the run goes on.
    pub async fn run_batch_settlement(&self, now: Ms) -> BatchReport {
        let started = std::time::Instant::now();
        let mut report = BatchReport::default();

        let spots: Vec<_> = self.spots.iter().map(|e| e.value().clone()).collect();
        let mut open: Vec<(Ulid, Ms)> = Vec::new();
        for ss in spots {
            let guard = ss.read().await;
            open.extend(guard.open_rents().map(|r| (r.id, r.span.start)));
        }

        for (rent_id, start) in open {
            if start > now {
                report.skipped += 1;
                continue;
            }
            match self.force_settle(rent_id, now).await {
                Ok(settlement) => report.settled.push(settlement),
                Err(
                    EngineError::AlreadySettled(_)
                    | EngineError::InvalidStatus { .. }
                    | EngineError::NotFound(_),
                ) => {
                    tracing::debug!(%rent_id, "rent closed before batch reached it");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(%rent_id, error = %e, "batch settlement failed for rent");
                    report.failures.push((rent_id, e));
                }
            }
        }

        metrics::histogram!(BATCH_SETTLEMENT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        tracing::info!(
            settled = report.settled_count(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "batch settlement finished"
        );
        report
    }
}
