use crate::config::EngineConfig;
use crate::model::*;

/// Spot status as a pure function of its rents, today's offer flag and `now`.
///
/// - `occupied` while an open pending rent is running,
/// - else `reserved` while any open rent has not yet ended,
/// - else `available` if today is offered,
/// - else `occupied`.
pub fn derive_spot_status<'a>(
    rents: impl IntoIterator<Item = &'a Rent>,
    today_offered: bool,
    now: Ms,
) -> SpotStatus {
    let mut upcoming = false;
    for rent in rents {
        if rent.status == RentStatus::Pending && rent.is_running(now) {
            return SpotStatus::Occupied;
        }
        upcoming |= rent.is_active_or_upcoming(now);
    }
    if upcoming {
        SpotStatus::Reserved
    } else if today_offered {
        SpotStatus::Available
    } else {
        SpotStatus::Occupied
    }
}

/// Status of `ss` at `now` if its rent list were `rents`.
pub(super) fn status_with<'a>(
    ss: &SpotState,
    config: &EngineConfig,
    now: Ms,
    rents: impl IntoIterator<Item = &'a Rent>,
) -> SpotStatus {
    derive_spot_status(rents, ss.is_offered_on(config.local_date(now)), now)
}

/// Status of `ss` at `now` with its current rents.
pub(super) fn current_status(ss: &SpotState, config: &EngineConfig, now: Ms) -> SpotStatus {
    status_with(ss, config, now, &ss.rents)
}
