use crate::config::EngineConfig;
use crate::model::*;

// ── Free-window algorithm ────────────────────────────────────────

/// Free intervals of a spot inside `query`.
///
/// Base: every offered calendar day as a local-day span, clamped to the query.
/// Subtracted: every non-terminal rent window, widened by 1ms on each side
/// since a window touching a rent still conflicts with it.
pub fn free_windows(ss: &SpotState, config: &EngineConfig, query: &Span) -> Vec<Span> {
    let first = config.local_date(query.start);
    let last = config.local_date(query.end - 1);

    let mut offered: Vec<Span> = Vec::new();
    for (date, is_available) in ss.calendar.range(first..=last) {
        if !*is_available {
            continue;
        }
        let day = config.day_span(*date);
        let start = day.start.max(query.start);
        let end = day.end.min(query.end);
        if start < end {
            offered.push(Span::new(start, end));
        }
    }
    let offered = merge_overlapping(&offered);
    if offered.is_empty() {
        return offered;
    }

    // `conflicting` yields rents in start order, so the widened spans stay sorted.
    let taken: Vec<Span> = ss
        .conflicting(query)
        .filter(|r| !r.status.is_terminal())
        .map(|r| Span::new(r.span.start - 1, r.span.end + 1))
        .collect();
    if taken.is_empty() {
        return offered;
    }
    subtract_intervals(&offered, &merge_overlapping(&taken))
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` spans from sorted, disjoint `base` spans.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    const H: Ms = HOUR_MS;
    // 2026-10-16T00:00:00+08:00
    const OCT16: Ms = 1_792_108_800_000 - 8 * H;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn spot() -> SpotState {
        SpotState::new(
            Ulid::new(),
            Ulid::new(),
            SpotKind::Mechanical,
            Pricing {
                pricing_type: PricingType::Hourly,
                price_per_half_hour: 20,
                daily_max_price: 300,
                monthly_price: 0,
            },
            GeoPoint { lat: 25.0, lng: 121.5 },
        )
    }

    fn add_rent(ss: &mut SpotState, start: Ms, end: Ms, status: RentStatus) {
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

    // ── subtract_intervals ────────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        assert_eq!(subtract_intervals(&base, &remove), base);
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 250)];
        assert!(subtract_intervals(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![Span::new(100, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![Span::new(0, 1000)];
        let remove = vec![Span::new(100, 200), Span::new(400, 500), Span::new(800, 900)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 800),
                Span::new(900, 1000),
            ]
        );
    }

    // ── merge_overlapping ────────────────────────────────

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300), Span::new(500, 600)];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(100, 300), Span::new(500, 600)]
        );
    }

    // ── free_windows ─────────────────────────────────────

    #[test]
    fn unoffered_spot_has_no_free_time() {
        let ss = spot();
        let cfg = EngineConfig::default();
        assert!(free_windows(&ss, &cfg, &Span::new(OCT16, OCT16 + 2 * DAY_MS)).is_empty());
    }

    #[test]
    fn consecutive_offered_days_merge() {
        let mut ss = spot();
        ss.calendar.insert(date(16), true);
        ss.calendar.insert(date(17), true);
        ss.calendar.insert(date(18), false);
        let cfg = EngineConfig::default();
        let free = free_windows(&ss, &cfg, &Span::new(OCT16, OCT16 + 3 * DAY_MS));
        assert_eq!(free, vec![Span::new(OCT16, OCT16 + 2 * DAY_MS)]);
    }

    #[test]
    fn rents_punch_widened_holes() {
        let mut ss = spot();
        ss.calendar.insert(date(16), true);
        add_rent(&mut ss, OCT16 + 10 * H, OCT16 + 12 * H, RentStatus::Pending);
        add_rent(&mut ss, OCT16 + 14 * H, OCT16 + 15 * H, RentStatus::Canceled);
        let cfg = EngineConfig::default();
        let free = free_windows(&ss, &cfg, &Span::new(OCT16, OCT16 + DAY_MS));
        assert_eq!(
            free,
            vec![
                Span::new(OCT16, OCT16 + 10 * H - 1),
                Span::new(OCT16 + 12 * H + 1, OCT16 + DAY_MS),
            ]
        );
    }

    #[test]
    fn query_clamps_offered_day() {
        let mut ss = spot();
        ss.calendar.insert(date(16), true);
        let cfg = EngineConfig::default();
        let query = Span::new(OCT16 + 8 * H, OCT16 + 9 * H);
        assert_eq!(free_windows(&ss, &cfg, &query), vec![query]);
    }
}
