//! Converts elapsed parking time into an amount owed.
//!
//! Pure functions only: no clock, no store. Every duration is rounded **up** to
//! the next billing unit.

use crate::model::*;

/// Durations at or below this are not billed at all.
pub const DEFAULT_FREE_THRESHOLD_MS: Ms = 5 * MINUTE_MS;

/// Flat-rate billing period for monthly spots.
pub const MONTH_MS: Ms = 30 * DAY_MS;

/// Where the overtime surcharge enters the hourly computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurchargeOrder {
    /// `min(base + surcharge, cap)`: the daily cap also bounds overtime.
    #[default]
    BeforeCap,
    /// `min(base, cap) + surcharge`: overtime is billed on top of the cap.
    AfterCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub free_threshold_ms: Ms,
    /// Extra charge per started half hour past the booked end. `None` disables overtime billing.
    pub overtime_per_half_hour: Option<Money>,
    pub surcharge_order: SurchargeOrder,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_threshold_ms: DEFAULT_FREE_THRESHOLD_MS,
            overtime_per_half_hour: None,
            surcharge_order: SurchargeOrder::BeforeCap,
        }
    }
}

/// What is being billed: when parking began, when it was booked to end, and when it actually ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub start: Ms,
    pub booked_end: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    NonPositiveRate(&'static str),
    EndBeforeStart,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::NonPositiveRate(field) => write!(f, "{field} must be positive"),
            PricingError::EndBeforeStart => write!(f, "end precedes start"),
        }
    }
}

impl std::error::Error for PricingError {}

/// Reject rates that would make the selected pricing type bill nothing or a negative amount.
pub fn validate_pricing(pricing: &Pricing) -> Result<(), PricingError> {
    match pricing.pricing_type {
        PricingType::Hourly => {
            if pricing.price_per_half_hour <= 0 {
                return Err(PricingError::NonPositiveRate("price_per_half_hour"));
            }
            if pricing.daily_max_price <= 0 {
                return Err(PricingError::NonPositiveRate("daily_max_price"));
            }
        }
        PricingType::Monthly => {
            if pricing.monthly_price <= 0 {
                return Err(PricingError::NonPositiveRate("monthly_price"));
            }
        }
    }
    Ok(())
}

/// Number of whole `unit`s needed to cover `duration`. Zero and negative durations need none.
pub fn units_ceil(duration: Ms, unit: Ms) -> i64 {
    debug_assert!(unit > 0);
    if duration <= 0 {
        0
    } else {
        (duration - 1) / unit + 1
    }
}

/// Price a usage under the spot's rates and the deployment's policy.
pub fn price(usage: Usage, pricing: &Pricing, policy: &PricingPolicy) -> Result<Money, PricingError> {
    validate_pricing(pricing)?;
    if let Some(rate) = policy.overtime_per_half_hour
        && rate < 0 {
            return Err(PricingError::NonPositiveRate("overtime_per_half_hour"));
        }
    let duration = usage.end - usage.start;
    if duration < 0 {
        return Err(PricingError::EndBeforeStart);
    }
    if duration <= policy.free_threshold_ms {
        return Ok(0);
    }

    let surcharge = policy
        .overtime_per_half_hour
        .map(|rate| units_ceil(usage.end - usage.booked_end, HALF_HOUR_MS).saturating_mul(rate))
        .unwrap_or(0);

    let cost = match pricing.pricing_type {
        PricingType::Monthly => units_ceil(duration, MONTH_MS)
            .saturating_mul(pricing.monthly_price)
            .saturating_add(surcharge),
        PricingType::Hourly => {
            let base = units_ceil(duration, HALF_HOUR_MS).saturating_mul(pricing.price_per_half_hour);
            let cap = units_ceil(duration, DAY_MS).saturating_mul(pricing.daily_max_price);
            match policy.surcharge_order {
                SurchargeOrder::BeforeCap => base.saturating_add(surcharge).min(cap),
                SurchargeOrder::AfterCap => base.min(cap).saturating_add(surcharge),
            }
        }
    };
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly() -> Pricing {
        Pricing {
            pricing_type: PricingType::Hourly,
            price_per_half_hour: 20,
            daily_max_price: 300,
            monthly_price: 0,
        }
    }

    fn monthly() -> Pricing {
        Pricing {
            pricing_type: PricingType::Monthly,
            price_per_half_hour: 0,
            daily_max_price: 0,
            monthly_price: 5000,
        }
    }

    fn usage(minutes: Ms) -> Usage {
        Usage {
            start: 0,
            booked_end: minutes * MINUTE_MS,
            end: minutes * MINUTE_MS,
        }
    }

    fn with_overtime(rate: Money, order: SurchargeOrder) -> PricingPolicy {
        PricingPolicy {
            overtime_per_half_hour: Some(rate),
            surcharge_order: order,
            ..PricingPolicy::default()
        }
    }

    #[test]
    fn units_round_up() {
        assert_eq!(units_ceil(0, HALF_HOUR_MS), 0);
        assert_eq!(units_ceil(-5, HALF_HOUR_MS), 0);
        assert_eq!(units_ceil(1, HALF_HOUR_MS), 1);
        assert_eq!(units_ceil(HALF_HOUR_MS, HALF_HOUR_MS), 1);
        assert_eq!(units_ceil(HALF_HOUR_MS + 1, HALF_HOUR_MS), 2);
    }

    #[test]
    fn hourly_fifty_minutes_is_two_units() {
        let cost = price(usage(50), &hourly(), &PricingPolicy::default()).unwrap();
        assert_eq!(cost, 40);
    }

    #[test]
    fn hourly_ten_hours_hits_daily_cap() {
        let cost = price(usage(600), &hourly(), &PricingPolicy::default()).unwrap();
        assert_eq!(cost, 300);
    }

    #[test]
    fn hourly_cap_scales_with_started_days() {
        // 25h: 50 units = 1000, two started days cap at 600.
        let cost = price(usage(25 * 60), &hourly(), &PricingPolicy::default()).unwrap();
        assert_eq!(cost, 600);
    }

    #[test]
    fn monthly_forty_days_is_two_periods() {
        let cost = price(usage(40 * 24 * 60), &monthly(), &PricingPolicy::default()).unwrap();
        assert_eq!(cost, 10_000);
    }

    #[test]
    fn monthly_exactly_thirty_days_is_one_period() {
        let cost = price(usage(30 * 24 * 60), &monthly(), &PricingPolicy::default()).unwrap();
        assert_eq!(cost, 5000);
    }

    #[test]
    fn grace_threshold_is_free() {
        let policy = PricingPolicy::default();
        assert_eq!(price(usage(0), &hourly(), &policy).unwrap(), 0);
        assert_eq!(price(usage(5), &hourly(), &policy).unwrap(), 0);
    }

    #[test]
    fn just_past_grace_bills_one_unit() {
        let policy = PricingPolicy::default();
        let u = Usage { start: 0, booked_end: HOUR_MS, end: 5 * MINUTE_MS + 1 };
        assert_eq!(price(u, &hourly(), &policy).unwrap(), 20);
        assert_eq!(price(usage(29), &hourly(), &policy).unwrap(), 20);
        assert_eq!(price(usage(30), &hourly(), &policy).unwrap(), 20);
        assert_eq!(price(usage(31), &hourly(), &policy).unwrap(), 40);
    }

    #[test]
    fn zero_grace_bills_every_started_unit() {
        let policy = PricingPolicy { free_threshold_ms: 0, ..PricingPolicy::default() };
        assert_eq!(price(usage(1), &hourly(), &policy).unwrap(), 20);
    }

    #[test]
    fn overtime_before_cap_is_bounded_by_cap() {
        // Booked 9h, stayed 10h: base 400 + 2 overtime units * 50 = 500, capped at 300.
        let u = Usage { start: 0, booked_end: 9 * HOUR_MS, end: 10 * HOUR_MS };
        let cost = price(u, &hourly(), &with_overtime(50, SurchargeOrder::BeforeCap)).unwrap();
        assert_eq!(cost, 300);
    }

    #[test]
    fn overtime_after_cap_is_added_on_top() {
        let u = Usage { start: 0, booked_end: 9 * HOUR_MS, end: 10 * HOUR_MS };
        let cost = price(u, &hourly(), &with_overtime(50, SurchargeOrder::AfterCap)).unwrap();
        assert_eq!(cost, 400);
    }

    #[test]
    fn overtime_below_cap_same_in_both_orders() {
        // Booked 1h, stayed 1h10m: 3 units = 60, overtime 1 unit = 15.
        let u = Usage { start: 0, booked_end: HOUR_MS, end: HOUR_MS + 10 * MINUTE_MS };
        let before = price(u, &hourly(), &with_overtime(15, SurchargeOrder::BeforeCap)).unwrap();
        let after = price(u, &hourly(), &with_overtime(15, SurchargeOrder::AfterCap)).unwrap();
        assert_eq!(before, 75);
        assert_eq!(after, 75);
    }

    #[test]
    fn leaving_early_has_no_overtime() {
        let u = Usage { start: 0, booked_end: 2 * HOUR_MS, end: HOUR_MS };
        let cost = price(u, &hourly(), &with_overtime(100, SurchargeOrder::AfterCap)).unwrap();
        assert_eq!(cost, 40);
    }

    #[test]
    fn monthly_overtime_added_without_cap() {
        let u = Usage { start: 0, booked_end: 30 * DAY_MS, end: 30 * DAY_MS + HOUR_MS };
        let cost = price(u, &monthly(), &with_overtime(10, SurchargeOrder::BeforeCap)).unwrap();
        assert_eq!(cost, 2 * 5000 + 2 * 10);
    }

    #[test]
    fn non_positive_rates_rejected() {
        let mut p = hourly();
        p.price_per_half_hour = 0;
        assert_eq!(
            price(usage(60), &p, &PricingPolicy::default()),
            Err(PricingError::NonPositiveRate("price_per_half_hour"))
        );

        let mut p = hourly();
        p.daily_max_price = -1;
        assert!(validate_pricing(&p).is_err());

        let mut p = monthly();
        p.monthly_price = 0;
        assert_eq!(
            validate_pricing(&p),
            Err(PricingError::NonPositiveRate("monthly_price"))
        );
    }

    #[test]
    fn unused_rates_may_be_zero() {
        assert!(validate_pricing(&hourly()).is_ok());
        assert!(validate_pricing(&monthly()).is_ok());
    }

    #[test]
    fn end_before_start_rejected() {
        let u = Usage { start: HOUR_MS, booked_end: 2 * HOUR_MS, end: 0 };
        assert_eq!(
            price(u, &hourly(), &PricingPolicy::default()),
            Err(PricingError::EndBeforeStart)
        );
    }

    #[test]
    fn huge_rates_saturate() {
        let p = Pricing {
            pricing_type: PricingType::Hourly,
            price_per_half_hour: Money::MAX / 2,
            daily_max_price: Money::MAX,
            monthly_price: 0,
        };
        let cost = price(usage(24 * 60), &p, &PricingPolicy::default()).unwrap();
        assert_eq!(cost, Money::MAX);
    }
}
