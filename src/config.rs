use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

use crate::model::*;
use crate::pricing::{PricingPolicy, SurchargeOrder, DEFAULT_FREE_THRESHOLD_MS};

/// Offset used for every calendar-date decision unless configured otherwise (+08:00).
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// How far before "now" a caller-supplied settlement time may lie.
pub const DEFAULT_SETTLE_GRACE_MS: Ms = 5 * MINUTE_MS;

/// Business rules the engine needs besides the store and the clock.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// All "today" and calendar-date comparisons go through this one offset.
    pub utc_offset: FixedOffset,
    pub settle_grace_ms: Ms,
    pub pricing: PricingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset: offset_or_utc(DEFAULT_UTC_OFFSET_SECS),
            settle_grace_ms: DEFAULT_SETTLE_GRACE_MS,
            pricing: PricingPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Calendar date of instant `t` in the configured offset.
    pub fn local_date(&self, t: Ms) -> NaiveDate {
        DateTime::from_timestamp_millis(t)
            .map(|dt| dt.with_timezone(&self.utc_offset).date_naive())
            .unwrap_or(NaiveDate::MIN)
    }

    /// The local day `date` as a UTC millisecond window `[midnight, next midnight)`.
    pub fn day_span(&self, date: NaiveDate) -> Span {
        let midnight = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        let start = midnight - self.utc_offset.local_minus_utc() as Ms * 1000;
        Span::new(start, start + DAY_MS)
    }
}

fn offset_or_utc(secs: i32) -> FixedOffset {
    FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub admin_user: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    /// Batch settlement period; zero leaves settlement to an outside scheduler.
    pub settlement_interval_secs: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// `count` units of `unit_ms`, or `default` when the count is negative or overflows.
fn duration_ms(key: &str, count: Option<i64>, unit_ms: Ms, default: Ms) -> Ms {
    let Some(count) = count else { return default };
    match count.checked_mul(unit_ms) {
        Some(ms) if count >= 0 => ms,
        _ => {
            tracing::warn!("{key}={count} out of range, using default of {default}ms");
            default
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let offset_secs: i32 = env_parse("PARKSHARE_UTC_OFFSET_SECS").unwrap_or(DEFAULT_UTC_OFFSET_SECS);
        let settle_grace_ms = duration_ms(
            "PARKSHARE_SETTLE_GRACE_SECS",
            env_parse("PARKSHARE_SETTLE_GRACE_SECS"),
            1000,
            DEFAULT_SETTLE_GRACE_MS,
        );
        let free_threshold_ms = duration_ms(
            "PARKSHARE_FREE_MINUTES",
            env_parse("PARKSHARE_FREE_MINUTES"),
            MINUTE_MS,
            DEFAULT_FREE_THRESHOLD_MS,
        );
        let surcharge_order = if env_parse::<bool>("PARKSHARE_SURCHARGE_AFTER_CAP").unwrap_or(false) {
            SurchargeOrder::AfterCap
        } else {
            SurchargeOrder::BeforeCap
        };

        let engine = EngineConfig {
            utc_offset: offset_or_utc(offset_secs),
            settle_grace_ms,
            pricing: PricingPolicy {
                free_threshold_ms,
                overtime_per_half_hour: env_parse("PARKSHARE_OVERTIME_PER_HALF_HOUR"),
                surcharge_order,
            },
        };

        Self {
            bind: std::env::var("PARKSHARE_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PARKSHARE_PORT").unwrap_or_else(|_| "5433".into()),
            data_dir: PathBuf::from(
                std::env::var("PARKSHARE_DATA_DIR").unwrap_or_else(|_| "./data".into()),
            ),
            password: std::env::var("PARKSHARE_PASSWORD").unwrap_or_else(|_| "parkshare".into()),
            admin_user: std::env::var("PARKSHARE_ADMIN_USER").unwrap_or_else(|_| "parkshare".into()),
            max_connections: env_parse("PARKSHARE_MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: env_parse("PARKSHARE_COMPACT_THRESHOLD").unwrap_or(1000),
            settlement_interval_secs: env_parse("PARKSHARE_SETTLEMENT_INTERVAL_SECS").unwrap_or(0),
            tls_cert: std::env::var("PARKSHARE_TLS_CERT").ok(),
            tls_key: std::env::var("PARKSHARE_TLS_KEY").ok(),
            metrics_port: env_parse("PARKSHARE_METRICS_PORT"),
            engine,
        }
    }
}
