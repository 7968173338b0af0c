use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "parkshare_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "parkshare_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "parkshare_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "parkshare_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "parkshare_connections_rejected_total";

/// Counter: sessions whose user name is neither the admin nor a member ULID.
pub const AUTH_FAILURES_TOTAL: &str = "parkshare_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkshare_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkshare_wal_flush_batch_size";

// ── Business metrics ────────────────────────────────────────────

/// Counter: booking attempts. Labels: kind (rental, reservation), outcome (ok or error code).
pub const BOOKINGS_TOTAL: &str = "parkshare_bookings_total";

/// Counter: rents settled. Labels: source (request, batch).
pub const SETTLEMENTS_TOTAL: &str = "parkshare_settlements_total";

/// Counter: sum of billed totals.
pub const SETTLED_AMOUNT_TOTAL: &str = "parkshare_settled_amount_total";

/// Histogram: wall time of one batch settlement run.
pub const BATCH_SETTLEMENT_DURATION_SECONDS: &str = "parkshare_batch_settlement_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertSpot { .. } => "insert_spot",
        Command::DeleteSpot { .. } => "delete_spot",
        Command::UpdateSpotPricing { .. } => "update_spot_pricing",
        Command::InsertAvailableDay { .. } => "insert_available_day",
        Command::InsertRental { .. } => "insert_rental",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::InsertConfirmation { .. } => "insert_confirmation",
        Command::DeleteRent { .. } => "delete_rent",
        Command::InsertSettlement { .. } => "insert_settlement",
        Command::InsertSettlementRun { .. } => "insert_settlement_run",
        Command::DeleteMember { .. } => "delete_member",
        Command::SelectSpots { .. } => "select_spots",
        Command::SelectRents { .. } => "select_rents",
        Command::SelectOpenRents => "select_open_rents",
        Command::SelectAvailableDays { .. } => "select_available_days",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectQuote { .. } => "select_quote",
    }
}
