use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::{ParkshareAuthSource, resolve_caller};
use crate::engine::{BatchReport, Caller, Engine, EngineError, SpotSpec};
use crate::model::*;
use crate::observability::{AUTH_FAILURES_TOTAL, QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::sql::{self, Command, RentFilter};

// ── Result schemas ───────────────────────────────────────────────

type Columns = &'static [(&'static str, Type)];

const SPOT_COLUMNS: Columns = &[
    ("id", Type::VARCHAR),
    ("owner_id", Type::VARCHAR),
    ("kind", Type::VARCHAR),
    ("pricing", Type::VARCHAR),
    ("price_per_half_hour", Type::INT8),
    ("daily_max_price", Type::INT8),
    ("monthly_price", Type::INT8),
    ("lat", Type::FLOAT8),
    ("lng", Type::FLOAT8),
    ("status", Type::VARCHAR),
];

const RENT_COLUMNS: Columns = &[
    ("id", Type::VARCHAR),
    ("spot_id", Type::VARCHAR),
    ("renter_id", Type::VARCHAR),
    ("start", Type::INT8),
    ("end", Type::INT8),
    ("actual_end", Type::INT8),
    ("total_cost", Type::INT8),
    ("status", Type::VARCHAR),
];

const DAY_COLUMNS: Columns = &[
    ("spot_id", Type::VARCHAR),
    ("date", Type::VARCHAR),
    ("is_available", Type::BOOL),
];

const WINDOW_COLUMNS: Columns = &[
    ("spot_id", Type::VARCHAR),
    ("start", Type::INT8),
    ("end", Type::INT8),
];

const QUOTE_COLUMNS: Columns = &[
    ("spot_id", Type::VARCHAR),
    ("start", Type::INT8),
    ("end", Type::INT8),
    ("total_cost", Type::INT8),
];

const SETTLEMENT_COLUMNS: Columns = &[("rent_id", Type::VARCHAR), ("total_cost", Type::INT8)];

const SETTLEMENT_RUN_COLUMNS: Columns = &[
    ("settled", Type::INT8),
    ("skipped", Type::INT8),
    ("failed", Type::INT8),
];

fn fields(columns: Columns, format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(idx))
        })
        .collect()
}

fn schema(columns: Columns, format: &Format) -> Arc<Vec<FieldInfo>> {
    Arc::new(fields(columns, format))
}

/// Row shape a statement produces, judged from its text alone (parameters may be unbound).
fn columns_for_sql(sql: &str) -> Option<Columns> {
    let lower = sql.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|t| !t.is_empty())
        .collect();
    let verb = *tokens.first()?;
    let table_after = |keyword: &str| {
        tokens
            .iter()
            .position(|t| *t == keyword)
            .and_then(|i| tokens.get(i + 1))
            .map(|t| t.trim_matches('"'))
    };
    match verb {
        "select" => match table_after("from")? {
            "spots" => Some(SPOT_COLUMNS),
            "rents" | "open_rents" => Some(RENT_COLUMNS),
            "available_days" => Some(DAY_COLUMNS),
            "availability" => Some(WINDOW_COLUMNS),
            "quote" => Some(QUOTE_COLUMNS),
            _ => None,
        },
        "insert" => match table_after("into")? {
            "settlements" => Some(SETTLEMENT_COLUMNS),
            "settlement_runs" => Some(SETTLEMENT_RUN_COLUMNS),
            _ => None,
        },
        _ => None,
    }
}

fn rows_response<T>(
    columns: Columns,
    format: &Format,
    items: impl IntoIterator<Item = T>,
    encode: impl Fn(&mut DataRowEncoder, T) -> PgWireResult<()>,
) -> Response {
    let schema = schema(columns, format);
    let rows: Vec<PgWireResult<_>> = items
        .into_iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn encode_spot(encoder: &mut DataRowEncoder, spot: SpotInfo) -> PgWireResult<()> {
    encoder.encode_field(&spot.id.to_string())?;
    encoder.encode_field(&spot.owner_id.to_string())?;
    encoder.encode_field(&spot.kind.as_str())?;
    encoder.encode_field(&spot.pricing.pricing_type.as_str())?;
    encoder.encode_field(&spot.pricing.price_per_half_hour)?;
    encoder.encode_field(&spot.pricing.daily_max_price)?;
    encoder.encode_field(&spot.pricing.monthly_price)?;
    encoder.encode_field(&spot.location.lat)?;
    encoder.encode_field(&spot.location.lng)?;
    encoder.encode_field(&spot.status.as_str())
}

fn encode_rent(encoder: &mut DataRowEncoder, rent: Rent) -> PgWireResult<()> {
    encoder.encode_field(&rent.id.to_string())?;
    encoder.encode_field(&rent.spot_id.to_string())?;
    encoder.encode_field(&rent.renter_id.to_string())?;
    encoder.encode_field(&rent.span.start)?;
    encoder.encode_field(&rent.span.end)?;
    encoder.encode_field(&rent.actual_end)?;
    encoder.encode_field(&rent.total_cost)?;
    encoder.encode_field(&rent.status.as_str())
}

fn execution(verb: &str, rows: usize) -> Response {
    Response::Execution(Tag::new(verb).with_rows(rows))
}

// ── Handler ──────────────────────────────────────────────────────

pub struct ParkshareHandler {
    engine: Arc<Engine>,
    admin_user: String,
    query_parser: Arc<ParkshareQueryParser>,
}

impl ParkshareHandler {
    pub fn new(engine: Arc<Engine>, admin_user: String) -> Self {
        Self {
            engine,
            admin_user,
            query_parser: Arc::new(ParkshareQueryParser),
        }
    }

    fn resolve_caller<C: ClientInfo>(&self, client: &C) -> PgWireResult<Caller> {
        let user = client.metadata().get("user").map(String::as_str);
        resolve_caller(user, &self.admin_user).ok_or_else(|| {
            metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "28000".into(),
                format!(
                    "session user {:?} is neither the admin nor a member id",
                    user.unwrap_or_default()
                ),
            )))
        })
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, caller: Caller, query: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(|e| {
            metrics::counter!(QUERIES_TOTAL, "command" => "unparsed", "status" => "error").increment(1);
            sql_err(e)
        })?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(caller, cmd, format).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result.map_err(engine_err)
    }

    /// Members may only settle or confirm rents they hold or that sit on their spots.
    async fn authorize_rent(&self, caller: Caller, rent_id: Ulid) -> Result<(), EngineError> {
        if caller.is_admin() {
            return Ok(());
        }
        let rent = self.engine.rent(rent_id).await?;
        if caller.acts_for(rent.renter_id) {
            return Ok(());
        }
        let spot = self.engine.get_spot(rent.spot_id).await?;
        if caller.acts_for(spot.owner_id) {
            Ok(())
        } else {
            Err(EngineError::Forbidden)
        }
    }

    async fn execute_command(
        &self,
        caller: Caller,
        cmd: Command,
        format: &Format,
    ) -> Result<Response, EngineError> {
        let engine = &self.engine;
        match cmd {
            Command::InsertSpot {
                id,
                owner_id,
                kind,
                pricing,
                location,
            } => {
                if !caller.acts_for(owner_id) {
                    return Err(EngineError::Forbidden);
                }
                engine
                    .register_spot(SpotSpec {
                        id,
                        owner_id,
                        kind,
                        pricing,
                        location,
                    })
                    .await?;
                Ok(execution("INSERT", 1))
            }
            Command::DeleteSpot { id } => {
                engine.delete_spot(id, caller).await?;
                Ok(execution("DELETE", 1))
            }
            Command::UpdateSpotPricing { spot_id, pricing } => {
                engine.update_spot_pricing(spot_id, caller, pricing).await?;
                Ok(execution("INSERT", 1))
            }
            Command::InsertAvailableDay {
                spot_id,
                date,
                is_available,
            } => {
                engine
                    .set_available_day(spot_id, caller, date, is_available)
                    .await?;
                Ok(execution("INSERT", 1))
            }
            Command::InsertRental {
                id,
                spot_id,
                renter_id,
                start,
                end,
            } => {
                if !caller.acts_for(renter_id) {
                    return Err(EngineError::Forbidden);
                }
                engine.book_rental(id, spot_id, renter_id, start, end).await?;
                Ok(execution("INSERT", 1))
            }
            Command::InsertReservation {
                id,
                spot_id,
                renter_id,
                start,
                end,
            } => {
                if !caller.acts_for(renter_id) {
                    return Err(EngineError::Forbidden);
                }
                engine
                    .book_reservation(id, spot_id, renter_id, start, end)
                    .await?;
                Ok(execution("INSERT", 1))
            }
            Command::InsertConfirmation { rent_id } => {
                self.authorize_rent(caller, rent_id).await?;
                engine.confirm_reservation(rent_id).await?;
                Ok(execution("INSERT", 1))
            }
            Command::DeleteRent { id } => {
                engine.cancel_rental(id, caller).await?;
                Ok(execution("DELETE", 1))
            }
            Command::InsertSettlement { rent_id, actual_end } => {
                self.authorize_rent(caller, rent_id).await?;
                let settlement = engine.settle_rental(rent_id, actual_end).await?;
                Ok(rows_response(
                    SETTLEMENT_COLUMNS,
                    format,
                    [settlement],
                    |encoder, s| {
                        encoder.encode_field(&s.rent_id.to_string())?;
                        encoder.encode_field(&s.total_cost)
                    },
                ))
            }
            Command::InsertSettlementRun { now } => {
                if !caller.is_admin() {
                    return Err(EngineError::Forbidden);
                }
                let now = now.unwrap_or_else(|| engine.now_ms());
                let report = engine.run_batch_settlement(now).await;
                Ok(rows_response(
                    SETTLEMENT_RUN_COLUMNS,
                    format,
                    [report],
                    |encoder, r: BatchReport| {
                        encoder.encode_field(&(r.settled_count() as i64))?;
                        encoder.encode_field(&(r.skipped as i64))?;
                        encoder.encode_field(&(r.failures.len() as i64))
                    },
                ))
            }
            Command::DeleteMember { id } => {
                let summary = engine.purge_member(caller, id).await?;
                Ok(execution("DELETE", summary.rents_removed))
            }
            Command::SelectSpots { id, owner_id } => {
                let spots = match id {
                    Some(id) => vec![engine.get_spot(id).await?],
                    None => engine.list_spots(owner_id).await,
                };
                Ok(rows_response(SPOT_COLUMNS, format, spots, encode_spot))
            }
            Command::SelectRents { filter } => {
                let rents = match filter {
                    RentFilter::Id(id) => vec![engine.rent(id).await?],
                    RentFilter::Spot(spot_id) => engine.rents_for_spot(spot_id).await?,
                    RentFilter::Renter(renter_id) => engine.rents_for_renter(renter_id).await,
                };
                Ok(rows_response(RENT_COLUMNS, format, rents, encode_rent))
            }
            Command::SelectOpenRents => {
                let rents = engine.open_rents().await;
                Ok(rows_response(RENT_COLUMNS, format, rents, encode_rent))
            }
            Command::SelectAvailableDays { spot_id } => {
                let days = engine.calendar(spot_id).await?;
                Ok(rows_response(DAY_COLUMNS, format, days, |encoder, d| {
                    encoder.encode_field(&d.spot_id.to_string())?;
                    encoder.encode_field(&d.date.to_string())?;
                    encoder.encode_field(&d.is_available)
                }))
            }
            Command::SelectAvailability { spot_id, start, end } => {
                let windows = engine.free_windows(spot_id, start, end).await?;
                let sid = spot_id.to_string();
                Ok(rows_response(WINDOW_COLUMNS, format, windows, |encoder, w| {
                    encoder.encode_field(&sid)?;
                    encoder.encode_field(&w.start)?;
                    encoder.encode_field(&w.end)
                }))
            }
            Command::SelectQuote { spot_id, start, end } => {
                let total = engine.quote(spot_id, start, end).await?;
                Ok(rows_response(QUOTE_COLUMNS, format, [total], |encoder, total| {
                    encoder.encode_field(&spot_id.to_string())?;
                    encoder.encode_field(&start)?;
                    encoder.encode_field(&end)?;
                    encoder.encode_field(&total)
                }))
            }
        }
    }
}

#[async_trait]
impl SimpleQueryHandler for ParkshareHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let caller = self.resolve_caller(client)?;
        let response = self.run(caller, query, &Format::UnifiedText).await?;
        Ok(vec![response])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct ParkshareQueryParser;

#[async_trait]
impl QueryParser for ParkshareQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        let format = column_format.unwrap_or(&Format::UnifiedText);
        Ok(describe_columns(stmt, format))
    }
}

fn describe_columns(sql: &str, format: &Format) -> Vec<FieldInfo> {
    columns_for_sql(sql)
        .map(|columns| fields(columns, format))
        .unwrap_or_default()
}

#[async_trait]
impl ExtendedQueryHandler for ParkshareHandler {
    type Statement = String;
    type QueryParser = ParkshareQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let caller = self.resolve_caller(client)?;
        let sql = substitute_params(portal);
        self.run(caller, &sql, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            describe_columns(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(describe_columns(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute_text_params(&portal.statement.statement, &params)
}

/// Highest placeholder first, so `$1` never clobbers the prefix of `$10`.
fn substitute_text_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(text) => format!("'{}'", text.replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ParkshareFactory {
    handler: Arc<ParkshareHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<ParkshareAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl ParkshareFactory {
    pub fn new(engine: Arc<Engine>, password: String, admin_user: String) -> Self {
        let auth_source = ParkshareAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(ParkshareHandler::new(engine, admin_user)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for ParkshareFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: ParkshareFactory,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM spots"), 0);
        assert_eq!(count_params("SELECT * FROM rents WHERE spot_id = $1"), 1);
        assert_eq!(
            count_params("INSERT INTO rentals VALUES ($1, $2, $3, $10, $4)"),
            10
        );
    }

    #[test]
    fn substitution_quotes_and_escapes() {
        let sql = "SELECT * FROM rents WHERE renter_id = $1 AND spot_id = $2";
        let out = substitute_text_params(sql, &[Some("o'neil".into()), None]);
        assert_eq!(out, "SELECT * FROM rents WHERE renter_id = 'o''neil' AND spot_id = NULL");
    }

    #[test]
    fn substitution_handles_two_digit_placeholders() {
        let params: Vec<Option<String>> = (1..=10).map(|i| Some(i.to_string())).collect();
        let out = substitute_text_params("$1 $10", &params);
        assert_eq!(out, "'1' '10'");
    }

    #[test]
    fn result_columns_follow_table() {
        assert_eq!(columns_for_sql("SELECT * FROM spots WHERE id = $1"), Some(SPOT_COLUMNS));
        assert_eq!(columns_for_sql("select * from open_rents"), Some(RENT_COLUMNS));
        assert_eq!(
            columns_for_sql("SELECT * FROM availability WHERE spot_id = $1"),
            Some(WINDOW_COLUMNS)
        );
        assert_eq!(
            columns_for_sql("INSERT INTO settlements (rent_id, actual_end) VALUES ($1, $2)"),
            Some(SETTLEMENT_COLUMNS)
        );
        assert_eq!(columns_for_sql("INSERT INTO rentals (id) VALUES ($1)"), None);
        assert_eq!(columns_for_sql("DELETE FROM rents WHERE id = $1"), None);
    }
}
