use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertSpot {
        id: Ulid,
        owner_id: Ulid,
        kind: SpotKind,
        pricing: Pricing,
        location: GeoPoint,
    },
    DeleteSpot {
        id: Ulid,
    },
    UpdateSpotPricing {
        spot_id: Ulid,
        pricing: Pricing,
    },
    InsertAvailableDay {
        spot_id: Ulid,
        date: NaiveDate,
        is_available: bool,
    },
    InsertRental {
        id: Ulid,
        spot_id: Ulid,
        renter_id: Ulid,
        start: Ms,
        end: Ms,
    },
    InsertReservation {
        id: Ulid,
        spot_id: Ulid,
        renter_id: Ulid,
        start: Ms,
        end: Ms,
    },
    InsertConfirmation {
        rent_id: Ulid,
    },
    DeleteRent {
        id: Ulid,
    },
    InsertSettlement {
        rent_id: Ulid,
        actual_end: Ms,
    },
    /// `now: None` settles as of the server clock.
    InsertSettlementRun {
        now: Option<Ms>,
    },
    DeleteMember {
        id: Ulid,
    },
    SelectSpots {
        id: Option<Ulid>,
        owner_id: Option<Ulid>,
    },
    SelectRents {
        filter: RentFilter,
    },
    SelectOpenRents,
    SelectAvailableDays {
        spot_id: Ulid,
    },
    SelectAvailability {
        spot_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectQuote {
        spot_id: Ulid,
        start: Ms,
        end: Ms,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RentFilter {
    Id(Ulid),
    Spot(Ulid),
    Renter(Ulid),
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn expect_arity(table: &'static str, values: &[Expr], expected: usize) -> Result<(), SqlError> {
    if values.len() < expected {
        return Err(SqlError::WrongArity(table, expected, values.len()));
    }
    Ok(())
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "spots" => {
            expect_arity("spots", &values, 9)?;
            Ok(Command::InsertSpot {
                id: parse_ulid_expr(&values[0])?,
                owner_id: parse_ulid_expr(&values[1])?,
                kind: parse_enum(&values[2], SpotKind::parse, "spot kind")?,
                pricing: parse_pricing(&values[3..7])?,
                location: GeoPoint {
                    lat: parse_f64_expr(&values[7])?,
                    lng: parse_f64_expr(&values[8])?,
                },
            })
        }
        "spot_pricing" => {
            expect_arity("spot_pricing", &values, 5)?;
            Ok(Command::UpdateSpotPricing {
                spot_id: parse_ulid_expr(&values[0])?,
                pricing: parse_pricing(&values[1..5])?,
            })
        }
        "available_days" => {
            expect_arity("available_days", &values, 3)?;
            Ok(Command::InsertAvailableDay {
                spot_id: parse_ulid_expr(&values[0])?,
                date: parse_date_expr(&values[1])?,
                is_available: parse_bool(&values[2])?,
            })
        }
        "rentals" | "reservations" => {
            expect_arity("rents", &values, 5)?;
            let id = parse_ulid_expr(&values[0])?;
            let spot_id = parse_ulid_expr(&values[1])?;
            let renter_id = parse_ulid_expr(&values[2])?;
            let start = parse_i64_expr(&values[3])?;
            let end = parse_i64_expr(&values[4])?;
            if table == "rentals" {
                Ok(Command::InsertRental { id, spot_id, renter_id, start, end })
            } else {
                Ok(Command::InsertReservation { id, spot_id, renter_id, start, end })
            }
        }
        "confirmations" => {
            expect_arity("confirmations", &values, 1)?;
            Ok(Command::InsertConfirmation {
                rent_id: parse_ulid_expr(&values[0])?,
            })
        }
        "settlements" => {
            expect_arity("settlements", &values, 2)?;
            Ok(Command::InsertSettlement {
                rent_id: parse_ulid_expr(&values[0])?,
                actual_end: parse_i64_expr(&values[1])?,
            })
        }
        "settlement_runs" => {
            let now = match values.first() {
                Some(expr) => parse_i64_or_null(expr)?,
                None => None,
            };
            Ok(Command::InsertSettlementRun { now })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `(pricing, price_per_half_hour, daily_max_price, monthly_price)`
fn parse_pricing(values: &[Expr]) -> Result<Pricing, SqlError> {
    Ok(Pricing {
        pricing_type: parse_enum(&values[0], PricingType::parse, "pricing type")?,
        price_per_half_hour: parse_i64_expr(&values[1])?,
        daily_max_price: parse_i64_expr(&values[2])?,
        monthly_price: parse_i64_expr(&values[3])?,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "spots" => Ok(Command::DeleteSpot { id }),
        "rents" | "rentals" | "reservations" => Ok(Command::DeleteRent { id }),
        "members" => Ok(Command::DeleteMember { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "spots" => Ok(Command::SelectSpots {
            id: filters.ulid("id")?,
            owner_id: filters.ulid("owner_id")?,
        }),
        "rents" => {
            let filter = if let Some(id) = filters.ulid("id")? {
                RentFilter::Id(id)
            } else if let Some(spot_id) = filters.ulid("spot_id")? {
                RentFilter::Spot(spot_id)
            } else if let Some(renter_id) = filters.ulid("renter_id")? {
                RentFilter::Renter(renter_id)
            } else {
                return Err(SqlError::MissingFilter("id, spot_id or renter_id"));
            };
            Ok(Command::SelectRents { filter })
        }
        "open_rents" => Ok(Command::SelectOpenRents),
        "available_days" => Ok(Command::SelectAvailableDays {
            spot_id: filters.required_ulid("spot_id")?,
        }),
        "availability" | "quote" => {
            let spot_id = filters.required_ulid("spot_id")?;
            let start = filters.start.ok_or(SqlError::MissingFilter("start"))?;
            let end = filters.end.ok_or(SqlError::MissingFilter("end"))?;
            if table == "availability" {
                Ok(Command::SelectAvailability { spot_id, start, end })
            } else {
                Ok(Command::SelectQuote { spot_id, start, end })
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Conjunctive WHERE filters: `col = value` equalities plus `start >= a` / `"end" <= b` bounds.
#[derive(Default)]
struct Filters {
    eq: Vec<(String, Expr)>,
    start: Option<Ms>,
    end: Option<Ms>,
}

impl Filters {
    fn ulid(&self, column: &str) -> Result<Option<Ulid>, SqlError> {
        self.eq
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, e)| parse_ulid_expr(e))
            .transpose()
    }

    fn required_ulid(&self, column: &'static str) -> Result<Ulid, SqlError> {
        self.ulid(column)?.ok_or(SqlError::MissingFilter(column))
    }
}

fn collect_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_filters(inner, filters)?,
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_filters(left, filters)?;
                collect_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => {
                if let Some(col) = expr_column_name(left) {
                    filters.eq.push((col, right.as_ref().clone()));
                }
            }
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("start") {
                    filters.start = Some(parse_i64_expr(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("end") {
                    filters.end = Some(parse_i64_expr(right)?);
                }
            }
            ast::BinaryOperator::Or => {
                return Err(SqlError::Unsupported("OR in WHERE".into()));
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// First VALUES row. Multi-row inserts are rejected: every statement is one transaction.
fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64_expr(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected integer, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_f64_expr(expr: &Expr) -> Result<f64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_f64_expr(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad number {s:?}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_i64_expr(expr).map(Some),
    }
}

/// `'YYYY-MM-DD'`
fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}"))),
        _ => Err(SqlError::Parse(format!("expected date string, got {expr:?}"))),
    }
}

fn parse_enum<T>(expr: &Expr, parse: fn(&str) -> Option<T>, what: &str) -> Result<T, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            parse(s).ok_or_else(|| SqlError::Parse(format!("unknown {what}: {s}")))
        }
        _ => Err(SqlError::Parse(format!("expected {what} string, got {expr:?}"))),
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const B: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn ulid(s: &str) -> Ulid {
        Ulid::from_string(s).unwrap()
    }

    #[test]
    fn parse_insert_spot() {
        let sql = format!(
            "INSERT INTO spots (id, owner_id, kind, pricing, price_per_half_hour, daily_max_price, monthly_price, lat, lng) \
             VALUES ('{A}', '{B}', 'flat', 'hourly', 20, 300, 0, 25.033, -121.5)"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertSpot {
                id: ulid(A),
                owner_id: ulid(B),
                kind: SpotKind::Flat,
                pricing: Pricing {
                    pricing_type: PricingType::Hourly,
                    price_per_half_hour: 20,
                    daily_max_price: 300,
                    monthly_price: 0,
                },
                location: GeoPoint { lat: 25.033, lng: -121.5 },
            }
        );
    }

    #[test]
    fn parse_insert_spot_bad_kind() {
        let sql = format!(
            "INSERT INTO spots VALUES ('{A}', '{B}', 'garage', 'hourly', 20, 300, 0, 0, 0)"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_spot_short_row() {
        let sql = format!("INSERT INTO spots VALUES ('{A}', '{B}', 'flat')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("spots", 9, 3))));
    }

    #[test]
    fn parse_spot_pricing() {
        let sql = format!(
            "INSERT INTO spot_pricing (spot_id, pricing, price_per_half_hour, daily_max_price, monthly_price) \
             VALUES ('{A}', 'monthly', 0, 0, 5000)"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateSpotPricing {
                spot_id: ulid(A),
                pricing: Pricing {
                    pricing_type: PricingType::Monthly,
                    price_per_half_hour: 0,
                    daily_max_price: 0,
                    monthly_price: 5000,
                },
            }
        );
    }

    #[test]
    fn parse_insert_available_day() {
        let sql = format!(
            "INSERT INTO available_days (spot_id, date, is_available) VALUES ('{A}', '2026-10-16', true)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertAvailableDay { spot_id, date, is_available } => {
                assert_eq!(spot_id, ulid(A));
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
                assert!(is_available);
            }
            cmd => panic!("expected InsertAvailableDay, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_available_day_bad_date() {
        let sql = format!("INSERT INTO available_days VALUES ('{A}', '2026-02-30', true)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_rental_and_reservation() {
        let sql = format!(
            r#"INSERT INTO rentals (id, spot_id, renter_id, start, "end") VALUES ('{A}', '{B}', '{A}', 1000, 2000)"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertRental {
                id: ulid(A),
                spot_id: ulid(B),
                renter_id: ulid(A),
                start: 1000,
                end: 2000,
            }
        );

        let sql = format!(
            r#"INSERT INTO reservations (id, spot_id, renter_id, start, "end") VALUES ('{A}', '{B}', '{A}', 1000, 2000)"#
        );
        assert!(matches!(parse_sql(&sql).unwrap(), Command::InsertReservation { .. }));
    }

    #[test]
    fn multi_row_insert_rejected() {
        let sql = format!(
            "INSERT INTO confirmations (rent_id) VALUES ('{A}'), ('{B}')"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_confirmation_and_settlement() {
        let sql = format!("INSERT INTO confirmations (rent_id) VALUES ('{A}')");
        assert_eq!(parse_sql(&sql).unwrap(), Command::InsertConfirmation { rent_id: ulid(A) });

        let sql = format!("INSERT INTO settlements (rent_id, actual_end) VALUES ('{A}', 1792108800000)");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertSettlement {
                rent_id: ulid(A),
                actual_end: 1_792_108_800_000,
            }
        );
    }

    #[test]
    fn parse_settlement_run() {
        let cmd = parse_sql("INSERT INTO settlement_runs (now) VALUES (5000)").unwrap();
        assert_eq!(cmd, Command::InsertSettlementRun { now: Some(5000) });
        let cmd = parse_sql("INSERT INTO settlement_runs (now) VALUES (NULL)").unwrap();
        assert_eq!(cmd, Command::InsertSettlementRun { now: None });
    }

    #[test]
    fn parse_deletes() {
        let sql = format!("DELETE FROM spots WHERE id = '{A}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteSpot { id: ulid(A) });
        let sql = format!("DELETE FROM rents WHERE id = '{A}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteRent { id: ulid(A) });
        let sql = format!("DELETE FROM members WHERE id = '{A}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteMember { id: ulid(A) });
    }

    #[test]
    fn delete_requires_id() {
        let sql = format!("DELETE FROM rents WHERE spot_id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_select_spots() {
        assert_eq!(
            parse_sql("SELECT * FROM spots").unwrap(),
            Command::SelectSpots { id: None, owner_id: None }
        );
        let sql = format!("SELECT * FROM spots WHERE owner_id = '{B}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectSpots { id: None, owner_id: Some(ulid(B)) }
        );
    }

    #[test]
    fn parse_select_rents() {
        let sql = format!("SELECT * FROM rents WHERE renter_id = '{A}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectRents { filter: RentFilter::Renter(ulid(A)) }
        );
        let sql = format!("SELECT * FROM rents WHERE spot_id = '{B}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectRents { filter: RentFilter::Spot(ulid(B)) }
        );
        assert!(matches!(
            parse_sql("SELECT * FROM rents"),
            Err(SqlError::MissingFilter(_))
        ));
        assert_eq!(parse_sql("SELECT * FROM open_rents").unwrap(), Command::SelectOpenRents);
    }

    #[test]
    fn parse_select_availability_and_quote() {
        let sql = format!(
            "SELECT * FROM availability WHERE spot_id = '{A}' AND start >= 1000 AND \"end\" <= 2000"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailability { spot_id: ulid(A), start: 1000, end: 2000 }
        );
        let sql = format!(
            "SELECT * FROM quote WHERE (spot_id = '{A}' AND start >= 1000) AND \"end\" <= 2000"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectQuote { spot_id: ulid(A), start: 1000, end: 2000 }
        );
    }

    #[test]
    fn availability_requires_bounds() {
        let sql = format!("SELECT * FROM availability WHERE spot_id = '{A}' AND start >= 1000");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("end"))));
    }

    #[test]
    fn parse_select_available_days() {
        let sql = format!("SELECT * FROM available_days WHERE spot_id = '{A}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailableDays { spot_id: ulid(A) }
        );
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{A}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
