use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::RentStatus;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The spot has a rental running right now.
    ActiveRentConflict(Ulid),
    /// The requested window touches or overlaps this rent.
    TimeOverlap(Ulid),
    DateNotAvailable(NaiveDate),
    SpotNotAvailable(Ulid),
    SpotInUse(Ulid),
    AlreadySettled(Ulid),
    InvalidStatus {
        id: Ulid,
        status: RentStatus,
    },
    NotStarted(Ulid),
    Forbidden,
    InvalidTime(&'static str),
    InvalidPricing(String),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
    /// A transaction body panicked; nothing was written.
    Internal,
}

impl EngineError {
    /// Stable machine-readable kind, independent of the message text.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::AlreadyExists(_) => "ALREADY_EXISTS",
            EngineError::ActiveRentConflict(_) => "ACTIVE_RENT_CONFLICT",
            EngineError::TimeOverlap(_) => "TIME_OVERLAP",
            EngineError::DateNotAvailable(_) => "DATE_NOT_AVAILABLE",
            EngineError::SpotNotAvailable(_) => "SPOT_NOT_AVAILABLE",
            EngineError::SpotInUse(_) => "SPOT_IN_USE",
            EngineError::AlreadySettled(_) => "ALREADY_SETTLED",
            EngineError::InvalidStatus { .. } => "INVALID_STATUS",
            EngineError::NotStarted(_) => "NOT_STARTED",
            EngineError::Forbidden => "FORBIDDEN",
            EngineError::InvalidTime(_) => "INVALID_TIME",
            EngineError::InvalidPricing(_) => "INVALID_PRICING",
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::WalError(_) => "WAL_ERROR",
            EngineError::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.code();
        match self {
            EngineError::NotFound(id) => write!(f, "{code}: not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "{code}: already exists: {id}"),
            EngineError::ActiveRentConflict(id) => {
                write!(f, "{code}: spot is occupied by running rent {id}")
            }
            EngineError::TimeOverlap(id) => write!(f, "{code}: window conflicts with rent {id}"),
            EngineError::DateNotAvailable(date) => {
                write!(f, "{code}: spot is not offered on {date}")
            }
            EngineError::SpotNotAvailable(id) => write!(f, "{code}: spot {id} cannot be booked"),
            EngineError::SpotInUse(id) => write!(f, "{code}: spot {id} still has open rents"),
            EngineError::AlreadySettled(id) => write!(f, "{code}: rent {id} is already settled"),
            EngineError::InvalidStatus { id, status } => {
                write!(f, "{code}: rent {id} is {}", status.as_str())
            }
            EngineError::NotStarted(id) => write!(f, "{code}: reservation {id} has not started"),
            EngineError::Forbidden => write!(f, "{code}: caller may not modify this rent"),
            EngineError::InvalidTime(msg) => write!(f, "{code}: {msg}"),
            EngineError::InvalidPricing(msg) => write!(f, "{code}: {msg}"),
            EngineError::InvalidInput(msg) => write!(f, "{code}: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "{code}: limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "{code}: WAL error: {e}"),
            EngineError::Internal => write!(f, "{code}: internal error"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::pricing::PricingError> for EngineError {
    fn from(e: crate::pricing::PricingError) -> Self {
        match e {
            crate::pricing::PricingError::EndBeforeStart => {
                EngineError::InvalidTime("actual end precedes start")
            }
            other => EngineError::InvalidPricing(other.to_string()),
        }
    }
}
