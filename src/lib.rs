pub mod auth;
pub mod clock;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod limits;
pub mod model;
pub mod observability;
pub mod pricing;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
