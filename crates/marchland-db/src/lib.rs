//! `PostgreSQL` persistence for the Marchland simulation.
//!
//! [`PgWorldStore`] implements the core's `WorldStore` trait over a
//! [`PostgresPool`]. The schema lives in `migrations/` and is applied with
//! [`PostgresPool::run_migrations`].
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, configuration and migrations
//! - [`world_store`] -- Villages, movements and battle reports
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod world_store;

pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use world_store::PgWorldStore;
