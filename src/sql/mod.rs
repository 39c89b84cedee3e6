//! Relational access layer.
//!
//! # Data Flow
//! ```text
//! caller (store, handler)
//!     → builder (insert/update/delete/select) assembles SQL text
//!     → Executor::execute: prepare → bind params → step
//!     → QueryResult (rows fetched eagerly) | None (prepare failed) | DbError
//! ```
//!
//! # Design Decisions
//! - SQLite through rusqlite; one connection behind a mutex
//! - Prepare failures come back as `Ok(None)`, execution failures as `Err`
//! - Identifiers (`Ident`) and trusted fragments (`Raw`) are distinct
//!   types from bound values
//! - No retries: every statement is attempted once

pub mod db;
pub mod error;
pub mod ident;
pub mod result;
pub mod table;

pub use db::{ConnectOptions, Db, Executor, Inserts, Order, Session};
pub use error::{DbError, DbResult};
pub use ident::{Ident, Raw};
pub use result::{Params, QueryResult};
pub use table::Table;

pub use rusqlite::types::Value;
