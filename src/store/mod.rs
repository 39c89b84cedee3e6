//! Data-access helpers built on SQL tables.
//!
//! - [`KvStore`]: string keys to scalar or JSON values, with list and
//!   counter operations
//! - [`DocStore`]: compressed JSON documents with joinable index tables
//!
//! Both hold an `Arc<Db>` and can be cloned freely into handlers.

pub mod codec;
pub mod docstore;
pub mod kv;

pub use docstore::{DocQuery, DocRecord, DocStore};
pub use kv::KvStore;
