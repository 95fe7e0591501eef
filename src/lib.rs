//! An embedded JSON document database with materialized views.
//!
//! Documents are JSON objects addressed by a string `id` field and stored
//! in [`redb`], an embedded ordered key-value store backed by a single
//! file (or by memory, for tests). A `rev` field managed by the database
//! provides optimistic concurrency: every [`put`](Db::put) checks the
//! supplied revision against the stored one and mints a fresh, strictly
//! increasing token from a durable sequence.
//!
//! *Views* are named, pure functions from a document to any number of
//! `(index key, index value)` pairs. They are declared once right after
//! opening and are maintained inside the same transaction as every
//! insert, update and delete, so a view is never out of sync with the
//! documents. A [`Query`] scans a half-open range of either the document
//! id space or a view's index space, with prefix, skip and limit.
//!
//! # Example
//!
//! ```
//! # fn main() -> berth::Result<()> {
//! use berth::{Db, Query, View};
//!
//! let mut db = Db::memory()?;
//! db.add_view(View::new("tags", |emitter, _id, doc| {
//!     if let Ok(doc) = serde_json::from_slice::<serde_json::Value>(doc) {
//!         if let Some(tags) = doc.get("tags").and_then(|tags| tags.as_array()) {
//!             for tag in tags.iter().filter_map(|tag| tag.as_str()) {
//!                 emitter.emit(tag.as_bytes(), []);
//!             }
//!         }
//!     }
//! }));
//!
//! db.put(&[serde_json::json!({
//!     "id": "CMNT::001",
//!     "rev": "",
//!     "by": "Frodo",
//!     "tags": ["tech", "golang"],
//! })])?;
//!
//! let (rows, _count) = db.query(&Query::view("tags").start("tech"))?;
//! assert_eq!(rows[0].key.as_ref(), b"CMNT::001");
//! assert_eq!(rows[0].index.as_deref(), Some(&b"tech"[..]));
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

mod db;
mod doc;
mod error;
mod keyspace;
mod query;
mod seq;
mod view;

pub use self::db::{Db, Kv, Options};
pub use self::error::{Error, Result};
pub use self::query::{Query, Res, DEFAULT_LIMIT};
pub use self::view::{Emitter, View, ViewFn};
