//! The database facade: open, put, get, delete, query, delete_view.

use std::path::PathBuf;

use bytes::Bytes;
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::doc;
use crate::error::{Error, Result};
use crate::keyspace::{self, ParsedKey};
use crate::query::{self, Query, Res};
use crate::seq::SeqAllocator;
use crate::view::{self, View};

/// The single flat table every subspace lives in.
pub(crate) const STORE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("berth-v1");

/// The write-mode handle to [`STORE_TABLE`] inside an open transaction.
pub(crate) type StoreTable<'txn> = redb::Table<'txn, &'static [u8], &'static [u8]>;

/// Name of the internal view tracking each document's latest revision.
const REV_VIEW: &str = "view_db_timestamp";

/// File name of the store inside [`Options::dir`].
const STORE_FILE: &str = "berth.redb";

/// Parameters for opening a persistent database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory the store file lives in. Must exist and be writable.
    pub dir: PathBuf,
}

/// A document id paired with its stored JSON, as returned by [`Db::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kv {
    /// The document id.
    pub key: Bytes,
    /// The stored document JSON.
    pub value: Bytes,
}

/// An embedded JSON document database with materialized views.
///
/// Documents are JSON objects with string `id` and `rev` fields; the id is
/// the permanent external identity, the revision is managed by the
/// database and checked on every [`put`](Db::put) (optimistic
/// concurrency). Views declared with [`add_view`](Db::add_view) are kept
/// in sync transactionally with every write.
///
/// Every operation runs under a single storage transaction: a failing call
/// leaves no partial state behind.
#[derive(Debug)]
pub struct Db {
    db: Database,
    views: Vec<View>,
    rev_view: View,
    seq: SeqAllocator,
}

impl Db {
    /// Open (or create) a persistent database in `options.dir`.
    pub fn open(options: Options) -> Result<Self> {
        let path = options.dir.join(STORE_FILE);
        info!("opening document database at {}", path.display());
        let db = Database::create(&path)?;
        Self::new_impl(db)
    }

    /// Open a fresh in-memory database, mainly for tests.
    pub fn memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::new_impl(db)
    }

    fn new_impl(db: Database) -> Result<Self> {
        let tx = db.begin_write()?;
        let seq = {
            let mut table = tx.open_table(STORE_TABLE)?;
            SeqAllocator::open(&mut table)?
        };
        tx.commit()?;
        Ok(Self {
            db,
            views: Vec::new(),
            rev_view: rev_view(),
            seq,
        })
    }

    /// Close the database.
    ///
    /// The unused tail of the current sequence reservation is abandoned;
    /// the next open resumes above the persisted ceiling.
    pub fn close(self) -> Result<()> {
        Ok(())
    }

    /// Declare a view.
    ///
    /// Views must be declared right after opening, before the first write.
    /// Documents written before a view was declared are not indexed by it.
    pub fn add_view(&mut self, view: View) {
        self.views.push(view);
    }

    /// Store documents, atomically across the whole batch.
    ///
    /// Each document must serialize to a JSON object with a string `id`
    /// and a string `rev`. An empty `rev` creates the document; a
    /// non-empty `rev` must equal the stored revision (compare-and-swap),
    /// otherwise the call fails with [`Error::NoMatchRev`]. On success
    /// every document carries a fresh revision and all views are updated.
    pub fn put<D: Serialize>(&self, docs: &[D]) -> Result<()> {
        let mut raw = Vec::with_capacity(docs.len());
        for doc in docs {
            raw.push(serde_json::to_vec(doc)?);
        }
        self.put_raw(&raw)
    }

    /// Like [`put`](Db::put), for documents already serialized to JSON.
    pub fn put_raw<B: AsRef<[u8]>>(&self, docs: &[B]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        trace!(docs = docs.len(), "put");
        let tx = self.db.begin_write()?;
        // the snapshot is taken and restored while this transaction holds
        // the store's writer lock: an abort must not leave the sequence
        // window ahead of what the store ever saw
        let window = self.seq.snapshot();
        let res = (|| -> Result<()> {
            let mut table = tx.open_table(STORE_TABLE)?;
            let mut built = Vec::with_capacity(docs.len());
            for doc in docs {
                let mut fields = doc::inspect(doc.as_ref())?;

                let stored = stored_rev(&table, self.rev_view.hash(), fields.id.as_bytes())?;
                match &stored {
                    None if !fields.rev.is_empty() => return Err(Error::NoMatchRev),
                    Some(current) if current.as_slice() != fields.rev.as_bytes() => {
                        return Err(Error::NoMatchRev)
                    }
                    _ => {}
                }

                let rev = format!("{:016x}", self.seq.next(&mut table)?);
                doc::set_rev(&mut fields.value, &rev);
                let json = serde_json::to_vec(&fields.value)?;

                table.insert(
                    keyspace::doc_key(fields.id.as_bytes()).as_slice(),
                    json.as_slice(),
                )?;
                // the revision view must reflect this document before a
                // later document of the same batch can check against it
                view::build(&self.rev_view, &mut table, fields.id.as_bytes(), Some(&json[..]))?;
                built.push((fields.id, json));
            }
            for (id, json) in &built {
                for v in &self.views {
                    view::build(v, &mut table, id.as_bytes(), Some(&json[..]))?;
                }
            }
            Ok(())
        })();
        match res {
            Ok(()) => match tx.commit() {
                Ok(()) => Ok(()),
                Err(err) => {
                    self.seq.restore(window);
                    Err(err.into())
                }
            },
            Err(err) => {
                self.seq.restore(window);
                drop(tx);
                Err(err)
            }
        }
    }

    /// Fetch documents by id.
    ///
    /// Fails with [`Error::KeyNotFound`] if any id is absent; partial
    /// results are not returned.
    pub fn get<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Kv>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.db.begin_read()?;
        let table = tx.open_table(STORE_TABLE)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            let key = keyspace::doc_key(id.as_bytes());
            let Some(value) = table.get(key.as_slice())? else {
                return Err(Error::KeyNotFound { id: id.to_string() });
            };
            out.push(Kv {
                key: Bytes::copy_from_slice(id.as_bytes()),
                value: Bytes::copy_from_slice(value.value()),
            });
        }
        Ok(out)
    }

    /// Delete documents by id, atomically across the whole batch.
    ///
    /// Removes the documents and every view entry they contributed,
    /// including their revision tracking. Absent ids are not an error.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        trace!(ids = ids.len(), "delete");
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(STORE_TABLE)?;
            for id in ids {
                table.remove(keyspace::doc_key(id.as_ref().as_bytes()).as_slice())?;
            }
            for id in ids {
                let id = id.as_ref().as_bytes();
                view::build(&self.rev_view, &mut table, id, None)?;
                for v in &self.views {
                    view::build(v, &mut table, id, None)?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Run a range query over the document space or a view.
    ///
    /// Returns the materialized rows and a count: the number of rows, or —
    /// when [`Query::count`] is set — the number of matching positions
    /// with no rows materialized.
    pub fn query(&self, query: &Query) -> Result<(Vec<Res>, usize)> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(STORE_TABLE)?;
        query::run(&table, query)
    }

    /// Erase all stored data of the named view.
    ///
    /// The view stays declared: documents written afterwards are indexed
    /// again, but documents already in the database are not re-indexed.
    pub fn delete_view(&self, name: &str) -> Result<()> {
        debug!(view = %name, "deleting view data");
        let prefix = keyspace::view_prefix(keyspace::view_hash(name));
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(STORE_TABLE)?;
            let mut stale: Vec<Vec<u8>> = Vec::new();
            {
                let range = table.range::<&[u8]>(prefix.as_slice()..)?;
                for row in range {
                    let (key, value) = row?;
                    let key = key.value();
                    if !key.starts_with(&prefix) {
                        break;
                    }
                    stale.push(key.to_vec());
                    // forward values point at the inverse key to drop
                    if keyspace::is_forward_key(key) {
                        stale.push(value.value().to_vec());
                    }
                }
            }
            for key in stale {
                table.remove(key.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Every raw key/value pair in the store, for residue checks in tests.
    #[cfg(test)]
    pub(crate) fn dump_raw(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(STORE_TABLE)?;
        let mut out = Vec::new();
        for row in table.range::<&[u8]>(..)? {
            let (key, value) = row?;
            out.push((key.value().to_vec(), value.value().to_vec()));
        }
        Ok(out)
    }
}

/// The internal view that exposes, per document id, its latest revision.
///
/// It emits the document's `rev` field — freshly set by the put path — as
/// its only index key, so the stored revision is answered by an ordinary
/// bounded scan of this view's forward entries.
fn rev_view() -> View {
    View::new(REV_VIEW, |emitter, _id, doc| {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(doc) {
            if let Some(rev) = value.get("rev").and_then(|rev| rev.as_str()) {
                emitter.emit(rev.as_bytes(), []);
            }
        }
    })
}

/// Look up the stored revision of `id` through the revision view's forward
/// entries: a prefix scan of `^ H > ^ id ^` with limit 1.
fn stored_rev(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    hash: keyspace::ViewHash,
    id: &[u8],
) -> Result<Option<Vec<u8>>> {
    let prefix = keyspace::forward_prefix(hash, id);
    let mut range = table.range::<&[u8]>(prefix.as_slice()..)?;
    let Some(row) = range.next() else {
        return Ok(None);
    };
    let (key, _value) = row?;
    let key = key.value();
    if !key.starts_with(&prefix) {
        return Ok(None);
    }
    match keyspace::parse_key(key) {
        ParsedKey::View { key: rev, .. } => Ok(Some(rev.to_vec())),
        _ => Ok(None),
    }
}
