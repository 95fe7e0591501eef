//! Views: user-defined secondary indexes maintained on every write.
//!
//! A view is a named, pure function from a document to a set of
//! `(index key, index value)` pairs. Each emitted pair materializes twice:
//!
//! * a forward entry `^ H > ^ id ^ indexKey` whose value is the inverse
//!   key, letting maintenance enumerate one document's contributions, and
//! * an inverse entry `^ H < ^ indexKey ^ id` whose value is the emitted
//!   index value, letting queries scan by index key across documents.
//!
//! Neither direction alone supports both incremental maintenance and
//! querying without scanning the whole view.

use redb::ReadableTable;

use crate::db::StoreTable;
use crate::error::Result;
use crate::keyspace::{self, ViewHash};

/// The function a view runs over each document.
///
/// It receives the document id and the stored JSON bytes, and emits any
/// number of index entries. It must be pure: same document in, same
/// emissions out, no side effects.
pub type ViewFn = Box<dyn Fn(&mut Emitter, &[u8], &[u8]) + Send + Sync + 'static>;

/// A named secondary index over the documents in a [`Db`](crate::Db).
///
/// Views are declared with [`Db::add_view`](crate::Db::add_view) right
/// after opening, before the first write. Their entries are rewritten
/// inside the same transaction as every document insert, update and
/// delete.
#[derive(derive_more::Debug)]
pub struct View {
    name: String,
    hash: ViewHash,
    #[debug(skip)]
    func: ViewFn,
}

impl View {
    /// Create a view from a name and its index function.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Emitter, &[u8], &[u8]) + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "view name must not be empty");
        let hash = keyspace::view_hash(&name);
        Self {
            name,
            hash,
            func: Box::new(func),
        }
    }

    /// The name the view was declared with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn hash(&self) -> ViewHash {
        self.hash
    }
}

/// Collects the index entries a view emits for one document.
///
/// An emitter lives for a single `(document, view)` build inside a write
/// transaction; its buffer is drained into the transaction afterwards.
#[derive(Debug, Default)]
pub struct Emitter {
    emitted: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Emitter {
    /// Emit one index entry. The value may be empty.
    ///
    /// Emitting the same index key twice for one document collapses to the
    /// last emission.
    pub fn emit(&mut self, index_key: impl AsRef<[u8]>, index_value: impl AsRef<[u8]>) {
        self.emitted.push((
            index_key.as_ref().to_vec(),
            index_value.as_ref().to_vec(),
        ));
    }
}

/// Make `view`'s entries for `id` reflect the current document state.
///
/// Prior contributions are removed through the forward entries; when `doc`
/// is `None` (a deletion) that is all. Otherwise the view function runs
/// and the fresh forward/inverse pairs are written.
pub(crate) fn build(
    view: &View,
    table: &mut StoreTable<'_>,
    id: &[u8],
    doc: Option<&[u8]>,
) -> Result<()> {
    let prefix = keyspace::forward_prefix(view.hash, id);

    let mut stale: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    {
        let range = table.range::<&[u8]>(prefix.as_slice()..)?;
        for row in range {
            let (key, value) = row?;
            let key = key.value();
            if !key.starts_with(&prefix) {
                break;
            }
            stale.push((key.to_vec(), value.value().to_vec()));
        }
    }
    for (forward, inverse) in stale {
        table.remove(forward.as_slice())?;
        table.remove(inverse.as_slice())?;
    }

    let Some(doc) = doc else {
        return Ok(());
    };

    let mut emitter = Emitter::default();
    (view.func)(&mut emitter, id, doc);

    for (index_key, index_value) in emitter.emitted {
        let forward = keyspace::forward_key(view.hash, id, &index_key);
        let inverse = keyspace::inverse_key(view.hash, &index_key, id);
        table.insert(forward.as_slice(), inverse.as_slice())?;
        table.insert(inverse.as_slice(), index_value.as_slice())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_collects_in_order() {
        let mut emitter = Emitter::default();
        emitter.emit(b"b", b"2");
        emitter.emit(b"a", []);
        assert_eq!(
            emitter.emitted,
            vec![(b"b".to_vec(), b"2".to_vec()), (b"a".to_vec(), Vec::new())]
        );
    }

    #[test]
    #[should_panic(expected = "view name must not be empty")]
    fn empty_name_panics() {
        View::new("", |_, _, _| {});
    }
}
