//! Range queries over the document space or a view's index space.

use bytes::Bytes;
use redb::ReadableTable;

use crate::error::Result;
use crate::keyspace::{self, ParsedKey};

/// Results per query unless [`Query::limit`] says otherwise.
pub const DEFAULT_LIMIT: usize = 100;

/// Describes a scan over a half-open range of keys.
///
/// Without a view the scan covers document ids; with a view it covers the
/// view's index keys. `start` seeks, `prefix` bounds the scan (defaulting
/// to `start`, or to the whole view when a view is queried), and `end`
/// drops entries strictly greater than it — an entry equal to `end` is
/// still returned.
#[derive(Debug, Clone, Default)]
pub struct Query {
    view: Option<String>,
    start: Bytes,
    end: Option<Bytes>,
    prefix: Option<Bytes>,
    skip: usize,
    limit: Option<usize>,
    count: bool,
}

impl Query {
    /// Query the document space.
    pub fn all() -> Self {
        Self::default()
    }

    /// Query the named view's index space.
    pub fn view(name: impl Into<String>) -> Self {
        Self {
            view: Some(name.into()),
            ..Self::default()
        }
    }

    /// Seek to the first key at or after `start`.
    pub fn start(mut self, start: impl Into<Bytes>) -> Self {
        self.start = start.into();
        self
    }

    /// Drop entries whose key is strictly greater than `end`.
    ///
    /// In the document space an entry equal to `end` is still returned. In
    /// a view the stored key carries the document id behind the index key,
    /// so an `end` equal to an index key excludes that index key's
    /// entries; append a high byte to include them.
    pub fn end(mut self, end: impl Into<Bytes>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Only return entries whose key starts with `prefix`.
    pub fn prefix(mut self, prefix: impl Into<Bytes>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Discard the first `skip` matches.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Return at most `limit` entries instead of [`DEFAULT_LIMIT`].
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Count matches instead of materializing them.
    ///
    /// Counting visits every key in prefix range past `skip`, ignoring
    /// both `limit` and `end`; the result list comes back empty. Callers
    /// wanting an end-bounded count must bound the prefix instead.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// One row of a query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Res {
    /// The document id.
    pub key: Bytes,
    /// The stored value: document JSON for document-space queries, the
    /// emitted index value for view queries.
    pub value: Bytes,
    /// The index key that matched, for view queries.
    pub index: Option<Bytes>,
}

/// Run `query` against the flat store, returning the materialized rows and
/// the count (the number of rows, or the visit count in counting mode).
pub(crate) fn run(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    query: &Query,
) -> Result<(Vec<Res>, usize)> {
    let bounds = keyspace::scan_bounds(
        query.view.as_deref(),
        &query.start,
        query.end.as_deref(),
        query.prefix.as_deref(),
    );

    let mut res = Vec::new();
    let mut visited = 0usize;
    let mut skip = query.skip as i64;
    let mut remaining = query.limit.unwrap_or(DEFAULT_LIMIT) as i64;

    for row in table.range::<&[u8]>(bounds.start.as_slice()..)? {
        let (key, value) = row?;
        let key = key.value();
        if !key.starts_with(&bounds.prefix) {
            break;
        }
        skip -= 1;
        if skip >= 0 {
            continue;
        }
        if query.count {
            visited += 1;
            continue;
        }
        if remaining <= 0 {
            break;
        }
        remaining -= 1;
        if let Some(end) = &bounds.end {
            // an entry equal to `end` is included; entries past it still
            // consume limit, as they always have
            if key > end.as_slice() {
                continue;
            }
        }
        res.push(to_res(key, value.value()));
    }

    let count = if query.count { visited } else { res.len() };
    Ok((res, count))
}

fn to_res(key: &[u8], value: &[u8]) -> Res {
    let value = Bytes::copy_from_slice(value);
    match keyspace::parse_key(key) {
        ParsedKey::Doc { id } => Res {
            key: Bytes::copy_from_slice(id),
            value,
            index: None,
        },
        ParsedKey::View { index, key } => Res {
            key: Bytes::copy_from_slice(key),
            value,
            index: Some(Bytes::copy_from_slice(index)),
        },
        ParsedKey::Other => Res {
            key: Bytes::copy_from_slice(key),
            value,
            index: None,
        },
    }
}
