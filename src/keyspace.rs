//! Layout of the flat, byte-ordered key namespace.
//!
//! Documents, view index entries and system singletons all live in one
//! ordered table, disambiguated by a leading marker byte:
//!
//! * `& id` — the document subspace, value is the document JSON
//! * `^ H > ^ id ^ indexKey` — a view's forward entries, value is the
//!   matching inverse key
//! * `^ H < ^ indexKey ^ id` — a view's inverse entries, value is the
//!   user-supplied index value
//! * `. name` — system keys (the sequence counter)
//!
//! `H` is the raw 8-byte FNV-1a/64 of the view name. It is fixed-width, so
//! keys parse from fixed offsets and a hash byte that happens to collide
//! with a marker byte is harmless. Document ids are rejected on ingress if
//! they contain any marker byte, which keeps scan correctness a plain
//! byte-prefix check.

/// Document subspace marker.
pub(crate) const DOC_SPACE: u8 = b'&';
/// View subspace marker, also the field separator inside view keys.
pub(crate) const VIEW_SPACE: u8 = b'^';
/// System subspace marker.
pub(crate) const SYS_SPACE: u8 = b'.';
/// Direction byte of forward (document to index key) entries.
pub(crate) const FORWARD: u8 = b'>';
/// Direction byte of inverse (index key to document) entries.
pub(crate) const INVERSE: u8 = b'<';

/// Bytes that may not appear in a document id.
pub(crate) const RESERVED: [u8; 5] = [VIEW_SPACE, DOC_SPACE, SYS_SPACE, FORWARD, INVERSE];

/// Offset of the direction byte in a view key: marker plus 8 hash bytes.
const DIRECTION_OFFSET: usize = 9;
/// Offset of the first field separator in a view key.
const BODY_OFFSET: usize = 10;

/// The raw 8-byte FNV-1a/64 of a view name, used as its physical prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ViewHash([u8; 8]);

impl ViewHash {
    pub(crate) fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl std::fmt::Debug for ViewHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ViewHash({})", hex::encode(self.0))
    }
}

/// Hash a view name to its physical prefix.
pub(crate) fn view_hash(name: &str) -> ViewHash {
    ViewHash(fnv1a64(name.as_bytes()).to_be_bytes())
}

fn fnv1a64(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub(crate) fn doc_key(id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + id.len());
    key.push(DOC_SPACE);
    key.extend_from_slice(id);
    key
}

pub(crate) fn sys_key(name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(SYS_SPACE);
    key.extend_from_slice(name);
    key
}

/// Prefix covering both directions of a view: `^ H`.
pub(crate) fn view_prefix(hash: ViewHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(DIRECTION_OFFSET);
    key.push(VIEW_SPACE);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Prefix of a view's inverse subspace: `^ H <`.
pub(crate) fn inverse_prefix(hash: ViewHash) -> Vec<u8> {
    let mut key = view_prefix(hash);
    key.push(INVERSE);
    key
}

/// Prefix selecting one document's forward entries: `^ H > ^ id ^`.
///
/// The trailing separator is part of the prefix so that entries of a
/// document whose id merely extends `id` are not swept up.
pub(crate) fn forward_prefix(hash: ViewHash, id: &[u8]) -> Vec<u8> {
    let mut key = view_prefix(hash);
    key.push(FORWARD);
    key.push(VIEW_SPACE);
    key.extend_from_slice(id);
    key.push(VIEW_SPACE);
    key
}

/// Forward entry key: `^ H > ^ id ^ indexKey`.
pub(crate) fn forward_key(hash: ViewHash, id: &[u8], index_key: &[u8]) -> Vec<u8> {
    let mut key = forward_prefix(hash, id);
    key.extend_from_slice(index_key);
    key
}

/// Inverse entry key: `^ H < ^ indexKey ^ id`.
pub(crate) fn inverse_key(hash: ViewHash, index_key: &[u8], id: &[u8]) -> Vec<u8> {
    let mut key = inverse_prefix(hash);
    key.push(VIEW_SPACE);
    key.extend_from_slice(index_key);
    key.push(VIEW_SPACE);
    key.extend_from_slice(id);
    key
}

/// Whether a raw key is a forward entry of some view.
pub(crate) fn is_forward_key(key: &[u8]) -> bool {
    key.first() == Some(&VIEW_SPACE) && key.get(DIRECTION_OFFSET) == Some(&FORWARD)
}

/// A raw store key decoded into its logical parts.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ParsedKey<'a> {
    /// A document key; `id` is the key with the marker stripped.
    Doc { id: &'a [u8] },
    /// A view entry. For inverse entries `index` is the emitted index key
    /// and `key` the document id; for forward entries the fields come out
    /// mirrored (`index` = id, `key` = index key), which is exactly what
    /// the revision lookup wants.
    View { index: &'a [u8], key: &'a [u8] },
    /// Anything else (system keys, malformed view keys).
    Other,
}

pub(crate) fn parse_key(key: &[u8]) -> ParsedKey<'_> {
    match key.first() {
        Some(&DOC_SPACE) => ParsedKey::Doc { id: &key[1..] },
        Some(&VIEW_SPACE) if key.len() > BODY_OFFSET + 1 && key[BODY_OFFSET] == VIEW_SPACE => {
            let body = &key[BODY_OFFSET + 1..];
            match key[DIRECTION_OFFSET] {
                // forward: `id ^ indexKey`, the id cannot contain separators
                FORWARD => match body.iter().position(|&b| b == VIEW_SPACE) {
                    Some(at) => ParsedKey::View {
                        index: &body[..at],
                        key: &body[at + 1..],
                    },
                    None => ParsedKey::Other,
                },
                // inverse: `indexKey ^ id`, the index key may contain anything
                INVERSE => match body.iter().rposition(|&b| b == VIEW_SPACE) {
                    Some(at) => ParsedKey::View {
                        index: &body[..at],
                        key: &body[at + 1..],
                    },
                    None => ParsedKey::Other,
                },
                _ => ParsedKey::Other,
            }
        }
        _ => ParsedKey::Other,
    }
}

/// Byte bounds of a query scan: seek to `start`, advance while the key
/// starts with `prefix`, and skip entries greater than `end` if set.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ScanBounds {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
    pub prefix: Vec<u8>,
}

pub(crate) fn scan_bounds(
    view: Option<&str>,
    start: &[u8],
    end: Option<&[u8]>,
    prefix: Option<&[u8]>,
) -> ScanBounds {
    match view {
        None => {
            let start = doc_key(start);
            ScanBounds {
                end: end.map(doc_key),
                prefix: prefix.map(doc_key).unwrap_or_else(|| start.clone()),
                start,
            }
        }
        Some(name) => {
            let base = inverse_prefix(view_hash(name));
            let bounded = |part: &[u8]| {
                let mut key = base.clone();
                key.push(VIEW_SPACE);
                key.extend_from_slice(part);
                key
            };
            ScanBounds {
                start: bounded(start),
                end: end.map(bounded),
                prefix: prefix.map(bounded).unwrap_or_else(|| base.clone()),
            }
        }
    }
}
