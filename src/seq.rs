//! A durable, monotonically increasing sequence used to mint revisions.
//!
//! The counter lives under the system key `. db_timestamp` and is reserved
//! in batches: the store always holds the ceiling of the current
//! reservation, values are handed out from memory. On restart the counter
//! resumes at the last persisted ceiling, skipping whatever was left of the
//! previous window. That wastes up to one batch of values per restart and
//! in exchange keeps minted values strictly monotone across crashes.

use parking_lot::Mutex;
use redb::ReadableTable;

use crate::db::StoreTable;
use crate::error::{Error, Result};
use crate::keyspace;

/// Name of the system key holding the reservation ceiling.
pub(crate) const SEQ_KEY: &[u8] = b"db_timestamp";

/// How many values one reservation covers.
const RESERVATION: u64 = 512;

/// In-memory window of reserved values, `next` exclusive of `ceiling`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    next: u64,
    ceiling: u64,
}

/// Hands out sequence values, refilling its reservation through whichever
/// write transaction is open at the time.
#[derive(Debug)]
pub(crate) struct SeqAllocator {
    window: Mutex<Window>,
}

impl SeqAllocator {
    /// Reserve the first batch inside the open transaction.
    pub(crate) fn open(table: &mut StoreTable<'_>) -> Result<Self> {
        let window = reserve(table)?;
        Ok(Self {
            window: Mutex::new(window),
        })
    }

    /// The next sequence value, reserving a fresh batch when the window is
    /// exhausted. The reservation write rides `table`'s transaction, so an
    /// abort rolls it back together with every value the caller consumed.
    pub(crate) fn next(&self, table: &mut StoreTable<'_>) -> Result<u64> {
        let mut window = self.window.lock();
        if window.next >= window.ceiling {
            *window = reserve(table)?;
        }
        let value = window.next;
        window.next += 1;
        Ok(value)
    }

    /// Capture the window so a caller can restore it if its transaction
    /// aborts after consuming values.
    pub(crate) fn snapshot(&self) -> Window {
        *self.window.lock()
    }

    pub(crate) fn restore(&self, window: Window) {
        *self.window.lock() = window;
    }
}

fn reserve(table: &mut StoreTable<'_>) -> Result<Window> {
    let key = keyspace::sys_key(SEQ_KEY);
    let stored = match table.get(key.as_slice())? {
        Some(guard) => {
            let raw: [u8; 8] = guard
                .value()
                .try_into()
                .map_err(|_| Error::Corrupt("sequence counter is not 8 bytes".into()))?;
            u64::from_be_bytes(raw)
        }
        None => 0,
    };
    let ceiling = stored
        .checked_add(RESERVATION)
        .ok_or_else(|| Error::Corrupt("sequence counter overflow".into()))?;
    table.insert(key.as_slice(), ceiling.to_be_bytes().as_slice())?;
    Ok(Window {
        next: stored,
        ceiling,
    })
}

#[cfg(test)]
mod tests {
    use redb::Database;

    use super::*;
    use crate::db::STORE_TABLE;

    #[test]
    fn monotone_within_and_across_windows() -> anyhow::Result<()> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let tx = db.begin_write()?;
        {
            let mut table = tx.open_table(STORE_TABLE)?;
            let seq = SeqAllocator::open(&mut table)?;
            let mut last = None;
            // enough values to cross a reservation boundary
            for _ in 0..(RESERVATION + 10) {
                let value = seq.next(&mut table)?;
                if let Some(last) = last {
                    assert!(value > last);
                }
                last = Some(value);
            }
        }
        tx.commit()?;
        Ok(())
    }

    #[test]
    fn reopen_skips_to_ceiling() -> anyhow::Result<()> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;

        let tx = db.begin_write()?;
        {
            let mut table = tx.open_table(STORE_TABLE)?;
            let seq = SeqAllocator::open(&mut table)?;
            assert_eq!(seq.next(&mut table)?, 0);
            assert_eq!(seq.next(&mut table)?, 1);
        }
        tx.commit()?;

        // a second allocator resumes above the reserved ceiling, not above
        // the last used value
        let tx = db.begin_write()?;
        {
            let mut table = tx.open_table(STORE_TABLE)?;
            let seq = SeqAllocator::open(&mut table)?;
            assert_eq!(seq.next(&mut table)?, RESERVATION);
        }
        tx.commit()?;
        Ok(())
    }

    #[test]
    fn snapshot_restore() -> anyhow::Result<()> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let tx = db.begin_write()?;
        {
            let mut table = tx.open_table(STORE_TABLE)?;
            let seq = SeqAllocator::open(&mut table)?;
            let before = seq.snapshot();
            assert_eq!(seq.next(&mut table)?, 0);
            seq.restore(before);
            assert_eq!(seq.next(&mut table)?, 0);
        }
        tx.commit()?;
        Ok(())
    }
}
