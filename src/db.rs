// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of OpenEthereum.

// OpenEthereum is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// OpenEthereum is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with OpenEthereum.  If not, see <http://www.gnu.org/licenses/>.

//! Content-addressed overlay database.
//!
//! Writes accumulate in an in-memory journal above a durable `kvdb`
//! backend. `commit()` flushes the journal as a single backend transaction;
//! dropping the overlay (or calling [`OverlayDb::rollback`]) discards it.
//! Keys are the keccak of the stored blob, so duplicate payloads collapse
//! to one entry and stale journal entries are harmless.

use std::{collections::HashMap, sync::Arc};

use ethereum_types::H256;
use keccak_hash::keccak;
use kvdb::{DBValue, KeyValueDB};
use kvdb_rocksdb::{Database, DatabaseConfig};
use log::trace;
use parking_lot::RwLock;

use crate::error::Error;

/// Column holding state trie nodes and code blobs.
pub const COL_STATE: u32 = 0;
/// Number of columns the backend is opened with.
pub const NUM_COLUMNS: u32 = 1;

/// Journal of uncommitted writes over a shared key-value backend.
///
/// Clones share both the backend and the journal: two `State` copies over
/// one overlay observe each other's uncommitted trie nodes, as the engine's
/// copy semantics require. The backend owns its own concurrency; the
/// journal is guarded here.
#[derive(Clone)]
pub struct OverlayDb {
    backend: Arc<dyn KeyValueDB>,
    journal: Arc<RwLock<HashMap<H256, DBValue>>>,
}

impl OverlayDb {
    /// Overlay over the given backend.
    pub fn new(backend: Arc<dyn KeyValueDB>) -> Self {
        OverlayDb {
            backend,
            journal: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Overlay over a fresh transient in-memory backend.
    pub fn new_transient() -> Self {
        Self::new(Arc::new(kvdb_memorydb::create(NUM_COLUMNS)))
    }

    /// Look a blob up, journal first, then backend.
    pub fn get(&self, key: &H256) -> Result<Option<DBValue>, Error> {
        if let Some(value) = self.journal.read().get(key) {
            return Ok(Some(value.clone()));
        }
        self.backend
            .get(COL_STATE, key.as_bytes())
            .map_err(Into::into)
    }

    /// Whether a blob exists under `key`.
    pub fn contains(&self, key: &H256) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }

    /// Journal `value` under its keccak and return the key.
    pub fn insert(&self, value: &[u8]) -> H256 {
        let key = keccak(value);
        self.journal.write().insert(key, value.to_vec());
        key
    }

    /// Journal `value` under an externally computed `key`. The key is
    /// expected to be the keccak of the value.
    pub fn emplace(&self, key: H256, value: DBValue) {
        self.journal.write().insert(key, value);
    }

    /// Flush the journal to the backend in one transaction and clear it.
    pub fn commit(&self) -> Result<(), Error> {
        let mut journal = self.journal.write();
        if journal.is_empty() {
            return Ok(());
        }
        let mut transaction = self.backend.transaction();
        for (key, value) in journal.iter() {
            transaction.put(COL_STATE, key.as_bytes(), value);
        }
        self.backend.write(transaction)?;
        trace!(target: "db", "committed {} journal entries", journal.len());
        journal.clear();
        Ok(())
    }

    /// Discard every uncommitted write.
    pub fn rollback(&self) {
        self.journal.write().clear();
    }

    /// Number of journalled (uncommitted) entries.
    pub fn journal_len(&self) -> usize {
        self.journal.read().len()
    }
}

/// Open a durable overlay at `path`, creating the store if absent. An empty
/// `path` selects a default location under the user data directory. With
/// `kill_existing` any store already at the path is deleted first.
pub fn open_db(path: &str, kill_existing: bool) -> Result<OverlayDb, Error> {
    let path = if path.is_empty() {
        let mut dir = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        dir.push("ledger-state");
        dir
    } else {
        path.into()
    };
    if kill_existing {
        let _ = std::fs::remove_dir_all(&path);
    }
    let config = DatabaseConfig::with_columns(NUM_COLUMNS);
    let database = Database::open(&config, &path)?;
    Ok(OverlayDb::new(Arc::new(database)))
}
