//! Storage layer
//!
//! # Column Families
//!
//! - `accounts` - Account documents (key: account_id)
//! - `transactions` - Append-only audit records (key: record_id, UUIDv7)
//! - `withdrawals` - Withdrawal requests (key: request_id)
//! - `indices` - Secondary indices for per-account lookups
//! - `seasons` - Season documents (key: season_id)
//! - `admin_actions` - Administrative audit log (key: action_id, UUIDv7)
//! - `vip_purchases` - VIP activations (key: purchase_id, UUIDv7)
//!
//! Every multi-record mutation goes through [`Backend::write`], which commits
//! all operations or none.

use crate::{
    error::{Error, Result},
    Config,
};
use parking_lot::RwLock;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;

/// Upper bound on preallocation for limit-driven scans
const SCAN_PREALLOC: usize = 1024;

/// Logical tables, one column family each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Account documents
    Accounts,
    /// Transaction records
    Transactions,
    /// Withdrawal requests
    Withdrawals,
    /// Secondary indices
    Indices,
    /// Seasons
    Seasons,
    /// Administrative audit log
    AdminActions,
    /// VIP activations
    VipPurchases,
}

impl Table {
    /// All tables
    pub const ALL: [Table; 7] = [
        Table::Accounts,
        Table::Transactions,
        Table::Withdrawals,
        Table::Indices,
        Table::Seasons,
        Table::AdminActions,
        Table::VipPurchases,
    ];

    /// Column family name
    pub fn name(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Transactions => "transactions",
            Table::Withdrawals => "withdrawals",
            Table::Indices => "indices",
            Table::Seasons => "seasons",
            Table::AdminActions => "admin_actions",
            Table::VipPurchases => "vip_purchases",
        }
    }
}

/// One operation of an atomic write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite
    Put {
        /// Target table
        table: Table,
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove (no-op when absent)
    Delete {
        /// Target table
        table: Table,
        /// Key
        key: Vec<u8>,
    },
}

/// Key/value pair returned by scans
pub type Entry = (Vec<u8>, Vec<u8>);

/// Durable key/value store with atomic multi-key writes
pub trait Backend: Send + Sync {
    /// Point lookup
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply all operations atomically
    fn write(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<Entry>>;

    /// Up to `limit` entries with keys strictly after `after`, in key order
    fn scan_after(&self, table: Table, after: Option<&[u8]>, limit: usize) -> Result<Vec<Entry>>;

    /// Up to `limit` entries with the highest keys, highest first
    fn scan_last(&self, table: Table, limit: usize) -> Result<Vec<Entry>>;

    /// Estimated number of entries
    fn approximate_count(&self, table: Table) -> Result<u64>;
}

/// RocksDB backend
pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = Table::ALL
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.name(), Self::cf_options(*table)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = Table::ALL.len(),
            "Opened RocksDB"
        );

        Ok(Self { db })
    }

    fn cf_options(table: Table) -> Options {
        let mut opts = Options::default();
        match table {
            // Audit data is written once and rarely read
            Table::Transactions | Table::AdminActions | Table::VipPurchases => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
                opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            Table::Indices => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            Table::Accounts | Table::Withdrawals | Table::Seasons => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn cf_handle(&self, table: Table) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(table.name())
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", table.name())))
    }
}

impl Backend for RocksBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(table)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn write(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put { table, key, value } => {
                    batch.put_cf(self.cf_handle(table)?, key, value)
                }
                WriteOp::Delete { table, key } => batch.delete_cf(self.cf_handle(table)?, key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<Entry>> {
        let cf = self.cf_handle(table)?;
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }

    fn scan_after(&self, table: Table, after: Option<&[u8]>, limit: usize) -> Result<Vec<Entry>> {
        let cf = self.cf_handle(table)?;
        let mode = match after {
            Some(key) => IteratorMode::From(key, Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut entries = Vec::with_capacity(limit.min(SCAN_PREALLOC));
        for item in self.db.iterator_cf(cf, mode) {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if after.is_some_and(|a| *key == *a) {
                continue;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }

    fn scan_last(&self, table: Table, limit: usize) -> Result<Vec<Entry>> {
        let cf = self.cf_handle(table)?;
        let mut entries = Vec::with_capacity(limit.min(SCAN_PREALLOC));
        for item in self.db.iterator_cf(cf, IteratorMode::End).take(limit) {
            let (key, value) = item?;
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }

    fn approximate_count(&self, table: Table) -> Result<u64> {
        let cf = self.cf_handle(table)?;
        Ok(self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }
}

impl fmt::Debug for RocksBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksBackend")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Drop for RocksBackend {
    fn drop(&mut self) {
        tracing::info!("RocksDB closed");
    }
}

/// In-memory backend for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<Table, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        let mut map = f.debug_map();
        for table in Table::ALL {
            map.entry(&table.name(), &tables.get(&table).map_or(0, BTreeMap::len));
        }
        map.finish()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn write(&self, ops: Vec<WriteOp>) -> Result<()> {
        // A single write guard makes the batch atomic for readers
        let mut tables = self.tables.write();
        for op in ops {
            match op {
                WriteOp::Put { table, key, value } => {
                    tables.entry(table).or_default().insert(key, value);
                }
                WriteOp::Delete { table, key } => {
                    if let Some(entries) = tables.get_mut(&table) {
                        entries.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<Entry>> {
        let tables = self.tables.read();
        let Some(entries) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_after(&self, table: Table, after: Option<&[u8]>, limit: usize) -> Result<Vec<Entry>> {
        let tables = self.tables.read();
        let Some(entries) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        Ok(entries
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_last(&self, table: Table, limit: usize) -> Result<Vec<Entry>> {
        let tables = self.tables.read();
        let Some(entries) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn approximate_count(&self, table: Table) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .map_or(0, |entries| entries.len() as u64))
    }
}
