// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! A type-safe wrapper over rocksdb.
//!
//! Each logical namespace is a column family; each column family carries
//! exactly one [`Schema`], which fixes the key and value types and their
//! byte encodings. All writes that must land together go through a
//! [`SchemaBatch`]: either the whole batch commits or none of it does, which
//! is what the consensus layer leans on for its "rollback on failed commit"
//! guarantee.

mod schema;

pub use schema::{KeyCodec, Schema, ValueCodec};

use anyhow::{format_err, Result};
use modulr_infallible::Mutex;
use modulr_logger::prelude::*;
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DEFAULT_COLUMN_FAMILY_NAME};
use std::{collections::HashMap, iter::Iterator, path::Path};

/// Name of a column family, fixed at schema definition time.
pub type ColumnFamilyName = &'static str;

#[derive(Debug)]
enum WriteOp {
    Value { key: Vec<u8>, value: Vec<u8> },
    Deletion { key: Vec<u8> },
}

/// A collection of staged writes, applied atomically by [`DB::write_schemas`].
/// Mirrors the `atomic_put` / `atomic_commit` discipline of the storage
/// contract: nothing staged here is visible until the batch commits, and a
/// dropped batch is a rollback.
#[derive(Debug, Default)]
pub struct SchemaBatch {
    rows: Mutex<HashMap<ColumnFamilyName, Vec<WriteOp>>>,
}

impl SchemaBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an insert/update.
    pub fn put<S: Schema>(&self, key: &S::Key, value: &S::Value) -> Result<()> {
        let key = key.encode_key()?;
        let value = value.encode_value()?;
        self.rows
            .lock()
            .entry(S::COLUMN_FAMILY_NAME)
            .or_insert_with(Vec::new)
            .push(WriteOp::Value { key, value });
        Ok(())
    }

    /// Stages a delete.
    pub fn delete<S: Schema>(&self, key: &S::Key) -> Result<()> {
        let key = key.encode_key()?;
        self.rows
            .lock()
            .entry(S::COLUMN_FAMILY_NAME)
            .or_insert_with(Vec::new)
            .push(WriteOp::Deletion { key });
        Ok(())
    }
}

/// A rocksdb instance bound to a fixed set of column families.
#[derive(Debug)]
pub struct DB {
    name: &'static str,
    inner: rocksdb::DB,
}

impl DB {
    /// Opens (creating if needed) the database at `path` with the given
    /// column families.
    pub fn open(
        path: &Path,
        name: &'static str,
        column_families: Vec<ColumnFamilyName>,
    ) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cfds = column_families
            .iter()
            .chain(std::iter::once(&DEFAULT_COLUMN_FAMILY_NAME))
            .map(|cf_name| ColumnFamilyDescriptor::new(*cf_name, Options::default()))
            .collect::<Vec<_>>();

        let inner = rocksdb::DB::open_cf_descriptors(&db_opts, path, cfds)?;
        info!(
            db = name,
            path = %path.display(),
            "Opened kv store"
        );
        Ok(Self { name, inner })
    }

    pub fn get<S: Schema>(&self, key: &S::Key) -> Result<Option<S::Value>> {
        let raw_key = key.encode_key()?;
        let cf = self.cf_handle(S::COLUMN_FAMILY_NAME)?;
        self.inner
            .get_cf(cf, &raw_key)?
            .map(|raw_value| S::Value::decode_value(&raw_value))
            .transpose()
    }

    /// Single-key write outside any batch.
    pub fn put<S: Schema>(&self, key: &S::Key, value: &S::Value) -> Result<()> {
        let batch = SchemaBatch::new();
        batch.put::<S>(key, value)?;
        self.write_schemas(batch)
    }

    pub fn delete<S: Schema>(&self, key: &S::Key) -> Result<()> {
        let batch = SchemaBatch::new();
        batch.delete::<S>(key)?;
        self.write_schemas(batch)
    }

    /// Commits every staged row atomically. On error nothing is applied.
    pub fn write_schemas(&self, batch: SchemaBatch) -> Result<()> {
        let rows = batch.rows.into_inner();
        let mut db_batch = WriteBatch::default();
        for (cf_name, ops) in rows.iter() {
            let cf = self.cf_handle(cf_name)?;
            for op in ops {
                match op {
                    WriteOp::Value { key, value } => db_batch.put_cf(cf, key, value),
                    WriteOp::Deletion { key } => db_batch.delete_cf(cf, key),
                }
            }
        }
        self.inner.write(db_batch)?;
        Ok(())
    }

    /// All decoded `(key, value)` pairs whose raw key starts with `prefix`.
    pub fn iter_prefix<S: Schema>(&self, prefix: &[u8]) -> Result<Vec<(S::Key, S::Value)>> {
        let cf = self.cf_handle(S::COLUMN_FAMILY_NAME)?;
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for (raw_key, raw_value) in self.inner.iterator_cf(cf, mode) {
            if !raw_key.starts_with(prefix) {
                break;
            }
            out.push((
                S::Key::decode_key(&raw_key)?,
                S::Value::decode_value(&raw_value)?,
            ));
        }
        Ok(out)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn cf_handle(&self, cf_name: ColumnFamilyName) -> Result<&rocksdb::ColumnFamily> {
        self.inner
            .cf_handle(cf_name)
            .ok_or_else(|| format_err!("DB::cf_handle not found for column family name: {}", cf_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

    crate::define_schema!(TestSchema, u64, String, "test_cf");

    impl KeyCodec<TestSchema> for u64 {
        fn encode_key(&self) -> Result<Vec<u8>> {
            let mut out = Vec::new();
            out.write_u64::<BigEndian>(*self)?;
            Ok(out)
        }

        fn decode_key(mut data: &[u8]) -> Result<Self> {
            Ok(data.read_u64::<BigEndian>()?)
        }
    }

    impl ValueCodec<TestSchema> for String {
        fn encode_value(&self) -> Result<Vec<u8>> {
            Ok(self.as_bytes().to_vec())
        }

        fn decode_value(data: &[u8]) -> Result<Self> {
            Ok(String::from_utf8(data.to_vec())?)
        }
    }

    fn open_test_db(dir: &std::path::Path) -> DB {
        DB::open(dir, "test", vec!["test_cf"]).unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        db.put::<TestSchema>(&7, &"seven".to_string()).unwrap();
        assert_eq!(db.get::<TestSchema>(&7).unwrap(), Some("seven".to_string()));
        db.delete::<TestSchema>(&7).unwrap();
        assert_eq!(db.get::<TestSchema>(&7).unwrap(), None);
    }

    #[test]
    fn test_batch_is_atomic_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        let batch = SchemaBatch::new();
        batch.put::<TestSchema>(&1, &"one".to_string()).unwrap();
        batch.put::<TestSchema>(&2, &"two".to_string()).unwrap();
        // Nothing visible before commit.
        assert_eq!(db.get::<TestSchema>(&1).unwrap(), None);
        db.write_schemas(batch).unwrap();
        assert_eq!(db.get::<TestSchema>(&1).unwrap(), Some("one".to_string()));
        assert_eq!(db.get::<TestSchema>(&2).unwrap(), Some("two".to_string()));
    }

    #[test]
    fn test_dropped_batch_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        {
            let batch = SchemaBatch::new();
            batch.put::<TestSchema>(&3, &"three".to_string()).unwrap();
            // batch dropped without write_schemas
        }
        assert_eq!(db.get::<TestSchema>(&3).unwrap(), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = open_test_db(dir.path());
            db.put::<TestSchema>(&42, &"answer".to_string()).unwrap();
        }
        let db = open_test_db(dir.path());
        assert_eq!(db.get::<TestSchema>(&42).unwrap(), Some("answer".to_string()));
    }

    #[test]
    fn test_prefix_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        for i in 0..4u64 {
            db.put::<TestSchema>(&i, &format!("v{}", i)).unwrap();
        }
        let all = db.iter_prefix::<TestSchema>(&[]).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].1, "v0");
    }
}
