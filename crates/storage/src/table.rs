//! Table runtime: metadata plus heap file plus indexes.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use catalog::{Column, IndexMeta, TableMeta};
use common::{DbError, DbResult, Rid};
use tracing::trace;
use types::Value;

use crate::heap::{RecordFile, RecordScanner};
use crate::index::{Index, IndexScanner};
use crate::record::Record;

/// One table on disk: `<name>.table.json` beside `<name>.heap`.
///
/// Reads go through scanners with their own file handles; writes go through
/// the heap handle held here. Indexes are rebuilt from the heap at open and
/// maintained on every mutation. Interior mutability keeps the read path
/// (`&Table`) usable from operators while this session is single-threaded.
#[derive(Debug)]
pub struct Table {
    meta: TableMeta,
    meta_path: PathBuf,
    heap_path: PathBuf,
    heap: RefCell<RecordFile>,
    indexes: RefCell<Vec<Index>>,
}

impl Table {
    fn meta_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.table.json"))
    }

    fn heap_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.heap"))
    }

    pub fn create(dir: &Path, table_id: u64, name: &str, columns: Vec<Column>) -> DbResult<Self> {
        let meta = TableMeta::new(table_id, name, columns)?;
        let meta_path = Self::meta_path(dir, name);
        let heap_path = Self::heap_path(dir, name);
        meta.save(&meta_path)?;
        let heap = RecordFile::open(&heap_path, meta.record_size())?;
        Ok(Self {
            meta,
            meta_path,
            heap_path,
            heap: RefCell::new(heap),
            indexes: RefCell::new(Vec::new()),
        })
    }

    pub fn open(dir: &Path, name: &str) -> DbResult<Self> {
        let meta_path = Self::meta_path(dir, name);
        let meta = TableMeta::load(&meta_path)?;
        let heap_path = Self::heap_path(dir, name);
        let heap = RecordFile::open(&heap_path, meta.record_size())?;
        let table = Self {
            meta,
            meta_path,
            heap_path,
            heap: RefCell::new(heap),
            indexes: RefCell::new(Vec::new()),
        };
        table.rebuild_indexes()?;
        Ok(table)
    }

    /// Remove the table's files; the instance must be dropped afterwards.
    pub fn destroy(&self) -> DbResult<()> {
        fs::remove_file(&self.meta_path)?;
        fs::remove_file(&self.heap_path)?;
        Ok(())
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Encode a row of user values into a record image.
    ///
    /// Value count must match the visible field count; each value must be
    /// assignable to its field (same kind, Ints widening to Floats, or Chars
    /// within the declared length).
    pub fn make_record(&self, values: &[Value]) -> DbResult<Vec<u8>> {
        let fields: Vec<_> = self.meta.visible_fields().collect();
        if values.len() != fields.len() {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' expects {} values, got {}",
                self.name(),
                fields.len(),
                values.len()
            )));
        }

        let mut image = vec![0u8; self.meta.record_size()];
        for (value, field) in values.iter().zip(fields) {
            let coerced = value.cast_to(field.attr_type()).ok_or_else(|| {
                DbError::InvalidArgument(format!(
                    "value '{value}' is not assignable to {}.{} ({})",
                    self.name(),
                    field.name(),
                    field.attr_type()
                ))
            })?;
            if let Value::Chars(s) = &coerced {
                if s.len() > field.len() {
                    return Err(DbError::InvalidArgument(format!(
                        "'{s}' exceeds {}.{} length {}",
                        self.name(),
                        field.name(),
                        field.len()
                    )));
                }
            }
            let bytes = coerced.to_bytes(field.len());
            image[field.offset()..field.offset() + field.len()].copy_from_slice(&bytes);
        }
        Ok(image)
    }

    pub fn insert_record(&self, data: Vec<u8>) -> DbResult<Record> {
        let rid = self.heap.borrow_mut().insert(&data)?;
        let record = Record::new(rid, data);
        for index in self.indexes.borrow_mut().iter_mut() {
            index.insert_entry(&record);
        }
        trace!(table = self.name(), %rid, "inserted record");
        Ok(record)
    }

    pub fn delete_record(&self, rid: Rid) -> DbResult<Record> {
        let record = self.heap.borrow_mut().delete(rid)?;
        for index in self.indexes.borrow_mut().iter_mut() {
            index.delete_entry(&record);
        }
        trace!(table = self.name(), %rid, "deleted record");
        Ok(record)
    }

    pub fn get_record(&self, rid: Rid) -> DbResult<Record> {
        self.heap.borrow_mut().get(rid)
    }

    pub fn scanner(&self) -> DbResult<RecordScanner> {
        self.heap.borrow().scanner()
    }

    pub fn index_scanner(
        &self,
        index_name: &str,
        left: Option<&Value>,
        left_inclusive: bool,
        right: Option<&Value>,
        right_inclusive: bool,
    ) -> DbResult<IndexScanner> {
        let indexes = self.indexes.borrow();
        let index = indexes
            .iter()
            .find(|i| i.meta().name() == index_name)
            .ok_or_else(|| {
                DbError::NotFound(format!("index '{index_name}' on table '{}'", self.name()))
            })?;
        index.scanner(left, left_inclusive, right, right_inclusive)
    }

    /// Create and backfill a new single-column index.
    pub fn create_index(&mut self, index_name: &str, field_name: &str) -> DbResult<()> {
        self.meta
            .add_index(IndexMeta::new(index_name, field_name))?;
        self.meta.save(&self.meta_path)?;
        self.rebuild_indexes()
    }

    pub fn drop_index(&mut self, index_name: &str) -> DbResult<()> {
        self.meta.remove_index(index_name)?;
        self.meta.save(&self.meta_path)?;
        self.rebuild_indexes()
    }

    /// Rebuild every index from a full heap scan.
    fn rebuild_indexes(&self) -> DbResult<()> {
        let mut indexes = Vec::with_capacity(self.meta.indexes().len());
        for index_meta in self.meta.indexes() {
            let field = self.meta.field(index_meta.field()).ok_or_else(|| {
                DbError::Internal(format!(
                    "index '{}' references unknown field '{}'",
                    index_meta.name(),
                    index_meta.field()
                ))
            })?;
            indexes.push(Index::new(index_meta.clone(), field.clone()));
        }

        let mut scanner = self.scanner()?;
        while let Some(record) = scanner.next()? {
            for index in indexes.iter_mut() {
                index.insert_entry(&record);
            }
        }
        *self.indexes.borrow_mut() = indexes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::AttrType;

    fn test_table(dir: &Path) -> Table {
        Table::create(
            dir,
            1,
            "users",
            vec![
                Column::new("id", AttrType::Ints, 4),
                Column::new("name", AttrType::Chars, 8),
            ],
        )
        .unwrap()
    }

    fn row(table: &Table, id: i32, name: &str) -> Vec<u8> {
        table
            .make_record(&[Value::Int(id), Value::Chars(name.into())])
            .unwrap()
    }

    #[test]
    fn make_record_validates_arity_and_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let table = test_table(dir.path());

        assert!(table.make_record(&[Value::Int(1)]).is_err());
        assert!(table
            .make_record(&[Value::Chars("x".into()), Value::Chars("y".into())])
            .is_err());
        assert!(table
            .make_record(&[Value::Int(1), Value::Chars("waytoolongname".into())])
            .is_err());
    }

    #[test]
    fn insert_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let table = test_table(dir.path());

        let record = table.insert_record(row(&table, 7, "ada")).unwrap();
        let fetched = table.get_record(record.rid()).unwrap();
        let id_field = table.meta().field("id").unwrap();
        let id = Value::from_bytes(
            id_field.attr_type(),
            fetched.field_slice(id_field.offset(), id_field.len()),
        );
        assert_eq!(id, Value::Int(7));

        table.delete_record(record.rid()).unwrap();
        assert!(table.get_record(record.rid()).is_err());
    }

    #[test]
    fn int_values_widen_into_float_fields() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::create(
            dir.path(),
            1,
            "m",
            vec![Column::new("score", AttrType::Floats, 4)],
        )
        .unwrap();

        let image = table.make_record(&[Value::Int(3)]).unwrap();
        let field = table.meta().field("score").unwrap();
        let score = Value::from_bytes(AttrType::Floats, &image[field.offset()..field.offset() + 4]);
        assert_eq!(score, Value::Float(3.0));
    }

    #[test]
    fn index_is_maintained_across_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = test_table(dir.path());
        table.create_index("idx_id", "id").unwrap();

        let r1 = table.insert_record(row(&table, 1, "a")).unwrap();
        let _r2 = table.insert_record(row(&table, 2, "b")).unwrap();

        let mut scanner = table
            .index_scanner("idx_id", Some(&Value::Int(1)), true, Some(&Value::Int(1)), true)
            .unwrap();
        assert_eq!(scanner.next_entry(), Some(r1.rid()));
        assert_eq!(scanner.next_entry(), None);

        table.delete_record(r1.rid()).unwrap();
        let mut scanner = table
            .index_scanner("idx_id", Some(&Value::Int(1)), true, Some(&Value::Int(1)), true)
            .unwrap();
        assert_eq!(scanner.next_entry(), None);
    }

    #[test]
    fn create_index_backfills_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = test_table(dir.path());

        let r1 = table.insert_record(row(&table, 5, "a")).unwrap();
        table.create_index("idx_id", "id").unwrap();

        let mut scanner = table
            .index_scanner("idx_id", Some(&Value::Int(5)), true, Some(&Value::Int(5)), true)
            .unwrap();
        assert_eq!(scanner.next_entry(), Some(r1.rid()));
    }

    #[test]
    fn reopen_preserves_meta_and_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut table = test_table(dir.path());
            table.create_index("idx_id", "id").unwrap();
            table.insert_record(row(&table, 9, "z")).unwrap();
        }

        let table = Table::open(dir.path(), "users").unwrap();
        assert_eq!(table.meta().indexes().len(), 1);
        let mut scanner = table
            .index_scanner("idx_id", Some(&Value::Int(9)), true, None, true)
            .unwrap();
        assert!(scanner.next_entry().is_some());
    }
}
