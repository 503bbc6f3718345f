//! Database handle: the named directory of tables.

use std::fs;
use std::path::{Path, PathBuf};

use ahash::RandomState;
use catalog::Column;
use common::{DbError, DbResult};
use hashbrown::HashMap;
use tracing::debug;

use crate::table::Table;

type Map<K, V> = HashMap<K, V, RandomState>;

/// All tables under one data directory.
///
/// DDL takes `&mut self` and happens outside statement execution; the
/// executor only sees `&Db`.
#[derive(Debug)]
pub struct Db {
    path: PathBuf,
    tables: Map<String, Table>,
}

impl Db {
    /// Open a data directory, loading every table found in it.
    pub fn open(path: &Path) -> DbResult<Self> {
        fs::create_dir_all(path)?;
        let mut tables = Map::default();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(name) = file_name.strip_suffix(".table.json") {
                let table = Table::open(path, name)?;
                tables.insert(name.to_string(), table);
            }
        }
        debug!(path = %path.display(), tables = tables.len(), "opened database");
        Ok(Self {
            path: path.to_path_buf(),
            tables,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn find_table(&self, name: &str) -> DbResult<&Table> {
        self.tables
            .get(&name.to_lowercase())
            .ok_or_else(|| DbError::SchemaTableNotExist(name.to_string()))
    }

    /// Table names in deterministic (sorted) order.
    pub fn all_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> DbResult<()> {
        let name = name.to_lowercase();
        if self.tables.contains_key(&name) {
            return Err(DbError::InvalidArgument(format!(
                "table '{name}' already exists"
            )));
        }
        let table_id = self
            .tables
            .values()
            .map(|t| t.meta().table_id())
            .max()
            .unwrap_or(0)
            + 1;
        let table = Table::create(&self.path, table_id, &name, columns)?;
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let name = name.to_lowercase();
        let table = self
            .tables
            .remove(&name)
            .ok_or_else(|| DbError::SchemaTableNotExist(name.clone()))?;
        table.destroy()
    }

    pub fn create_index(&mut self, table_name: &str, index_name: &str, field: &str) -> DbResult<()> {
        let table = self
            .tables
            .get_mut(&table_name.to_lowercase())
            .ok_or_else(|| DbError::SchemaTableNotExist(table_name.to_string()))?;
        table.create_index(index_name, field)
    }

    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult<()> {
        let table = self
            .tables
            .get_mut(&table_name.to_lowercase())
            .ok_or_else(|| DbError::SchemaTableNotExist(table_name.to_string()))?;
        table.drop_index(index_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{AttrType, Value};

    fn int_column(name: &str) -> Column {
        Column::new(name, AttrType::Ints, 4)
    }

    #[test]
    fn create_find_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path()).unwrap();

        db.create_table("t", vec![int_column("id")]).unwrap();
        assert!(db.find_table("t").is_ok());
        assert!(matches!(
            db.find_table("missing"),
            Err(DbError::SchemaTableNotExist(_))
        ));

        db.drop_table("t").unwrap();
        assert!(db.find_table("t").is_err());
    }

    #[test]
    fn duplicate_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path()).unwrap();
        db.create_table("t", vec![int_column("id")]).unwrap();
        assert!(db.create_table("t", vec![int_column("id")]).is_err());
    }

    #[test]
    fn table_names_are_case_folded_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path()).unwrap();
        db.create_table("Beta", vec![int_column("id")]).unwrap();
        db.create_table("alpha", vec![int_column("id")]).unwrap();
        assert_eq!(db.all_tables(), vec!["alpha", "beta"]);
        assert!(db.find_table("BETA").is_ok());
    }

    #[test]
    fn reopen_recovers_tables_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut db = Db::open(dir.path()).unwrap();
            db.create_table("t", vec![int_column("id")]).unwrap();
            let table = db.find_table("t").unwrap();
            let image = table.make_record(&[Value::Int(42)]).unwrap();
            table.insert_record(image).unwrap();
        }

        let db = Db::open(dir.path()).unwrap();
        let table = db.find_table("t").unwrap();
        let mut scanner = table.scanner().unwrap();
        assert!(scanner.next().unwrap().is_some());
        assert!(scanner.next().unwrap().is_none());
    }
}
