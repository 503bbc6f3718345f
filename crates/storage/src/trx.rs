//! Undo-logged transactions.
//!
//! Every write goes through a [`Trx`]. Mutations apply immediately; the
//! inverse operation is appended to an undo log. `commit` discards the log,
//! `rollback` replays it newest-first. A statement that fails mid-way can
//! therefore be undone without touching what earlier statements wrote.

use common::{DbResult, Rid};
use tracing::{debug, warn};

use crate::db::Db;
use crate::record::Record;
use crate::table::Table;

#[derive(Debug)]
enum UndoOp {
    /// Inverse of an insert: delete the rid again.
    RemoveInserted { table: String, rid: Rid },
    /// Inverse of a delete: put the image back (the rid may change).
    RestoreDeleted { table: String, data: Vec<u8> },
}

/// A session's transaction state.
#[derive(Debug, Default)]
pub struct Trx {
    undo: Vec<UndoOp>,
}

impl Trx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of undo entries currently pending.
    pub fn pending_ops(&self) -> usize {
        self.undo.len()
    }

    pub fn insert_record(&mut self, table: &Table, data: Vec<u8>) -> DbResult<Record> {
        let record = table.insert_record(data)?;
        self.undo.push(UndoOp::RemoveInserted {
            table: table.name().to_string(),
            rid: record.rid(),
        });
        Ok(record)
    }

    pub fn delete_record(&mut self, table: &Table, rid: Rid) -> DbResult<()> {
        let record = table.delete_record(rid)?;
        self.undo.push(UndoOp::RestoreDeleted {
            table: table.name().to_string(),
            data: record.into_data(),
        });
        Ok(())
    }

    pub fn commit(&mut self) {
        debug!(ops = self.undo.len(), "commit");
        self.undo.clear();
    }

    /// Undo everything since the last commit, newest first.
    pub fn rollback(&mut self, db: &Db) -> DbResult<()> {
        debug!(ops = self.undo.len(), "rollback");
        while let Some(op) = self.undo.pop() {
            match op {
                UndoOp::RemoveInserted { table, rid } => {
                    let table = db.find_table(&table)?;
                    if let Err(err) = table.delete_record(rid) {
                        warn!(%rid, %err, "undo of insert failed");
                        return Err(err);
                    }
                }
                UndoOp::RestoreDeleted { table, data } => {
                    let table = db.find_table(&table)?;
                    table.insert_record(data)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Column;
    use types::{AttrType, Value};

    fn setup(dir: &std::path::Path) -> Db {
        let mut db = Db::open(dir).unwrap();
        db.create_table("t", vec![Column::new("id", AttrType::Ints, 4)])
            .unwrap();
        db
    }

    fn count_rows(db: &Db) -> usize {
        let mut scanner = db.find_table("t").unwrap().scanner().unwrap();
        let mut n = 0;
        while scanner.next().unwrap().is_some() {
            n += 1;
        }
        n
    }

    fn insert(db: &Db, trx: &mut Trx, id: i32) -> Record {
        let table = db.find_table("t").unwrap();
        let image = table.make_record(&[Value::Int(id)]).unwrap();
        trx.insert_record(table, image).unwrap()
    }

    #[test]
    fn rollback_undoes_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup(dir.path());
        let mut trx = Trx::new();

        insert(&db, &mut trx, 1);
        insert(&db, &mut trx, 2);
        assert_eq!(count_rows(&db), 2);

        trx.rollback(&db).unwrap();
        assert_eq!(count_rows(&db), 0);
        assert_eq!(trx.pending_ops(), 0);
    }

    #[test]
    fn rollback_restores_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup(dir.path());
        let mut trx = Trx::new();

        let record = insert(&db, &mut trx, 1);
        trx.commit();

        trx.delete_record(db.find_table("t").unwrap(), record.rid())
            .unwrap();
        assert_eq!(count_rows(&db), 0);

        trx.rollback(&db).unwrap();
        assert_eq!(count_rows(&db), 1);
    }

    #[test]
    fn commit_clears_the_undo_log() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup(dir.path());
        let mut trx = Trx::new();

        insert(&db, &mut trx, 1);
        trx.commit();
        trx.rollback(&db).unwrap();
        assert_eq!(count_rows(&db), 1);
    }
}
