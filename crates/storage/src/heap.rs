//! Fixed-length heap record file.
//!
//! A heap file is an array of pages; each page is an array of slots sized for
//! the table's record width plus one presence byte. Rids name a record as
//! (page, slot). Deletes clear the presence byte and recycle the slot.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::{DbError, DbResult, Rid};

use crate::record::Record;

pub const PAGE_SIZE: usize = 4096;

/// Heap file handle with a free-slot cache built at open time.
#[derive(Debug)]
pub struct RecordFile {
    file: File,
    path: PathBuf,
    record_size: usize,
    slots_per_page: usize,
    free_slots: Vec<Rid>,
    next_fresh: Rid,
}

impl RecordFile {
    pub fn open(path: &Path, record_size: usize) -> DbResult<Self> {
        let slot_size = record_size + 1;
        if slot_size > PAGE_SIZE {
            return Err(DbError::InvalidArgument(format!(
                "record size {record_size} exceeds page capacity"
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut heap = Self {
            file,
            path: path.to_path_buf(),
            record_size,
            slots_per_page: PAGE_SIZE / slot_size,
            free_slots: Vec::new(),
            next_fresh: Rid { page_num: 0, slot_num: 0 },
        };
        heap.rebuild_free_list()?;
        Ok(heap)
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    fn slot_size(&self) -> usize {
        self.record_size + 1
    }

    fn num_pages(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len() / PAGE_SIZE as u64)
    }

    fn slot_offset(&self, rid: Rid) -> u64 {
        rid.page_num * PAGE_SIZE as u64 + rid.slot_num as u64 * self.slot_size() as u64
    }

    fn check_rid(&self, rid: Rid) -> DbResult<()> {
        if rid.slot_num as usize >= self.slots_per_page || rid.page_num >= self.num_pages()? {
            return Err(DbError::Storage(format!("rid {rid} out of range")));
        }
        Ok(())
    }

    /// Scan the whole file once, collecting holes and the append position.
    ///
    /// Holes are stacked highest-rid first so that `take_free_slot` hands
    /// them out in ascending rid order.
    fn rebuild_free_list(&mut self) -> DbResult<()> {
        self.free_slots.clear();
        let num_pages = self.num_pages()?;
        let mut buf = vec![0u8; PAGE_SIZE];
        for page_num in (0..num_pages).rev() {
            self.file.seek(SeekFrom::Start(page_num * PAGE_SIZE as u64))?;
            self.file.read_exact(&mut buf)?;
            for slot_num in (0..self.slots_per_page).rev() {
                let present = buf[slot_num * self.slot_size()];
                if present == 0 {
                    self.free_slots.push(Rid {
                        page_num,
                        slot_num: slot_num as u16,
                    });
                }
            }
        }
        self.next_fresh = Rid { page_num: num_pages, slot_num: 0 };
        Ok(())
    }

    fn take_free_slot(&mut self) -> DbResult<Rid> {
        if let Some(rid) = self.free_slots.pop() {
            return Ok(rid);
        }
        let rid = self.next_fresh;
        // Materialize the page so the file length stays page-aligned.
        self.file
            .set_len((rid.page_num + 1) * PAGE_SIZE as u64)?;
        for slot_num in (rid.slot_num as usize + 1..self.slots_per_page).rev() {
            self.free_slots.push(Rid {
                page_num: rid.page_num,
                slot_num: slot_num as u16,
            });
        }
        self.next_fresh = Rid {
            page_num: rid.page_num + 1,
            slot_num: 0,
        };
        Ok(rid)
    }

    pub fn insert(&mut self, data: &[u8]) -> DbResult<Rid> {
        if data.len() != self.record_size {
            return Err(DbError::Internal(format!(
                "record image is {} bytes, table expects {}",
                data.len(),
                self.record_size
            )));
        }
        let rid = self.take_free_slot()?;
        self.file.seek(SeekFrom::Start(self.slot_offset(rid)))?;
        self.file.write_all(&[1u8])?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(rid)
    }

    pub fn get(&mut self, rid: Rid) -> DbResult<Record> {
        self.check_rid(rid)?;
        let mut buf = vec![0u8; self.slot_size()];
        self.file.seek(SeekFrom::Start(self.slot_offset(rid)))?;
        self.file.read_exact(&mut buf)?;
        if buf[0] == 0 {
            return Err(DbError::NotFound(format!("record {rid}")));
        }
        Ok(Record::new(rid, buf[1..].to_vec()))
    }

    pub fn delete(&mut self, rid: Rid) -> DbResult<Record> {
        let record = self.get(rid)?;
        self.file.seek(SeekFrom::Start(self.slot_offset(rid)))?;
        self.file.write_all(&[0u8])?;
        self.file.flush()?;
        self.free_slots.push(rid);
        Ok(record)
    }

    /// A scanner with its own file handle, so scans survive concurrent
    /// writes through this handle within the same statement.
    pub fn scanner(&self) -> DbResult<RecordScanner> {
        RecordScanner::open(&self.path, self.record_size)
    }
}

/// Streams live records in (page, slot) order.
pub struct RecordScanner {
    file: File,
    record_size: usize,
    slots_per_page: usize,
    num_pages: u64,
    page_buf: Vec<u8>,
    current_page: u64,
    page_loaded: bool,
    next_slot: usize,
}

impl RecordScanner {
    fn open(path: &Path, record_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let num_pages = file.metadata()?.len() / PAGE_SIZE as u64;
        Ok(Self {
            file,
            record_size,
            slots_per_page: PAGE_SIZE / (record_size + 1),
            num_pages,
            page_buf: vec![0u8; PAGE_SIZE],
            current_page: 0,
            page_loaded: false,
            next_slot: 0,
        })
    }

    fn slot_size(&self) -> usize {
        self.record_size + 1
    }

    /// Next live record, or `None` at end of heap.
    pub fn next(&mut self) -> DbResult<Option<Record>> {
        loop {
            if self.current_page >= self.num_pages {
                return Ok(None);
            }
            if !self.page_loaded {
                self.file
                    .seek(SeekFrom::Start(self.current_page * PAGE_SIZE as u64))?;
                self.file.read_exact(&mut self.page_buf)?;
                self.page_loaded = true;
            }
            while self.next_slot < self.slots_per_page {
                let slot = self.next_slot;
                self.next_slot += 1;
                let start = slot * self.slot_size();
                if self.page_buf[start] == 0 {
                    continue;
                }
                let data = self.page_buf[start + 1..start + self.slot_size()].to_vec();
                let rid = Rid {
                    page_num: self.current_page,
                    slot_num: slot as u16,
                };
                return Ok(Some(Record::new(rid, data)));
            }
            self.current_page += 1;
            self.page_loaded = false;
            self.next_slot = 0;
        }
    }
}
