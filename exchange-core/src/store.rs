//! Tab-separated record files
//!
//! One file per entity, one fixed header line, one row per record. Every read
//! holds the file's shared lock for the duration of the scan; every write holds
//! the exclusive lock. Whole-file rewrites go through a temp file in the same
//! directory followed by a rename, so readers never observe a half-written
//! file.
//!
//! Locks are per file. Nothing here spans two files; callers that need
//! multi-file consistency serialize through the writer actor.

use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A persisted entity with a fixed file name and header
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// File name inside the data directory
    const FILE_NAME: &'static str;

    /// Column names, in field order
    const HEADER: &'static [&'static str];
}

/// Size and row count of a record file
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FileStats {
    /// Bytes on disk
    pub size_bytes: u64,
    /// Data rows (header excluded)
    pub rows: usize,
}

/// Typed handle to one record file
#[derive(Debug)]
pub struct RecordFile<R> {
    path: PathBuf,
    lock: RwLock<()>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> RecordFile<R> {
    /// Open the file in `dir`, creating it with its header if missing
    pub fn open(dir: &Path) -> Result<Self> {
        let file = Self {
            path: dir.join(R::FILE_NAME),
            lock: RwLock::new(()),
            _marker: PhantomData,
        };

        if !file.path.exists() {
            file.write_rows(&[])?;
            tracing::debug!(file = R::FILE_NAME, "Created record file");
        } else {
            file.check_header()?;
        }

        Ok(file)
    }

    /// Path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row
    pub fn scan(&self) -> Result<Vec<R>> {
        let _guard = self.lock.read();
        self.read_rows()
    }

    /// Rows matching `pred`
    pub fn filter<P>(&self, pred: P) -> Result<Vec<R>>
    where
        P: Fn(&R) -> bool,
    {
        Ok(self.scan()?.into_iter().filter(|r| pred(r)).collect())
    }

    /// First row matching `pred`
    pub fn find<P>(&self, pred: P) -> Result<Option<R>>
    where
        P: Fn(&R) -> bool,
    {
        Ok(self.scan()?.into_iter().find(|r| pred(r)))
    }

    /// Append one row
    pub fn append(&self, record: &R) -> Result<()> {
        let _guard = self.lock.write();

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = Self::writer_builder().from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        tracing::debug!(file = R::FILE_NAME, "Row appended");
        Ok(())
    }

    /// Replace the whole file with `rows`
    pub fn replace_all(&self, rows: &[R]) -> Result<()> {
        let _guard = self.lock.write();
        self.write_rows(rows)
    }

    /// Rewrite every row, applying `update` to rows matching `pred`
    ///
    /// Returns the number of rows updated. The file is left untouched when
    /// nothing matches.
    pub fn update_where<P, F>(&self, pred: P, mut update: F) -> Result<usize>
    where
        P: Fn(&R) -> bool,
        F: FnMut(&mut R),
    {
        let _guard = self.lock.write();
        let mut rows = self.read_rows()?;

        let mut matched = 0;
        for row in rows.iter_mut().filter(|r| pred(&**r)) {
            update(row);
            matched += 1;
        }

        if matched > 0 {
            self.write_rows(&rows)?;
        }
        Ok(matched)
    }

    /// Update the first row matching `pred`, or append `insert()` if none does
    ///
    /// Returns the row as written.
    pub fn upsert<P, F, N>(&self, pred: P, update: F, insert: N) -> Result<R>
    where
        P: Fn(&R) -> bool,
        F: FnOnce(&mut R),
        N: FnOnce() -> R,
    {
        let _guard = self.lock.write();
        let mut rows = self.read_rows()?;

        let written = match rows.iter_mut().find(|r| pred(&**r)) {
            Some(row) => {
                update(row);
                row.clone()
            }
            None => {
                let row = insert();
                rows.push(row.clone());
                row
            }
        };

        self.write_rows(&rows)?;
        Ok(written)
    }

    /// Keep only rows matching `keep`, returning the removed rows
    pub fn retain<P>(&self, keep: P) -> Result<Vec<R>>
    where
        P: Fn(&R) -> bool,
    {
        let _guard = self.lock.write();
        let (kept, removed): (Vec<R>, Vec<R>) = self.read_rows()?.into_iter().partition(|r| keep(r));

        if !removed.is_empty() {
            self.write_rows(&kept)?;
        }
        Ok(removed)
    }

    /// Size and row count
    pub fn stats(&self) -> Result<FileStats> {
        let _guard = self.lock.read();
        let size_bytes = std::fs::metadata(&self.path)?.len();
        let rows = self.read_rows()?.len();
        Ok(FileStats { size_bytes, rows })
    }

    // Unlocked helpers; callers hold the lock

    fn reader_builder() -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder.delimiter(b'\t').has_headers(true);
        builder
    }

    fn writer_builder() -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(b'\t')
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'));
        builder
    }

    fn check_header(&self) -> Result<()> {
        let mut reader = Self::reader_builder().from_path(&self.path)?;
        let headers = reader.headers()?;
        if headers.iter().ne(R::HEADER.iter().copied()) {
            return Err(Error::Storage(format!(
                "{}: unexpected header {:?}",
                R::FILE_NAME,
                headers
            )));
        }
        Ok(())
    }

    fn read_rows(&self) -> Result<Vec<R>> {
        let mut reader = Self::reader_builder().from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            let row: R = row.map_err(|e| {
                Error::Storage(format!("{}: corrupt row: {}", R::FILE_NAME, e))
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn write_rows(&self, rows: &[R]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Storage(format!("{}: no parent directory", R::FILE_NAME)))?;

        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = Self::writer_builder().from_writer(tmp.as_file());
            writer.write_record(R::HEADER)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(file = R::FILE_NAME, rows = rows.len(), "File rewritten");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        key: String,
        #[serde(with = "rust_decimal::serde::str")]
        value: Decimal,
        remarks: String,
        closed_at: Option<i64>,
    }

    impl Record for Note {
        const FILE_NAME: &'static str = "notes.tsv";
        const HEADER: &'static [&'static str] = &["key", "value", "remarks", "closed_at"];
    }

    fn note(key: &str, value: Decimal) -> Note {
        Note {
            key: key.into(),
            value,
            remarks: String::new(),
            closed_at: None,
        }
    }

    fn open() -> (RecordFile<Note>, TempDir) {
        let dir = TempDir::new().unwrap();
        let file = RecordFile::<Note>::open(dir.path()).unwrap();
        (file, dir)
    }

    #[test]
    fn test_open_writes_header() {
        let (file, _dir) = open();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "key\tvalue\tremarks\tclosed_at\n");
        assert!(file.scan().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_scan_preserves_decimals() {
        let (file, _dir) = open();
        file.append(&note("a", dec!(0.1))).unwrap();
        file.append(&note("b", dec!(952.500000))).unwrap();

        let rows = file.scan().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, dec!(0.1));
        assert_eq!(rows[1].value.to_string(), "952.500000");
        assert_eq!(rows[1].closed_at, None);
    }

    #[test]
    fn test_tabs_in_free_text_survive() {
        let (file, _dir) = open();
        let mut row = note("a", dec!(1));
        row.remarks = "bank\tdown \"again\"".into();
        file.append(&row).unwrap();

        assert_eq!(file.scan().unwrap()[0].remarks, "bank\tdown \"again\"");
    }

    #[test]
    fn test_update_where_counts_matches() {
        let (file, _dir) = open();
        file.append(&note("a", dec!(1))).unwrap();
        file.append(&note("b", dec!(2))).unwrap();

        let n = file
            .update_where(|r| r.key == "b", |r| r.closed_at = Some(42))
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(file.find(|r| r.key == "b").unwrap().unwrap().closed_at, Some(42));

        let n = file.update_where(|r| r.key == "zzz", |r| r.value = dec!(0)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let (file, _dir) = open();
        file.upsert(|r| r.key == "a", |r| r.value += dec!(1), || note("a", dec!(5)))
            .unwrap();
        let row = file
            .upsert(|r| r.key == "a", |r| r.value += dec!(1), || note("a", dec!(5)))
            .unwrap();

        assert_eq!(row.value, dec!(6));
        assert_eq!(file.scan().unwrap().len(), 1);
    }

    #[test]
    fn test_retain_returns_removed() {
        let (file, _dir) = open();
        file.append(&note("a", dec!(1))).unwrap();
        file.append(&note("b", dec!(2))).unwrap();

        let removed = file.retain(|r| r.key != "a").unwrap();
        assert_eq!(removed, vec![note("a", dec!(1))]);
        assert_eq!(file.stats().unwrap().rows, 1);
    }

    #[test]
    fn test_reopen_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.tsv"), "id\tamount\n").unwrap();
        let err = RecordFile::<Note>::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
