//! Binds names to on-disk files: one directory per database holding a
//! metadata blob, one heap file per table, one `.idx` file per index and a
//! shared log file. Every schema change rewrites the metadata in full.
//!
//! Catalog access is single-threaded by design; every mutating operation
//! takes `&mut self`, which makes that precondition a compile-time fact.

pub mod error;
pub mod meta;

use crate::index::{IndexHandle, IndexManager};
use crate::record::{HeapFile, RecordManager, RecordScan};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::disk::DiskManager;
use error::{CatalogError, CatalogResult};
use meta::{ColMeta, ColType, DbMeta, IndexMeta, TabMeta};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

pub const DB_META_NAME: &str = "db.meta";
pub const LOG_FILE_NAME: &str = "db.log";

/// Column definition supplied by DDL.
#[derive(Debug, Clone)]
pub struct ColDef {
    pub name: String,
    pub col_type: ColType,
    pub len: i32,
}

struct OpenDb {
    meta: DbMeta,
    dir: PathBuf,
    tables: HashMap<String, HeapFile>,
    indexes: HashMap<String, Box<dyn IndexHandle>>,
}

/// The catalog. Owns the open heap files and index handles of the current
/// database; at most one database is open at a time.
pub struct Catalog {
    root: PathBuf,
    disk: Arc<DiskManager>,
    record_manager: RecordManager,
    index_manager: Box<dyn IndexManager>,
    db: Option<OpenDb>,
}

impl Catalog {
    pub fn new(
        root: impl Into<PathBuf>,
        disk: Arc<DiskManager>,
        buffer_pool: BufferPoolManager,
        index_manager: Box<dyn IndexManager>,
    ) -> Self {
        Self {
            root: root.into(),
            record_manager: RecordManager::new(disk.clone(), buffer_pool),
            disk,
            index_manager,
            db: None,
        }
    }

    /// Name of the open database, if any.
    pub fn db_name(&self) -> Option<&str> {
        self.db.as_ref().map(|db| db.meta.name.as_str())
    }

    /// Create a database directory with an empty metadata blob and a log
    /// file. The database is not opened.
    pub fn create_db(&self, db_name: &str) -> CatalogResult<()> {
        let dir = self.root.join(db_name);
        if DiskManager::is_dir(&dir) {
            return Err(CatalogError::DatabaseExists(db_name.to_string()));
        }
        DiskManager::create_dir(&dir)?;
        fs::write(dir.join(DB_META_NAME), DbMeta::new(db_name).to_string())?;
        self.disk.create_file(&dir.join(LOG_FILE_NAME))?;
        Ok(())
    }

    /// Remove a database directory and everything in it.
    pub fn drop_db(&mut self, db_name: &str) -> CatalogResult<()> {
        let dir = self.root.join(db_name);
        if !DiskManager::is_dir(&dir) {
            return Err(CatalogError::DatabaseNotFound(db_name.to_string()));
        }
        if self.db_name() == Some(db_name) {
            return Err(CatalogError::Internal(format!(
                "database {} is open; close it before dropping",
                db_name
            )));
        }
        DiskManager::destroy_dir(&dir)?;
        Ok(())
    }

    /// Load a database: parse its metadata and open every table and index
    /// file it names. Fails while another database is open.
    pub fn open_db(&mut self, db_name: &str) -> CatalogResult<()> {
        let dir = self.root.join(db_name);
        if !DiskManager::is_dir(&dir) {
            return Err(CatalogError::DatabaseNotFound(db_name.to_string()));
        }
        if self.db.is_some() {
            return Err(CatalogError::DatabaseExists(db_name.to_string()));
        }
        let text = fs::read_to_string(dir.join(DB_META_NAME))?;
        let meta = DbMeta::parse(&text)?;
        self.disk.set_log_path(&dir.join(LOG_FILE_NAME));

        let mut tables = HashMap::new();
        let mut indexes = HashMap::new();
        for (tab_name, tab) in &meta.tabs {
            let file = self.record_manager.open_file(&dir.join(tab_name))?;
            tables.insert(tab_name.clone(), file);
            for (index_name, index) in &tab.indexes {
                let handle = self.index_manager.open_index(&dir, tab_name, &index.cols)?;
                indexes.insert(index_name.clone(), handle);
            }
        }
        self.db = Some(OpenDb {
            meta,
            dir,
            tables,
            indexes,
        });
        Ok(())
    }

    /// Persist the metadata, flush and close every table and index, and
    /// forget the open database. A no-op when none is open.
    pub fn close_db(&mut self) -> CatalogResult<()> {
        let db = match self.db.take() {
            Some(db) => db,
            None => return Ok(()),
        };
        fs::write(db.dir.join(DB_META_NAME), db.meta.to_string())?;
        for file in db.tables.into_values() {
            self.record_manager.close_file(file)?;
        }
        for handle in db.indexes.into_values() {
            self.index_manager.close_index(handle)?;
        }
        Ok(())
    }

    /// Rewrite the metadata blob in full.
    pub fn flush_meta(&self) -> CatalogResult<()> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        fs::write(db.dir.join(DB_META_NAME), db.meta.to_string())?;
        Ok(())
    }

    /// Create a table: its columns are laid out in order, and its heap file
    /// is created and opened under the table's name.
    pub fn create_table(&mut self, tab_name: &str, col_defs: &[ColDef]) -> CatalogResult<()> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        if db.meta.is_table(tab_name) {
            return Err(CatalogError::TableExists(tab_name.to_string()));
        }

        let mut cols = Vec::with_capacity(col_defs.len());
        let mut offset = 0;
        for def in col_defs {
            cols.push(ColMeta {
                tab_name: tab_name.to_string(),
                name: def.name.clone(),
                col_type: def.col_type,
                len: def.len,
                offset,
                indexed: false,
            });
            offset += def.len;
        }
        let record_size = offset as usize;

        let path = db.dir.join(tab_name);
        self.record_manager.create_file(&path, record_size)?;
        let file = self.record_manager.open_file(&path)?;
        db.tables.insert(tab_name.to_string(), file);
        db.meta.tabs.insert(
            tab_name.to_string(),
            TabMeta {
                name: tab_name.to_string(),
                cols,
                indexes: BTreeMap::new(),
            },
        );
        self.flush_meta()
    }

    /// Drop a table: its indexes go first, then the heap file.
    pub fn drop_table(&mut self, tab_name: &str) -> CatalogResult<()> {
        let index_cols: Vec<Vec<String>> = {
            let db = self.db.as_ref().ok_or_else(no_open_db)?;
            let tab = db.meta.get_table(tab_name)?;
            tab.indexes
                .values()
                .map(|index| index.cols.iter().map(|col| col.name.clone()).collect())
                .collect()
        };
        for cols in index_cols {
            let names: Vec<&str> = cols.iter().map(String::as_str).collect();
            self.drop_index(tab_name, &names)?;
        }

        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        let file = db
            .tables
            .remove(tab_name)
            .ok_or_else(|| CatalogError::TableNotFound(tab_name.to_string()))?;
        let path = db.dir.join(tab_name);
        self.record_manager.close_file(file)?;
        self.record_manager.destroy_file(&path)?;
        db.meta.tabs.remove(tab_name);
        self.flush_meta()
    }

    /// Create an index over `col_names` and backfill it with every record
    /// already in the table, then mark the columns as indexed.
    pub fn create_index(&mut self, tab_name: &str, col_names: &[&str]) -> CatalogResult<()> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        let tab = db.meta.get_table(tab_name)?;
        let mut cols = Vec::with_capacity(col_names.len());
        for name in col_names {
            cols.push(tab.get_col(name)?.clone());
        }
        let ix_name = self.index_manager.index_name(tab_name, &cols);
        if tab.indexes.contains_key(&ix_name) {
            return Err(CatalogError::IndexExists {
                table: tab_name.to_string(),
                columns: col_names.join(","),
            });
        }

        self.index_manager.create_index(&db.dir, tab_name, &cols)?;
        let mut handle = self.index_manager.open_index(&db.dir, tab_name, &cols)?;

        // Existing records enter the index before it goes live.
        let file = db
            .tables
            .get(tab_name)
            .ok_or_else(|| CatalogError::TableNotFound(tab_name.to_string()))?;
        let mut scan = RecordScan::open(file)?;
        while !scan.is_end() {
            let rid = scan.rid();
            let record = file.get_record(rid)?;
            let mut key = Vec::new();
            for col in &cols {
                let start = col.offset as usize;
                key.extend_from_slice(&record.data[start..start + col.len as usize]);
            }
            handle.insert_entry(&key, rid)?;
            scan.next()?;
        }
        drop(scan);

        db.indexes.insert(ix_name.clone(), handle);
        let col_tot_len: i32 = cols.iter().map(|col| col.len).sum();
        let tab = db.meta.get_table_mut(tab_name)?;
        for col in &cols {
            tab.get_col_mut(&col.name)?.indexed = true;
        }
        tab.indexes.insert(
            ix_name.clone(),
            IndexMeta {
                tab_name: tab_name.to_string(),
                index_name: ix_name,
                col_tot_len,
                cols,
            },
        );
        self.flush_meta()
    }

    /// Drop an index and clear the indexed flag on its columns.
    pub fn drop_index(&mut self, tab_name: &str, col_names: &[&str]) -> CatalogResult<()> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        let tab = db.meta.get_table(tab_name)?;
        let mut cols = Vec::with_capacity(col_names.len());
        for name in col_names {
            cols.push(tab.get_col(name)?.clone());
        }
        let ix_name = self.index_manager.index_name(tab_name, &cols);
        if !tab.indexes.contains_key(&ix_name) || !DiskManager::is_file(&db.dir.join(&ix_name)) {
            return Err(CatalogError::IndexNotFound {
                table: tab_name.to_string(),
                columns: col_names.join(","),
            });
        }

        if let Some(handle) = db.indexes.remove(&ix_name) {
            self.index_manager.close_index(handle)?;
        }
        self.index_manager.destroy_index(&db.dir, tab_name, &cols)?;
        let tab = db.meta.get_table_mut(tab_name)?;
        tab.indexes.remove(&ix_name);
        for col in &cols {
            tab.get_col_mut(&col.name)?.indexed = false;
        }
        self.flush_meta()
    }

    /// Names of every table, in order.
    pub fn show_tables(&self) -> CatalogResult<Vec<String>> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        Ok(db.meta.tabs.keys().cloned().collect())
    }

    /// Names of every index on a table, in order.
    pub fn show_indexes(&self, tab_name: &str) -> CatalogResult<Vec<String>> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        Ok(db.meta.get_table(tab_name)?.indexes.keys().cloned().collect())
    }

    /// Full metadata of one table.
    pub fn desc_table(&self, tab_name: &str) -> CatalogResult<&TabMeta> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        db.meta.get_table(tab_name)
    }

    /// The open heap file backing a table.
    pub fn table(&self, tab_name: &str) -> CatalogResult<&HeapFile> {
        let db = self.db.as_ref().ok_or_else(no_open_db)?;
        db.tables
            .get(tab_name)
            .ok_or_else(|| CatalogError::TableNotFound(tab_name.to_string()))
    }

    pub fn table_mut(&mut self, tab_name: &str) -> CatalogResult<&mut HeapFile> {
        let db = self.db.as_mut().ok_or_else(no_open_db)?;
        db.tables
            .get_mut(tab_name)
            .ok_or_else(|| CatalogError::TableNotFound(tab_name.to_string()))
    }
}

fn no_open_db() -> CatalogError {
    CatalogError::DatabaseNotFound("no database is open".to_string())
}
