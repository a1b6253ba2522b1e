//! Hooks for external index implementations.
//!
//! Index structures (B-trees and friends) live outside this crate. The
//! catalog only needs file naming, lifecycle, and entry insertion so that
//! `create_index` can backfill a new index from the existing records.

use crate::catalog::meta::ColMeta;
use crate::record::Rid;
use anyhow::{bail, Result};
use std::fs;
use std::path::Path;

/// One open index. Keys are the indexed columns' bytes, concatenated in
/// index-column order.
pub trait IndexHandle: Send {
    fn insert_entry(&mut self, key: &[u8], rid: Rid) -> Result<()>;
    fn delete_entry(&mut self, key: &[u8], rid: Rid) -> Result<()>;
}

/// Lifecycle of index files within a database directory.
pub trait IndexManager {
    /// On-disk name of an index file: `<table>_<col1>_<col2>....idx`.
    fn index_name(&self, tab_name: &str, cols: &[ColMeta]) -> String {
        let mut name = String::from(tab_name);
        for col in cols {
            name.push('_');
            name.push_str(&col.name);
        }
        name.push_str(".idx");
        name
    }

    fn create_index(&self, dir: &Path, tab_name: &str, cols: &[ColMeta]) -> Result<()>;
    fn open_index(&self, dir: &Path, tab_name: &str, cols: &[ColMeta])
        -> Result<Box<dyn IndexHandle>>;
    fn close_index(&self, handle: Box<dyn IndexHandle>) -> Result<()>;
    fn destroy_index(&self, dir: &Path, tab_name: &str, cols: &[ColMeta]) -> Result<()>;
}

/// Backend that keeps the catalog's on-disk layout (one `.idx` file per
/// index) without maintaining any structure. Engines with a real index swap
/// this out.
#[derive(Debug, Default)]
pub struct NullIndexManager;

struct NullIndexHandle;

impl IndexHandle for NullIndexHandle {
    fn insert_entry(&mut self, _key: &[u8], _rid: Rid) -> Result<()> {
        Ok(())
    }

    fn delete_entry(&mut self, _key: &[u8], _rid: Rid) -> Result<()> {
        Ok(())
    }
}

impl IndexManager for NullIndexManager {
    fn create_index(&self, dir: &Path, tab_name: &str, cols: &[ColMeta]) -> Result<()> {
        let path = dir.join(self.index_name(tab_name, cols));
        if path.exists() {
            bail!("index file already exists: {}", path.display());
        }
        fs::File::create(&path)?;
        Ok(())
    }

    fn open_index(
        &self,
        dir: &Path,
        tab_name: &str,
        cols: &[ColMeta],
    ) -> Result<Box<dyn IndexHandle>> {
        let path = dir.join(self.index_name(tab_name, cols));
        if !path.is_file() {
            bail!("index file not found: {}", path.display());
        }
        Ok(Box::new(NullIndexHandle))
    }

    fn close_index(&self, _handle: Box<dyn IndexHandle>) -> Result<()> {
        Ok(())
    }

    fn destroy_index(&self, dir: &Path, tab_name: &str, cols: &[ColMeta]) -> Result<()> {
        fs::remove_file(dir.join(self.index_name(tab_name, cols)))?;
        Ok(())
    }
}
