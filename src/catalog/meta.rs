//! Catalog metadata: databases, tables, columns and indexes, persisted as a
//! whitespace-separated text blob that is written and re-read in full.

use crate::catalog::error::{CatalogError, CatalogResult};
use std::collections::BTreeMap;
use std::fmt;

/// Column type, encoded as a small integer agreed with the outer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColType {
    Int,
    Float,
    String,
}

impl ColType {
    pub fn code(self) -> i32 {
        match self {
            ColType::Int => 0,
            ColType::Float => 1,
            ColType::String => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ColType::Int),
            1 => Some(ColType::Float),
            2 => Some(ColType::String),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColType::Int => "INT",
            ColType::Float => "FLOAT",
            ColType::String => "STRING",
        }
    }
}

impl fmt::Display for ColType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One column of a table: type, byte length, and offset within the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColMeta {
    pub tab_name: String,
    pub name: String,
    pub col_type: ColType,
    pub len: i32,
    pub offset: i32,
    pub indexed: bool,
}

impl fmt::Display for ColMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.tab_name,
            self.name,
            self.col_type.code(),
            self.len,
            self.offset,
            self.indexed as i32
        )
    }
}

/// One index: its file name, total key length, and participating columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub tab_name: String,
    pub index_name: String,
    pub col_tot_len: i32,
    pub cols: Vec<ColMeta>,
}

impl fmt::Display for IndexMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.tab_name,
            self.index_name,
            self.col_tot_len,
            self.cols.len()
        )?;
        for col in &self.cols {
            write!(f, "\n{}", col)?;
        }
        Ok(())
    }
}

/// One table: ordered columns plus the indexes built on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabMeta {
    pub name: String,
    pub cols: Vec<ColMeta>,
    pub indexes: BTreeMap<String, IndexMeta>,
}

impl TabMeta {
    pub fn is_col(&self, col_name: &str) -> bool {
        self.cols.iter().any(|col| col.name == col_name)
    }

    pub fn get_col(&self, col_name: &str) -> CatalogResult<&ColMeta> {
        self.cols
            .iter()
            .find(|col| col.name == col_name)
            .ok_or_else(|| CatalogError::ColumnNotFound(col_name.to_string()))
    }

    pub fn get_col_mut(&mut self, col_name: &str) -> CatalogResult<&mut ColMeta> {
        self.cols
            .iter_mut()
            .find(|col| col.name == col_name)
            .ok_or_else(|| CatalogError::ColumnNotFound(col_name.to_string()))
    }

    pub fn get_index_meta(&self, index_name: &str) -> Option<&IndexMeta> {
        self.indexes.get(index_name)
    }
}

impl fmt::Display for TabMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", self.cols.len())?;
        for col in &self.cols {
            writeln!(f, "{}", col)?;
        }
        writeln!(f, "{}", self.indexes.len())?;
        for (index_name, index) in &self.indexes {
            writeln!(f, "{}", index_name)?;
            writeln!(f, "{}", index)?;
        }
        Ok(())
    }
}

/// One database: its name and ordered table map. The whole value is written
/// out by `Display` and read back by [`DbMeta::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbMeta {
    pub name: String,
    pub tabs: BTreeMap<String, TabMeta>,
}

impl DbMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tabs: BTreeMap::new(),
        }
    }

    pub fn is_table(&self, tab_name: &str) -> bool {
        self.tabs.contains_key(tab_name)
    }

    pub fn get_table(&self, tab_name: &str) -> CatalogResult<&TabMeta> {
        self.tabs
            .get(tab_name)
            .ok_or_else(|| CatalogError::TableNotFound(tab_name.to_string()))
    }

    pub fn get_table_mut(&mut self, tab_name: &str) -> CatalogResult<&mut TabMeta> {
        self.tabs
            .get_mut(tab_name)
            .ok_or_else(|| CatalogError::TableNotFound(tab_name.to_string()))
    }

    pub fn parse(text: &str) -> CatalogResult<Self> {
        let mut tokens = Tokens(text.split_whitespace());
        let name = tokens.next()?.to_string();
        let num_tabs = tokens.next_usize()?;
        let mut tabs = BTreeMap::new();
        for _ in 0..num_tabs {
            let tab = parse_tab(&mut tokens)?;
            tabs.insert(tab.name.clone(), tab);
        }
        Ok(Self { name, tabs })
    }
}

impl fmt::Display for DbMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", self.tabs.len())?;
        for tab in self.tabs.values() {
            writeln!(f, "{}", tab)?;
        }
        Ok(())
    }
}

struct Tokens<'a>(std::str::SplitWhitespace<'a>);

impl<'a> Tokens<'a> {
    fn next(&mut self) -> CatalogResult<&'a str> {
        self.0
            .next()
            .ok_or_else(|| CatalogError::Internal("truncated database metadata".into()))
    }

    fn next_i32(&mut self) -> CatalogResult<i32> {
        let token = self.next()?;
        token
            .parse()
            .map_err(|_| CatalogError::Internal(format!("bad number in metadata: {}", token)))
    }

    fn next_usize(&mut self) -> CatalogResult<usize> {
        let token = self.next()?;
        token
            .parse()
            .map_err(|_| CatalogError::Internal(format!("bad count in metadata: {}", token)))
    }
}

fn parse_col(tokens: &mut Tokens<'_>) -> CatalogResult<ColMeta> {
    let tab_name = tokens.next()?.to_string();
    let name = tokens.next()?.to_string();
    let code = tokens.next_i32()?;
    let col_type = ColType::from_code(code)
        .ok_or_else(|| CatalogError::Internal(format!("unknown column type code {}", code)))?;
    Ok(ColMeta {
        tab_name,
        name,
        col_type,
        len: tokens.next_i32()?,
        offset: tokens.next_i32()?,
        indexed: tokens.next_i32()? != 0,
    })
}

fn parse_index(tokens: &mut Tokens<'_>) -> CatalogResult<IndexMeta> {
    let tab_name = tokens.next()?.to_string();
    let index_name = tokens.next()?.to_string();
    let col_tot_len = tokens.next_i32()?;
    let col_num = tokens.next_usize()?;
    let mut cols = Vec::with_capacity(col_num);
    for _ in 0..col_num {
        cols.push(parse_col(tokens)?);
    }
    Ok(IndexMeta {
        tab_name,
        index_name,
        col_tot_len,
        cols,
    })
}

fn parse_tab(tokens: &mut Tokens<'_>) -> CatalogResult<TabMeta> {
    let name = tokens.next()?.to_string();
    let num_cols = tokens.next_usize()?;
    let mut cols = Vec::with_capacity(num_cols);
    for _ in 0..num_cols {
        cols.push(parse_col(tokens)?);
    }
    let num_indexes = tokens.next_usize()?;
    let mut indexes = BTreeMap::new();
    for _ in 0..num_indexes {
        let index_name = tokens.next()?.to_string();
        let index = parse_index(tokens)?;
        indexes.insert(index_name, index);
    }
    Ok(TabMeta {
        name,
        cols,
        indexes,
    })
}
