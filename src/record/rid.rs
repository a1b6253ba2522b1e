use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Identifies a record within one heap file: the data page it lives on and
/// its slot there. Stable for the record's lifetime, reused after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Rid {
    pub fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

impl PartialOrd for Rid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rid {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.page_no.cmp(&other.page_no) {
            Ordering::Equal => self.slot_no.cmp(&other.slot_no),
            other => other,
        }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot_no)
    }
}

/// A record copied out of its page. The buffer belongs to the caller and
/// stays valid after the page's pin is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}
