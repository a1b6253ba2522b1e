use serde::{Deserialize, Serialize};

/// Page number that no page can have. Frames holding no page carry it.
pub const INVALID_PAGE_NO: i32 = -1;

/// Opaque handle for a file opened through the disk manager.
///
/// Handles are allocated from a process-wide counter and never reused, so a
/// stale handle can fail cleanly instead of aliasing a later file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    pub const INVALID: FileId = FileId(u32::MAX);
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// Identifies one page: which file it belongs to and its index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub file_id: FileId,
    pub page_no: i32,
}

impl PageId {
    pub const INVALID: PageId = PageId {
        file_id: FileId::INVALID,
        page_no: INVALID_PAGE_NO,
    };

    pub fn new(file_id: FileId, page_no: i32) -> Self {
        Self { file_id, page_no }
    }

    pub fn is_valid(&self) -> bool {
        self.file_id != FileId::INVALID && self.page_no >= 0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PageId({}, {})", self.file_id.0, self.page_no)
    }
}
