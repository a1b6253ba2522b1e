pub mod bitmap;
pub mod error;
pub mod heap_file;
pub mod manager;
pub mod page;
pub mod rid;
pub mod scan;

pub use error::{RecordError, RecordResult};
pub use heap_file::HeapFile;
pub use manager::RecordManager;
pub use rid::{Record, Rid};
pub use scan::RecordScan;

/// Sentinel for "no page" in the heap file's free-list links.
pub const NO_PAGE: i32 = -1;

/// Data pages start after the header page.
pub const FIRST_RECORD_PAGE: i32 = 1;
