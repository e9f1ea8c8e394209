//! Repository scanning: which paths are indexable and how to enumerate them.

mod ignore_filter;
mod walker;

pub use ignore_filter::IgnoreFilter;
pub use walker::{to_slash, FileEntry, Walker};
