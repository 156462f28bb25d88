//! The tree document: entry descriptions as written on disk, and the loader
//! that reads them.

mod description;
mod loader;

pub use description::{ChildReference, ChildTarget, Document, EntryDescription};
pub use loader::{DEFAULT_DOCUMENT_FILE_NAME, DocumentLoadError};
