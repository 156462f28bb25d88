//! The virtual filesystem engine.
//!
//! A [`TreeBuilder`] turns a parsed document into an immutable [`Tree`] of
//! entry nodes, the resolver walks that tree by path, and
//! [`TreeFilesystem`] answers attribute, listing, open and read requests on
//! top of it.

mod adapter;
mod builder;
mod resolver;
mod tree;

#[cfg(test)]
pub(crate) mod fixtures;

pub use adapter::{FsError, TreeFilesystem};
pub use builder::{TreeBuildError, TreeBuilder};
pub use tree::EntryType;

#[cfg(feature = "fuse")]
pub use adapter::EntryAttributes;
#[cfg(feature = "fuse")]
pub use tree::{Identity, join_path};
