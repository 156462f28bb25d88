//! FUSE bridge exposing a [`TreeFilesystem`](crate::filesystem::TreeFilesystem)
//! as a read-only mount.

mod fuse_bridge;
mod inode_table;

pub use fuse_bridge::{MountError, MountOptions, mount};
