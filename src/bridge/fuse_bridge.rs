use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use libc::c_int;
use snafu::prelude::*;
use tracing::{debug, info};

use super::inode_table::{InodeRecord, InodeTable};
use crate::ext::BestEffortPathExt;
use crate::filesystem::{EntryAttributes, EntryType, FsError, TreeFilesystem, join_path};

/// The tree never changes, so the kernel may cache freely
const TTL: Duration = Duration::from_secs(60);
const BLOCK_SIZE: u32 = 4096;
const MAX_NAME_LENGTH: u32 = 255;

impl FsError {
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NotFound { .. } => libc::ENOENT,
            FsError::NotADirectory { .. } => libc::ENOTDIR,
            FsError::IsADirectory { .. } => libc::EISDIR,
            FsError::MalformedRequest { .. } => libc::EINVAL,
        }
    }
}

impl From<EntryType> for FileType {
    fn from(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::RegularFile => FileType::RegularFile,
            EntryType::Directory => FileType::Directory,
        }
    }
}

/// Serves a [`TreeFilesystem`] to the kernel through FUSE
pub struct FuseBridge {
    filesystem: TreeFilesystem,
    inodes: InodeTable,
    mounted_at: SystemTime,
    uid: u32,
    gid: u32,
}

impl FuseBridge {
    pub fn new(filesystem: TreeFilesystem) -> Result<Self, FsError> {
        let inodes = InodeTable::build(&filesystem)?;
        // SAFETY: getuid/getgid have no preconditions and cannot fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };

        Ok(Self {
            filesystem,
            inodes,
            mounted_at: SystemTime::now(),
            uid,
            gid,
        })
    }

    fn record(&self, ino: u64) -> Result<&InodeRecord, FsError> {
        self.inodes.get(ino).ok_or_else(|| FsError::NotFound {
            path: format!("<inode {ino}>"),
        })
    }

    fn file_attr(&self, ino: u64, attributes: &EntryAttributes) -> FileAttr {
        FileAttr {
            ino,
            size: attributes.size,
            blocks: attributes.size.div_ceil(512),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: attributes.entry_type.into(),
            perm: attributes.permissions,
            nlink: attributes.link_count,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn attr_of(&self, ino: u64) -> Result<FileAttr, FsError> {
        let record = self.record(ino)?;
        let attributes = self.filesystem.get_attributes(&record.path)?;
        Ok(self.file_attr(ino, &attributes))
    }

    fn lookup_child(&self, parent: u64, name: &OsStr) -> Result<FileAttr, FsError> {
        let parent = self.record(parent)?;
        let name = name.to_str().ok_or_else(|| FsError::NotFound {
            path: join_path(&parent.path, &name.to_string_lossy()),
        })?;

        let path = join_path(&parent.path, name);
        let attributes = self.filesystem.get_attributes(&path)?;
        let ino = self
            .inodes
            .ino_of(&path)
            .ok_or(FsError::NotFound { path })?;
        if let Some(record) = self.inodes.get(ino) {
            debug!("'{}' is inode {} for entry #{}", record.path, ino, record.identity);
        }
        Ok(self.file_attr(ino, &attributes))
    }

    /// Listing entries from `offset` on, each paired with the offset that
    /// resumes the listing right after it
    fn directory_page(&self, ino: u64, offset: usize) -> Result<Vec<PageEntry>, FsError> {
        Ok(self
            .directory_entries(ino)?
            .into_iter()
            .enumerate()
            .skip(offset)
            .map(|(index, (entry_ino, kind, name))| PageEntry {
                ino: entry_ino,
                next_offset: (index + 1) as i64,
                kind,
                name,
            })
            .collect())
    }

    fn directory_entries(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>, FsError> {
        let record = self.record(ino)?;
        self.filesystem
            .list_directory(&record.path)?
            .into_iter()
            .map(|entry| -> Result<_, FsError> {
                let entry_ino = match entry.name.as_str() {
                    "." => ino,
                    ".." => record.parent,
                    name => {
                        let path = join_path(&record.path, name);
                        self.inodes
                            .ino_of(&path)
                            .ok_or(FsError::NotFound { path })?
                    }
                };
                Ok((entry_ino, entry.entry_type.into(), entry.name))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PageEntry {
    ino: u64,
    next_offset: i64,
    kind: FileType,
    name: String,
}

impl Filesystem for FuseBridge {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("Mounted tree with {} entries", self.inodes.len());
        Ok(())
    }

    fn destroy(&mut self) {
        info!("Unmounted tree");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup parent={} name={:?}", parent, name);
        match self.lookup_child(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr_of(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let write_flags = libc::O_WRONLY | libc::O_RDWR | libc::O_APPEND | libc::O_TRUNC;
        if flags & write_flags != 0 {
            reply.error(libc::EROFS);
            return;
        }

        let opened = self
            .record(ino)
            .and_then(|record| self.filesystem.open(&record.path));
        match opened {
            Ok(()) => reply.opened(0, 0),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        let read = self
            .record(ino)
            .and_then(|record| self.filesystem.read(&record.path, offset, size as usize));
        match read {
            Ok(bytes) => reply.data(bytes),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.record(ino) {
            Ok(record) if record.entry_type == EntryType::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Ok(offset) = usize::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        let page = match self.directory_page(ino, offset) {
            Ok(page) => page,
            Err(error) => {
                reply.error(error.errno());
                return;
            }
        };

        for entry in page {
            if reply.add(entry.ino, entry.next_offset, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let total_bytes = self
            .filesystem
            .tree()
            .walk()
            .map(|entry| entry.node.content_len())
            .sum::<u64>();
        let blocks = total_bytes.div_ceil(u64::from(BLOCK_SIZE));

        reply.statfs(
            blocks,
            0,
            0,
            self.inodes.len() as u64,
            0,
            BLOCK_SIZE,
            MAX_NAME_LENGTH,
            BLOCK_SIZE,
        );
    }
}

#[derive(Debug, Clone)]
pub struct MountOptions {
    pub allow_other: bool,
    pub fsname: String,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            allow_other: false,
            fsname: "treefs".to_string(),
        }
    }
}

impl MountOptions {
    fn to_fuser_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fsname.clone()),
            MountOption::RO,
            MountOption::DefaultPermissions,
        ];
        // fuser refuses auto-unmount unless other users may access the mount
        if self.allow_other {
            options.push(MountOption::AllowOther);
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

/// Mounts the tree and blocks until it is unmounted
pub fn mount(
    filesystem: TreeFilesystem,
    mountpoint: &Path,
    options: MountOptions,
) -> Result<(), MountError> {
    let bridge = FuseBridge::new(filesystem).context(InodeTableSnafu)?;
    info!(
        "Mounting {} entries at {}",
        bridge.inodes.len(),
        mountpoint.best_effort_path_display()
    );
    fuser::mount2(bridge, mountpoint, &options.to_fuser_options()).context(SessionSnafu)
}

#[derive(Debug, Snafu)]
pub enum MountError {
    #[snafu(display("Failed to assign inodes to the tree"))]
    InodeTableError { source: FsError },
    #[snafu(display("The FUSE session failed"))]
    SessionError { source: std::io::Error },
}
