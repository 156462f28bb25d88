use std::sync::Arc;

use snafu::Snafu;
use tracing::debug;

use super::resolver::ResolveError;
use super::tree::{EntryNode, EntryType, Identity, Tree, parent_path};

pub const DIRECTORY_PERMISSIONS: u16 = 0o755;
pub const FILE_PERMISSIONS: u16 = 0o777;
const DIRECTORY_LINK_COUNT: u32 = 2;
const FILE_LINK_COUNT: u32 = 1;

/// Fixed-shape attributes reported for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryAttributes {
    pub identity: Identity,
    pub entry_type: EntryType,
    pub size: u64,
    pub permissions: u16,
    pub link_count: u32,
}

impl From<&EntryNode> for EntryAttributes {
    fn from(node: &EntryNode) -> Self {
        match node.entry_type() {
            EntryType::Directory => EntryAttributes {
                identity: node.identity(),
                entry_type: EntryType::Directory,
                size: 0,
                permissions: DIRECTORY_PERMISSIONS,
                link_count: DIRECTORY_LINK_COUNT,
            },
            EntryType::RegularFile => EntryAttributes {
                identity: node.identity(),
                entry_type: EntryType::RegularFile,
                size: node.content_len(),
                permissions: FILE_PERMISSIONS,
                link_count: FILE_LINK_COUNT,
            },
        }
    }
}

/// One line of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub identity: Identity,
    pub entry_type: EntryType,
}

/// Read-only filesystem operations over an immutable tree.
///
/// Every call resolves its path independently; there are no open handles
/// and no per-call state, so a single instance can serve concurrent
/// requests from any number of threads.
#[derive(Debug, Clone)]
pub struct TreeFilesystem {
    tree: Arc<Tree>,
}

impl TreeFilesystem {
    pub fn new(tree: impl Into<Arc<Tree>>) -> Self {
        Self { tree: tree.into() }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn get_attributes(&self, path: &str) -> Result<EntryAttributes, FsError> {
        debug!("getattr '{}'", path);
        let node = self.tree.resolve(path)?;
        Ok(EntryAttributes::from(node))
    }

    /// Lists `.` and `..` followed by the children in declaration order
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, FsError> {
        debug!("readdir '{}'", path);
        let node = self.tree.resolve(path)?;
        if !node.is_directory() {
            return Err(FsError::NotADirectory {
                path: path.to_string(),
            });
        }
        let parent = self.tree.resolve(parent_path(path))?;

        let mut entries = Vec::with_capacity(node.children().count() + 2);
        entries.push(DirectoryEntry {
            name: ".".to_string(),
            identity: node.identity(),
            entry_type: EntryType::Directory,
        });
        entries.push(DirectoryEntry {
            name: "..".to_string(),
            identity: parent.identity(),
            entry_type: EntryType::Directory,
        });
        entries.extend(node.children().map(|(name, child)| DirectoryEntry {
            name: name.to_string(),
            identity: child.identity(),
            entry_type: child.entry_type(),
        }));

        Ok(entries)
    }

    /// Succeeds for any existing entry. Reads are addressed by path, so no
    /// handle is handed out.
    pub fn open(&self, path: &str) -> Result<(), FsError> {
        debug!("open '{}'", path);
        self.tree.resolve(path)?;
        Ok(())
    }

    /// Returns at most `max_length` bytes starting at `offset`, clipped to
    /// the end of the content. Reading at or past the end yields an empty
    /// slice.
    pub fn read(&self, path: &str, offset: u64, max_length: usize) -> Result<&[u8], FsError> {
        debug!("read '{}' offset={} length={}", path, offset, max_length);
        let node = self.tree.resolve(path)?;
        let content = node.content().ok_or_else(|| FsError::IsADirectory {
            path: path.to_string(),
        })?;

        let start = match usize::try_from(offset) {
            Ok(start) if start < content.len() => start,
            _ => return Ok(&[]),
        };
        let end = start.saturating_add(max_length).min(content.len());
        Ok(&content[start..end])
    }
}

/// Outcome of a failed filesystem request. Each variant maps onto one
/// conventional errno value at the kernel bridge.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum FsError {
    #[snafu(display("No such entry: '{}'", path))]
    NotFound { path: String },
    #[snafu(display("Not a directory: '{}'", path))]
    NotADirectory { path: String },
    #[snafu(display("Is a directory: '{}'", path))]
    IsADirectory { path: String },
    #[snafu(display("Malformed request for '{}': {}", path, reason))]
    MalformedRequest { path: String, reason: String },
}

impl From<ResolveError> for FsError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::NotFound { path } => FsError::NotFound { path },
            ResolveError::NotADirectory { path, .. } => FsError::NotADirectory { path },
            ResolveError::InvalidPath { path, reason } => FsError::MalformedRequest {
                path,
                reason: reason.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::fixtures::{scenario_filesystem, scenario_tree};
    use rstest::*;
    use std::thread;

    fn names(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn lists_root_of_the_scenario() {
        let filesystem = scenario_filesystem();

        let entries = filesystem.list_directory("/").expect("root should list");

        assert_eq!(names(&entries), vec![".", "..", "greeting", "sub"]);
    }

    #[test]
    fn scenario_attributes_and_reads() {
        let filesystem = scenario_filesystem();

        assert_eq!(filesystem.get_attributes("/greeting").map(|a| a.size), Ok(3));
        assert_eq!(filesystem.read("/greeting", 1, 10), Ok(&b"i\n"[..]));
        assert_eq!(filesystem.read("/greeting", 5, 10), Ok(&b""[..]));
        assert_eq!(filesystem.get_attributes("/sub/note").map(|a| a.size), Ok(1));
        assert_eq!(
            filesystem.read("/sub", 0, 10),
            Err(FsError::IsADirectory {
                path: "/sub".to_string()
            })
        );
        assert_eq!(
            filesystem.get_attributes("/missing"),
            Err(FsError::NotFound {
                path: "/missing".to_string()
            })
        );
    }

    #[test]
    fn root_attributes_are_fixed() {
        let filesystem = scenario_filesystem();

        let attributes = filesystem.get_attributes("/").expect("root should exist");

        assert_eq!(
            attributes,
            EntryAttributes {
                identity: Identity::from(1),
                entry_type: EntryType::Directory,
                size: 0,
                permissions: 0o755,
                link_count: 2,
            }
        );
    }

    #[test]
    fn file_attributes_report_exact_size() {
        let filesystem = scenario_filesystem();

        for entry in filesystem.tree().walk() {
            let attributes = filesystem
                .get_attributes(&entry.path)
                .expect("walked entries should exist");
            if let Some(content) = entry.node.content() {
                assert_eq!(attributes.size, content.len() as u64);
                assert_eq!(attributes.permissions, FILE_PERMISSIONS);
                assert_eq!(attributes.link_count, 1);
            }
        }
    }

    #[test]
    fn listing_length_is_children_plus_two() {
        let filesystem = scenario_filesystem();

        for entry in filesystem.tree().walk().filter(|entry| entry.node.is_directory()) {
            let listing = filesystem
                .list_directory(&entry.path)
                .expect("directory should list");
            let declared = entry.node.children().map(|(name, _)| name).collect::<Vec<_>>();

            assert_eq!(listing.len(), declared.len() + 2);
            assert_eq!(names(&listing[2..]), declared);
        }
    }

    #[test]
    fn dot_entries_point_at_self_and_parent() {
        let filesystem = scenario_filesystem();

        let root = filesystem.list_directory("/").expect("root should list");
        let sub = filesystem.list_directory("/sub").expect("sub should list");

        assert_eq!(root[0].identity, Identity::from(1));
        assert_eq!(root[1].identity, Identity::from(1));
        assert_eq!(sub[0].identity, Identity::from(3));
        assert_eq!(sub[1].identity, Identity::from(1));
        assert_eq!(sub[2].entry_type, EntryType::RegularFile);
    }

    #[rstest]
    #[case("/greeting")]
    #[case("/sub/note")]
    fn listing_a_file_is_not_a_directory(#[case] path: &str) {
        let filesystem = scenario_filesystem();

        let result = filesystem.list_directory(path);

        assert!(matches!(result, Err(FsError::NotADirectory { .. })));
    }

    #[rstest]
    #[case("/", true)]
    #[case("/greeting", true)]
    #[case("/sub", true)]
    #[case("/sub/note", true)]
    #[case("/missing", false)]
    #[case("/sub/missing", false)]
    fn open_succeeds_for_existing_entries(#[case] path: &str, #[case] exists: bool) {
        let filesystem = scenario_filesystem();

        let result = filesystem.open(path);

        assert_eq!(result.is_ok(), exists);
        if !exists {
            assert!(matches!(result, Err(FsError::NotFound { .. })));
        }
    }

    #[rstest]
    #[case(0, 0, "")]
    #[case(0, 1, "h")]
    #[case(0, 3, "hi\n")]
    #[case(0, 100, "hi\n")]
    #[case(2, 1, "\n")]
    #[case(3, 10, "")]
    #[case(u64::MAX, 10, "")]
    #[case(1, usize::MAX, "i\n")]
    fn reads_are_clipped_to_content(
        #[case] offset: u64,
        #[case] length: usize,
        #[case] expected: &str,
    ) {
        let filesystem = scenario_filesystem();

        let bytes = filesystem.read("/greeting", offset, length).expect("read should succeed");

        assert_eq!(bytes, expected.as_bytes());
    }

    #[rstest]
    fn chunked_reads_reconstruct_content(#[values(1, 2, 3, 7, 4096)] chunk: usize) {
        let filesystem = scenario_filesystem();
        let original = filesystem
            .tree()
            .resolve("/greeting")
            .ok()
            .and_then(EntryNode::content)
            .expect("fixture file should have content")
            .to_vec();

        let mut reconstructed = Vec::new();
        let mut offset = 0u64;
        loop {
            let bytes = filesystem
                .read("/greeting", offset, chunk)
                .expect("read should succeed");
            if bytes.is_empty() {
                break;
            }
            reconstructed.extend_from_slice(bytes);
            offset += bytes.len() as u64;
        }

        assert_eq!(reconstructed, original);
        assert_eq!(offset, original.len() as u64);
        assert_eq!(filesystem.read("/greeting", offset, chunk), Ok(&b""[..]));
    }

    #[rstest]
    #[case("/greeting/inner")]
    #[case("/sub/note/inner")]
    fn operations_through_a_file_are_not_a_directory(#[case] path: &str) {
        let filesystem = scenario_filesystem();

        assert!(matches!(
            filesystem.get_attributes(path),
            Err(FsError::NotADirectory { .. })
        ));
        assert!(matches!(filesystem.open(path), Err(FsError::NotADirectory { .. })));
        assert!(matches!(filesystem.read(path, 0, 1), Err(FsError::NotADirectory { .. })));
        assert!(matches!(
            filesystem.list_directory(path),
            Err(FsError::NotADirectory { .. })
        ));
    }

    #[test]
    fn invalid_paths_are_malformed_requests() {
        let filesystem = scenario_filesystem();

        let result = filesystem.get_attributes("/sub//note");

        assert!(matches!(result, Err(FsError::MalformedRequest { .. })));
    }

    #[test]
    fn failing_requests_do_not_affect_others() {
        let filesystem = scenario_filesystem();

        assert!(filesystem.read("/missing", 0, 1).is_err());
        assert!(filesystem.read("/sub", 0, 1).is_err());

        assert_eq!(filesystem.read("/sub/note", 0, 1), Ok(&b"x"[..]));
    }

    #[test]
    fn serves_concurrent_requests_without_locks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TreeFilesystem>();

        let filesystem = TreeFilesystem::new(scenario_tree());

        thread::scope(|scope| {
            for _ in 0..8 {
                let filesystem = filesystem.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(filesystem.read("/greeting", 1, 10), Ok(&b"i\n"[..]));
                        assert_eq!(
                            names(&filesystem.list_directory("/").expect("root should list")),
                            vec![".", "..", "greeting", "sub"]
                        );
                    }
                });
            }
        });
    }
}
