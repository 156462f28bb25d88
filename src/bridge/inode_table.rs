use std::collections::HashMap;

use tracing::debug;

use crate::filesystem::{EntryType, FsError, Identity, TreeFilesystem, join_path};

/// Inode number of the mount root, as FUSE expects it
pub const ROOT_INO: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeRecord {
    pub path: String,
    pub parent: u64,
    pub identity: Identity,
    pub entry_type: EntryType,
}

/// Maps FUSE inode numbers onto tree paths.
///
/// Entry identities come from the document and may collide with the fixed
/// FUSE root inode, so inodes are handed out sequentially instead. The tree
/// never changes, so the table is built once.
#[derive(Debug)]
pub struct InodeTable {
    records: Vec<InodeRecord>,
    by_path: HashMap<String, u64>,
}

impl InodeTable {
    pub fn build(filesystem: &TreeFilesystem) -> Result<Self, FsError> {
        let root = filesystem.get_attributes("/")?;
        let mut table = InodeTable {
            records: Vec::with_capacity(filesystem.tree().len()),
            by_path: HashMap::with_capacity(filesystem.tree().len()),
        };
        table.insert(InodeRecord {
            path: "/".to_string(),
            parent: ROOT_INO,
            identity: root.identity,
            entry_type: root.entry_type,
        });

        let mut pending = vec![ROOT_INO];
        while let Some(ino) = pending.pop() {
            let path = table.records[Self::index(ino)].path.clone();
            for entry in filesystem.list_directory(&path)?.into_iter().skip(2) {
                let child_ino = table.insert(InodeRecord {
                    path: join_path(&path, &entry.name),
                    parent: ino,
                    identity: entry.identity,
                    entry_type: entry.entry_type,
                });
                if entry.entry_type == EntryType::Directory {
                    pending.push(child_ino);
                }
            }
        }

        debug!("Assigned {} inodes", table.records.len());
        Ok(table)
    }

    fn index(ino: u64) -> usize {
        (ino - ROOT_INO) as usize
    }

    fn insert(&mut self, record: InodeRecord) -> u64 {
        let ino = self.records.len() as u64 + ROOT_INO;
        self.by_path.insert(record.path.clone(), ino);
        self.records.push(record);
        ino
    }

    pub fn get(&self, ino: u64) -> Option<&InodeRecord> {
        ino.checked_sub(ROOT_INO)
            .and_then(|index| self.records.get(usize::try_from(index).ok()?))
    }

    pub fn ino_of(&self, path: &str) -> Option<u64> {
        self.by_path.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::fixtures::scenario_filesystem;
    use rstest::*;

    #[test]
    fn assigns_one_inode_per_entry_with_root_first() {
        let filesystem = scenario_filesystem();

        let table = InodeTable::build(&filesystem).expect("table should build");

        assert_eq!(table.len(), filesystem.tree().len());
        let root = table.get(ROOT_INO).expect("root inode should exist");
        assert_eq!(root.path, "/");
        assert_eq!(root.parent, ROOT_INO);
        assert_eq!(root.identity, Identity::from(1));
    }

    #[rstest]
    #[case("/greeting", "/", 2)]
    #[case("/sub", "/", 3)]
    #[case("/sub/note", "/sub", 4)]
    fn records_paths_parents_and_identities(
        #[case] path: &str,
        #[case] parent_path: &str,
        #[case] identity: u64,
    ) {
        let table = InodeTable::build(&scenario_filesystem()).expect("table should build");

        let ino = table.ino_of(path).expect("path should have an inode");
        let record = table.get(ino).expect("inode should have a record");

        assert_eq!(record.path, path);
        assert_eq!(Some(record.parent), table.ino_of(parent_path));
        assert_eq!(record.identity, Identity::from(identity));
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    #[case(u64::MAX)]
    fn unknown_inodes_have_no_record(#[case] ino: u64) {
        let table = InodeTable::build(&scenario_filesystem()).expect("table should build");

        assert!(table.get(ino).is_none());
    }
}
