use derive_more::{Display, From, Into};
use hashlink::LinkedHashMap;

/// Identity of an entry, unique across a tree and stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
pub struct Identity(u64);

impl Identity {
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// The type of a filesystem entry, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EntryType {
    #[display("regular-file")]
    RegularFile,
    #[display("directory")]
    Directory,
}

impl EntryType {
    /// Maps a document type tag onto an entry type.
    /// Unrecognized tags yield `None` and are rejected by the builder.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "file" | "regular-file" => Some(EntryType::RegularFile),
            "dir" | "directory" => Some(EntryType::Directory),
            _ => None,
        }
    }
}

/// Payload of a filesystem entry.
///
/// Files own their content, directories own their children. Children keep
/// the order in which they were declared and are indexed by name.
#[derive(Debug)]
pub enum EntryKind {
    RegularFile {
        content: Vec<u8>,
    },
    Directory {
        children: LinkedHashMap<String, EntryNode>,
    },
}

#[derive(Debug)]
pub struct EntryNode {
    identity: Identity,
    kind: EntryKind,
}

/// Tears subtrees down with an explicit stack, so arbitrarily deep trees
/// drop without exhausting the thread stack.
impl Drop for EntryNode {
    fn drop(&mut self) {
        let EntryKind::Directory { children } = &mut self.kind else {
            return;
        };
        if children.is_empty() {
            return;
        }

        let mut pending = std::mem::take(children)
            .into_iter()
            .map(|(_, child)| child)
            .collect::<Vec<_>>();
        while let Some(mut node) = pending.pop() {
            if let EntryKind::Directory { children } = &mut node.kind {
                pending.extend(std::mem::take(children).into_iter().map(|(_, child)| child));
            }
        }
    }
}

impl EntryNode {
    pub(super) fn file(identity: Identity, content: Vec<u8>) -> Self {
        Self {
            identity,
            kind: EntryKind::RegularFile { content },
        }
    }

    pub(super) fn directory(
        identity: Identity,
        children: LinkedHashMap<String, EntryNode>,
    ) -> Self {
        Self {
            identity,
            kind: EntryKind::Directory { children },
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn entry_type(&self) -> EntryType {
        match self.kind {
            EntryKind::RegularFile { .. } => EntryType::RegularFile,
            EntryKind::Directory { .. } => EntryType::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    /// File content, `None` for directories
    pub fn content(&self) -> Option<&[u8]> {
        match &self.kind {
            EntryKind::RegularFile { content } => Some(content),
            EntryKind::Directory { .. } => None,
        }
    }

    /// Byte length of the content; zero for directories
    pub fn content_len(&self) -> u64 {
        self.content().map_or(0, |content| content.len() as u64)
    }

    /// Children in declaration order. Empty for files.
    pub fn children(&self) -> impl Iterator<Item = (&str, &EntryNode)> {
        let children = match &self.kind {
            EntryKind::Directory { children } => Some(children),
            EntryKind::RegularFile { .. } => None,
        };
        children
            .into_iter()
            .flat_map(|children| children.iter())
            .map(|(name, node)| (name.as_str(), node))
    }

    /// Looks up a direct child by exact name
    pub fn child(&self, name: &str) -> Option<&EntryNode> {
        match &self.kind {
            EntryKind::Directory { children } => children.get(name),
            EntryKind::RegularFile { .. } => None,
        }
    }
}

/// An immutable, fully built filesystem tree.
///
/// The tree is constructed once by [`TreeBuilder`](super::TreeBuilder) and
/// never changes afterwards, so shared references to it can be handed to any
/// number of threads.
#[derive(Debug)]
pub struct Tree {
    root: EntryNode,
    len: usize,
}

impl Tree {
    pub(super) fn new(root: EntryNode) -> Self {
        debug_assert!(root.is_directory(), "tree root must be a directory");
        let len = count_entries(&root);
        Self { root, len }
    }

    pub fn root(&self) -> &EntryNode {
        &self.root
    }

    /// Number of entries, root included
    pub fn len(&self) -> usize {
        self.len
    }

    /// Depth-first, pre-order traversal in declaration order
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(&self.root)
    }
}

#[derive(Debug, Clone)]
pub struct WalkEntry<'a> {
    pub path: String,
    pub name: &'a str,
    pub depth: usize,
    pub node: &'a EntryNode,
}

pub struct Walk<'a> {
    stack: Vec<WalkEntry<'a>>,
}

impl<'a> Walk<'a> {
    fn new(root: &'a EntryNode) -> Self {
        Self {
            stack: vec![WalkEntry {
                path: "/".to_string(),
                name: "",
                depth: 0,
                node: root,
            }],
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = WalkEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.stack.pop()?;
        let children = entry.node.children().collect::<Vec<_>>();
        // Reversed so that the first declared child is visited first
        for (name, node) in children.into_iter().rev() {
            self.stack.push(WalkEntry {
                path: join_path(&entry.path, name),
                name,
                depth: entry.depth + 1,
                node,
            });
        }
        Some(entry)
    }
}

fn count_entries(root: &EntryNode) -> usize {
    let mut pending = vec![root];
    let mut len = 0;
    while let Some(node) = pending.pop() {
        len += 1;
        pending.extend(node.children().map(|(_, child)| child));
    }
    len
}

/// Appends a single entry name to an absolute path
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Absolute path of the directory containing `path`; the root is its own parent
pub fn parent_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}
