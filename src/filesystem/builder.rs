use std::collections::{HashMap, HashSet};

use hashlink::LinkedHashMap;
use snafu::prelude::*;
use tracing::{debug, warn};

use super::tree::{EntryNode, EntryType, Identity, Tree};
use crate::document::{ChildReference, ChildTarget, Document, EntryDescription};

/// Builds an immutable [`Tree`] out of a parsed [`Document`].
///
/// Ownership is tracked with a claim set: every identity may be claimed by
/// exactly one parent, and the root claims itself. Identities on the current
/// build path are tracked separately so that a description reaching one of
/// its own ancestors is reported as a cycle rather than as shared ownership.
pub struct TreeBuilder<'doc> {
    document: &'doc Document,
    top_level: HashMap<Identity, &'doc EntryDescription>,
    explicit: HashSet<Identity>,
    claimed: HashSet<Identity>,
    in_progress: HashSet<Identity>,
    next_identity: Option<u64>,
}

impl<'doc> TreeBuilder<'doc> {
    pub fn build(document: &'doc Document) -> Result<Tree, TreeBuildError> {
        let mut builder = Self::index(document)?;
        let root = builder.build_root()?;
        builder.report_unreachable();

        let tree = Tree::new(root);
        debug!("Built tree with {} entries", tree.len());
        Ok(tree)
    }

    /// Indexes top-level descriptions and collects every explicit identity,
    /// inline ones included, so that assigned identities never collide.
    fn index(document: &'doc Document) -> Result<Self, TreeBuildError> {
        let mut builder = TreeBuilder {
            document,
            top_level: HashMap::new(),
            explicit: HashSet::new(),
            claimed: HashSet::new(),
            in_progress: HashSet::new(),
            next_identity: Some(0),
        };

        for (index, description) in document.entries.iter().enumerate() {
            let location = format!("entries[{index}]");
            if let Some(identity) = description.identity.map(Identity::from) {
                builder.register_explicit(identity, &location)?;
                builder.top_level.insert(identity, description);
            }
            builder.register_inline_identities(description, &location)?;
        }

        builder.next_identity = match builder.explicit.iter().max() {
            Some(max) => max.get().checked_add(1),
            None => Some(0),
        };
        Ok(builder)
    }

    fn register_explicit(&mut self, identity: Identity, location: &str) -> Result<(), TreeBuildError> {
        ensure!(
            self.explicit.insert(identity),
            DuplicateIdentitySnafu { identity, location }
        );
        Ok(())
    }

    /// Registers identities declared on inline children, in pre-order.
    fn register_inline_identities(
        &mut self,
        description: &EntryDescription,
        location: &str,
    ) -> Result<(), TreeBuildError> {
        let mut pending = Vec::new();
        push_inline_children(&mut pending, description, location);
        while let Some((inline, location)) = pending.pop() {
            if let Some(identity) = inline.identity.map(Identity::from) {
                self.register_explicit(identity, &location)?;
            }
            push_inline_children(&mut pending, inline, &location);
        }
        Ok(())
    }

    fn assign_identity(&mut self, path: &str) -> Result<Identity, TreeBuildError> {
        let identity = self
            .next_identity
            .context(IdentitiesExhaustedSnafu { path })?;
        self.next_identity = identity.checked_add(1);
        Ok(Identity::from(identity))
    }

    /// Builds the whole tree depth-first. Directories under construction
    /// live on an explicit stack, so nesting depth is bounded by memory
    /// rather than by the thread stack.
    fn build_root(&mut self) -> Result<EntryNode, TreeBuildError> {
        let document = self.document;
        let description = document.entries.first().context(EmptyDocumentSnafu)?;
        let identity = match description.identity {
            Some(identity) => Identity::from(identity),
            None => self.assign_identity("/")?,
        };

        ensure!(
            EntryType::from_tag(&description.type_tag) == Some(EntryType::Directory),
            RootNotDirectorySnafu {
                identity,
                type_tag: description.type_tag.as_str(),
            }
        );
        self.claimed.insert(identity);

        // Path of the entry being visited; each open directory remembers
        // where its parent's path ends
        let mut path = String::from("/");
        let mut current = self.open_directory(description, identity, String::new(), 0, &path)?;
        let mut ancestors = Vec::new();

        loop {
            let Some(reference) = current.references.next() else {
                self.in_progress.remove(&current.identity);
                path.truncate(current.parent_path_len);

                let Some(parent) = ancestors.pop() else {
                    return Ok(current.finish());
                };
                let finished = std::mem::replace(&mut current, parent);
                let name = finished.name.clone();
                current.children.insert(name, finished.finish());
                continue;
            };

            let parent = current.identity;
            validate_name(reference, parent, &path)?;
            ensure!(
                !current.children.contains_key(&reference.name),
                DuplicateNameSnafu {
                    parent,
                    path: path.as_str(),
                    name: reference.name.as_str(),
                }
            );

            let parent_path_len = path.len();
            push_segment(&mut path, &reference.name);
            let (child, identity) = self.claim(reference, parent, &path)?;

            match entry_type(child, identity, &path)? {
                EntryType::RegularFile => {
                    let node = file_node(child, identity, &path)?;
                    current.children.insert(reference.name.clone(), node);
                    path.truncate(parent_path_len);
                }
                EntryType::Directory => {
                    let opened = self.open_directory(
                        child,
                        identity,
                        reference.name.clone(),
                        parent_path_len,
                        &path,
                    )?;
                    ancestors.push(std::mem::replace(&mut current, opened));
                }
            }
        }
    }

    fn open_directory(
        &mut self,
        description: &'doc EntryDescription,
        identity: Identity,
        name: String,
        parent_path_len: usize,
        path: &str,
    ) -> Result<PendingDirectory<'doc>, TreeBuildError> {
        let has_content = description
            .content
            .as_ref()
            .is_some_and(|content| !content.is_empty());
        ensure!(!has_content, ContentOnDirectorySnafu { identity, path });

        self.in_progress.insert(identity);
        Ok(PendingDirectory {
            identity,
            name,
            parent_path_len,
            references: description.children.as_deref().unwrap_or_default().iter(),
            children: LinkedHashMap::new(),
        })
    }

    /// Resolves a child reference and claims its identity for `parent`.
    fn claim(
        &mut self,
        reference: &'doc ChildReference,
        parent: Identity,
        path: &str,
    ) -> Result<(&'doc EntryDescription, Identity), TreeBuildError> {
        let (description, identity) = match &reference.target {
            ChildTarget::Linked(identity) => {
                let identity = Identity::from(*identity);
                ensure!(
                    !self.in_progress.contains(&identity),
                    CycleSnafu { identity, path }
                );
                match self.top_level.get(&identity) {
                    Some(description) => (*description, identity),
                    None if self.explicit.contains(&identity) => {
                        // Declared inline elsewhere, hence already owned by that parent
                        return SharedOwnershipSnafu { identity, path }.fail();
                    }
                    None => {
                        return DanglingReferenceSnafu {
                            identity,
                            parent,
                            path,
                        }
                        .fail();
                    }
                }
            }
            ChildTarget::Inline(description) => {
                let identity = match description.identity {
                    Some(identity) => Identity::from(identity),
                    None => self.assign_identity(path)?,
                };
                (&**description, identity)
            }
        };

        ensure!(
            self.claimed.insert(identity),
            SharedOwnershipSnafu { identity, path }
        );
        Ok((description, identity))
    }

    fn report_unreachable(&self) {
        for (index, description) in self.document.entries.iter().enumerate().skip(1) {
            let reachable = description
                .identity
                .is_some_and(|identity| self.claimed.contains(&Identity::from(identity)));
            if !reachable {
                warn!(
                    "Entry entries[{}] (identity {:?}) is not reachable from the root and will not be served",
                    index, description.identity
                );
            }
        }
    }
}

/// A directory whose children are still being built
struct PendingDirectory<'doc> {
    identity: Identity,
    name: String,
    parent_path_len: usize,
    references: std::slice::Iter<'doc, ChildReference>,
    children: LinkedHashMap<String, EntryNode>,
}

impl PendingDirectory<'_> {
    fn finish(self) -> EntryNode {
        EntryNode::directory(self.identity, self.children)
    }
}

fn push_inline_children<'a>(
    pending: &mut Vec<(&'a EntryDescription, String)>,
    description: &'a EntryDescription,
    location: &str,
) {
    let children = description.children.as_deref().unwrap_or_default();
    // Reversed so that the first declared child is popped first
    for (index, child) in children.iter().enumerate().rev() {
        if let ChildTarget::Inline(inline) = &child.target {
            pending.push((&**inline, format!("{location}.entries[{index}]")));
        }
    }
}

fn push_segment(path: &mut String, name: &str) {
    if !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(name);
}

fn entry_type(
    description: &EntryDescription,
    identity: Identity,
    path: &str,
) -> Result<EntryType, TreeBuildError> {
    EntryType::from_tag(&description.type_tag).context(UnknownTypeSnafu {
        identity,
        path,
        type_tag: description.type_tag.as_str(),
    })
}

fn file_node(
    description: &EntryDescription,
    identity: Identity,
    path: &str,
) -> Result<EntryNode, TreeBuildError> {
    let has_children = description
        .children
        .as_ref()
        .is_some_and(|children| !children.is_empty());
    ensure!(!has_children, ChildrenOnFileSnafu { identity, path });

    let content = description.content.clone().unwrap_or_default();
    Ok(EntryNode::file(identity, content.into_bytes()))
}

fn validate_name(
    reference: &ChildReference,
    parent: Identity,
    path: &str,
) -> Result<(), TreeBuildError> {
    let reason = match reference.name.as_str() {
        "" => Some("names must not be empty"),
        "." | ".." => Some("'.' and '..' are reserved"),
        name if name.contains('/') => Some("names must not contain '/'"),
        _ => None,
    };
    match reason {
        Some(reason) => InvalidNameSnafu {
            parent,
            path,
            name: reference.name.as_str(),
            reason,
        }
        .fail(),
        None => Ok(()),
    }
}

/// Structural problems found while building a tree. Every variant except
/// [`TreeBuildError::EmptyDocument`] names the malformed entry.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum TreeBuildError {
    #[snafu(display("The document contains no entries"))]
    EmptyDocument,
    #[snafu(display("Malformed entry {}: duplicate identity at {}", identity, location))]
    DuplicateIdentity { identity: Identity, location: String },
    #[snafu(display(
        "Malformed entry {}: the root must be a directory, found type '{}'",
        identity,
        type_tag
    ))]
    RootNotDirectory { identity: Identity, type_tag: String },
    #[snafu(display("Malformed entry {} at '{}': unknown type '{}'", identity, path, type_tag))]
    UnknownType {
        identity: Identity,
        path: String,
        type_tag: String,
    },
    #[snafu(display(
        "Malformed entry {} at '{}': directory {} references an identity that is not described",
        identity,
        path,
        parent
    ))]
    DanglingReference {
        identity: Identity,
        parent: Identity,
        path: String,
    },
    #[snafu(display("Malformed entry {} at '{}': already owned by another directory", identity, path))]
    SharedOwnership { identity: Identity, path: String },
    #[snafu(display("Malformed entry {} at '{}': entry contains itself", identity, path))]
    Cycle { identity: Identity, path: String },
    #[snafu(display("Malformed entry {} at '{}': invalid child name '{}', {}", parent, path, name, reason))]
    InvalidName {
        parent: Identity,
        path: String,
        name: String,
        reason: &'static str,
    },
    #[snafu(display("Malformed entry {} at '{}': child '{}' is declared twice", parent, path, name))]
    DuplicateName {
        parent: Identity,
        path: String,
        name: String,
    },
    #[snafu(display("Malformed entry {} at '{}': directories cannot carry content", identity, path))]
    ContentOnDirectory { identity: Identity, path: String },
    #[snafu(display("Malformed entry {} at '{}': files cannot have children", identity, path))]
    ChildrenOnFile { identity: Identity, path: String },
    #[snafu(display("No identity left to assign to the entry at '{}'", path))]
    IdentitiesExhausted { path: String },
}

impl TreeBuildError {
    /// The identity of the offending entry, if one was known
    pub fn identity(&self) -> Option<Identity> {
        match self {
            TreeBuildError::EmptyDocument | TreeBuildError::IdentitiesExhausted { .. } => None,
            TreeBuildError::DuplicateIdentity { identity, .. }
            | TreeBuildError::RootNotDirectory { identity, .. }
            | TreeBuildError::UnknownType { identity, .. }
            | TreeBuildError::DanglingReference { identity, .. }
            | TreeBuildError::SharedOwnership { identity, .. }
            | TreeBuildError::Cycle { identity, .. }
            | TreeBuildError::ContentOnDirectory { identity, .. }
            | TreeBuildError::ChildrenOnFile { identity, .. } => Some(*identity),
            TreeBuildError::InvalidName { parent, .. }
            | TreeBuildError::DuplicateName { parent, .. } => Some(*parent),
        }
    }
}
