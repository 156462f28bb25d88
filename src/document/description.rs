/// An already-parsed tree document: the ordered, flat list of top-level
/// entry descriptions. The first description is the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub entries: Vec<EntryDescription>,
}

/// Description of a single entry as written in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescription {
    /// Explicit identity. Only inline children may leave it out.
    pub identity: Option<u64>,
    pub type_tag: String,
    pub content: Option<String>,
    pub children: Option<Vec<ChildReference>>,
}

/// A named child of a directory description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildReference {
    pub name: String,
    pub target: ChildTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildTarget {
    /// Points at a top-level description by identity
    Linked(u64),
    /// Nested description owned by this reference
    Inline(Box<EntryDescription>),
}

#[cfg(test)]
impl EntryDescription {
    pub fn file(identity: u64, content: &str) -> Self {
        Self {
            identity: Some(identity),
            type_tag: "file".to_string(),
            content: Some(content.to_string()),
            children: None,
        }
    }

    pub fn directory(identity: u64, children: Vec<ChildReference>) -> Self {
        Self {
            identity: Some(identity),
            type_tag: "dir".to_string(),
            content: None,
            children: Some(children),
        }
    }

    pub fn with_type(mut self, type_tag: &str) -> Self {
        self.type_tag = type_tag.to_string();
        self
    }

    pub fn without_identity(mut self) -> Self {
        self.identity = None;
        self
    }
}

#[cfg(test)]
impl ChildReference {
    pub fn linked(name: &str, identity: u64) -> Self {
        Self {
            name: name.to_string(),
            target: ChildTarget::Linked(identity),
        }
    }

    pub fn inline(name: &str, description: EntryDescription) -> Self {
        Self {
            name: name.to_string(),
            target: ChildTarget::Inline(Box::new(description)),
        }
    }
}
