use crate::document::{ChildReference, Document, EntryDescription};

use super::tree::Tree;
use super::{TreeBuilder, TreeFilesystem};

/// Root holding file `greeting` ("hi\n") and directory `sub` holding file
/// `note` ("x").
pub fn scenario_document() -> Document {
    Document {
        entries: vec![
            EntryDescription::directory(
                1,
                vec![
                    ChildReference::linked("greeting", 2),
                    ChildReference::linked("sub", 3),
                ],
            ),
            EntryDescription::file(2, "hi\n"),
            EntryDescription::directory(3, vec![ChildReference::linked("note", 4)]),
            EntryDescription::file(4, "x"),
        ],
    }
}

pub fn scenario_tree() -> Tree {
    TreeBuilder::build(&scenario_document()).expect("scenario document should build")
}

pub fn scenario_filesystem() -> TreeFilesystem {
    TreeFilesystem::new(scenario_tree())
}
