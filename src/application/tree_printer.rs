use std::io::{self, Write};

use colored::Colorize;

use crate::filesystem::{EntryType, TreeFilesystem};

const INDENT: &str = "  ";

/// Prints every entry of a tree, one per line, indented by depth
pub struct TreePrinter<'a> {
    filesystem: &'a TreeFilesystem,
}

impl<'a> TreePrinter<'a> {
    pub fn new(filesystem: &'a TreeFilesystem) -> Self {
        Self { filesystem }
    }

    pub fn print(&self, out: &mut impl Write) -> io::Result<()> {
        for entry in self.filesystem.tree().walk() {
            let indent = INDENT.repeat(entry.depth);
            let identity = format!("#{}", entry.node.identity()).dimmed();

            match entry.node.entry_type() {
                EntryType::Directory => {
                    let name = if entry.depth == 0 {
                        "/".to_string()
                    } else {
                        format!("{}/", entry.name)
                    };
                    writeln!(out, "{indent}{} {identity}", name.blue().bold())?;
                }
                EntryType::RegularFile => {
                    let size = format!("({} bytes)", entry.node.content_len()).dimmed();
                    writeln!(out, "{indent}{} {identity} {size}", entry.name)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::fixtures::scenario_filesystem;

    #[test]
    fn prints_the_scenario_tree() {
        colored::control::set_override(false);
        let filesystem = scenario_filesystem();
        let mut out = Vec::new();

        TreePrinter::new(&filesystem)
            .print(&mut out)
            .expect("printing to memory should succeed");

        let printed = String::from_utf8(out).expect("output should be UTF-8");
        assert_eq!(
            printed,
            "/ #1\n  greeting #2 (3 bytes)\n  sub/ #3\n    note #4 (1 bytes)\n"
        );
    }
}
