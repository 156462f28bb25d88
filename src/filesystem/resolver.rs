use snafu::Snafu;
use tracing::trace;

use super::tree::{EntryNode, Tree};

impl Tree {
    /// Resolves an absolute, slash-separated path to the entry it names.
    ///
    /// The empty path and `/` name the root. A single trailing slash is
    /// accepted but then requires the entry to be a directory. There is no
    /// `.`/`..` handling; the kernel hands over fully resolved paths.
    pub fn resolve(&self, path: &str) -> Result<&EntryNode, ResolveError> {
        let relative = path.strip_prefix('/').unwrap_or(path);
        let (relative, expects_directory) = match relative.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (relative, false),
        };

        let mut current = self.root();
        if relative.is_empty() {
            // "//" would otherwise pass as the root followed by a trailing slash
            if expects_directory {
                return Err(ResolveError::InvalidPath {
                    path: path.to_string(),
                    reason: "empty path segment",
                });
            }
            return Ok(current);
        }

        let mut walked = String::with_capacity(relative.len() + 1);
        for segment in relative.split('/') {
            if segment.is_empty() {
                return Err(ResolveError::InvalidPath {
                    path: path.to_string(),
                    reason: "empty path segment",
                });
            }
            if !current.is_directory() {
                return Err(ResolveError::NotADirectory {
                    path: path.to_string(),
                    component: walked,
                });
            }

            walked.push('/');
            walked.push_str(segment);
            trace!("Resolving segment '{}' of '{}'", segment, path);

            current = current
                .child(segment)
                .ok_or_else(|| ResolveError::NotFound {
                    path: path.to_string(),
                })?;
        }

        if expects_directory && !current.is_directory() {
            return Err(ResolveError::NotADirectory {
                path: path.to_string(),
                component: walked,
            });
        }

        Ok(current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ResolveError {
    #[snafu(display("No entry at '{}'", path))]
    NotFound { path: String },
    #[snafu(display("Cannot resolve '{}': '{}' is not a directory", path, component))]
    NotADirectory { path: String, component: String },
    #[snafu(display("Invalid path '{}': {}", path, reason))]
    InvalidPath { path: String, reason: &'static str },
}
