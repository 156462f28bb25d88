use std::io::{self, Write};
use std::num::NonZeroUsize;

use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info};

use crate::application::tree_printer::TreePrinter;
use crate::application::{Request, RuntimeConfig};
use crate::document::{Document, DocumentLoadError};
use crate::ext::BestEffortPathExt;
use crate::filesystem::{EntryType, FsError, TreeBuildError, TreeBuilder, TreeFilesystem};

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();

        let document = Document::from_path(&app_config.document)
            .await
            .context(DocumentSnafu)?;
        debug!(
            "Loaded document with {} top-level entries",
            document.entries.len()
        );

        let tree = TreeBuilder::build(&document)
            .inspect_err(|error| {
                if let Some(identity) = error.identity() {
                    debug!("Tree build failed at entry #{identity}");
                }
            })
            .context(TreeSnafu {
                file_path: app_config.document.best_effort_path_display(),
            })?;
        info!("Serving {} entries", tree.len());

        let filesystem = TreeFilesystem::new(tree);
        Self::serve(&filesystem, app_config.request, &mut io::stdout().lock())
    }

    fn serve(
        filesystem: &TreeFilesystem,
        request: Request,
        out: &mut impl Write,
    ) -> Result<(), ApplicationError> {
        match request {
            #[cfg(feature = "fuse")]
            Request::Mount {
                mountpoint,
                allow_other,
            } => {
                let options = crate::bridge::MountOptions {
                    allow_other,
                    ..Default::default()
                };
                crate::bridge::mount(filesystem.clone(), &mountpoint, options).context(
                    MountSnafu {
                        mountpoint: mountpoint.best_effort_path_display(),
                    },
                )
            }
            Request::PrintTree => TreePrinter::new(filesystem).print(out).context(OutputSnafu),
            Request::List { path, long } => Self::list(filesystem, &path, long, out),
            Request::Stat { path } => Self::stat(filesystem, &path, out),
            Request::Cat {
                path,
                offset,
                length,
                chunk_size,
            } => Self::cat(filesystem, &path, offset, length, chunk_size, out),
        }
    }

    fn list(
        filesystem: &TreeFilesystem,
        path: &str,
        long: bool,
        out: &mut impl Write,
    ) -> Result<(), ApplicationError> {
        for entry in filesystem.list_directory(path).context(RequestSnafu)? {
            if long {
                writeln!(
                    out,
                    "{} {:>6} {}",
                    Self::type_marker(entry.entry_type),
                    entry.identity.to_string(),
                    entry.name
                )
                .context(OutputSnafu)?;
            } else {
                writeln!(out, "{}", entry.name).context(OutputSnafu)?;
            }
        }
        Ok(())
    }

    fn type_marker(entry_type: EntryType) -> char {
        match entry_type {
            EntryType::Directory => 'd',
            EntryType::RegularFile => '-',
        }
    }

    fn stat(
        filesystem: &TreeFilesystem,
        path: &str,
        out: &mut impl Write,
    ) -> Result<(), ApplicationError> {
        let attributes = filesystem.get_attributes(path).context(RequestSnafu)?;

        writeln!(out, "identity: {}", attributes.identity).context(OutputSnafu)?;
        writeln!(out, "type: {}", attributes.entry_type).context(OutputSnafu)?;
        writeln!(out, "size: {}", attributes.size).context(OutputSnafu)?;
        writeln!(
            out,
            "mode: {}{:04o}",
            Self::type_marker(attributes.entry_type),
            attributes.permissions
        )
            .context(OutputSnafu)?;
        writeln!(out, "links: {}", attributes.link_count).context(OutputSnafu)?;
        Ok(())
    }

    /// Streams a file through repeated bounded reads, the way a kernel
    /// bridge would request it.
    fn cat(
        filesystem: &TreeFilesystem,
        path: &str,
        offset: u64,
        length: Option<u64>,
        chunk_size: NonZeroUsize,
        out: &mut impl Write,
    ) -> Result<(), ApplicationError> {
        filesystem.open(path).context(RequestSnafu)?;

        let mut offset = offset;
        let mut remaining = length.unwrap_or(u64::MAX);
        while remaining > 0 {
            let wanted = usize::try_from(remaining).map_or(chunk_size.get(), |remaining| {
                remaining.min(chunk_size.get())
            });
            let bytes = filesystem
                .read(path, offset, wanted)
                .context(RequestSnafu)?;
            if bytes.is_empty() {
                break;
            }

            out.write_all(bytes).context(OutputSnafu)?;
            offset += bytes.len() as u64;
            remaining -= bytes.len() as u64;
        }

        out.flush().context(OutputSnafu)
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while loading the tree document"))]
    DocumentError { source: DocumentLoadError },
    #[snafu(display("The document {} does not describe a valid tree", file_path))]
    TreeError {
        file_path: String,
        source: TreeBuildError,
    },
    #[snafu(display("Filesystem request failed"))]
    RequestError { source: FsError },
    #[snafu(display("Failed to write output"))]
    OutputError { source: io::Error },
    #[cfg(feature = "fuse")]
    #[snafu(display("Failed to mount the tree at {}", mountpoint))]
    MountError {
        mountpoint: String,
        source: crate::bridge::MountError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::fixtures::scenario_filesystem;
    use rstest::*;
    use std::path::Path;
    use tempfile::NamedTempFile;

    fn serve_to_string(request: Request) -> Result<String, ApplicationError> {
        let filesystem = scenario_filesystem();
        let mut out = Vec::new();
        Application::serve(&filesystem, request, &mut out)?;
        Ok(String::from_utf8(out).expect("output should be UTF-8"))
    }

    fn cat(path: &str, offset: u64, length: Option<u64>, chunk_size: usize) -> Request {
        Request::Cat {
            path: path.to_string(),
            offset,
            length,
            chunk_size: NonZeroUsize::new(chunk_size).expect("chunk size should be non-zero"),
        }
    }

    #[test]
    fn lists_directories() {
        let output = serve_to_string(Request::List {
            path: "/".to_string(),
            long: false,
        })
        .expect("listing should succeed");

        assert_eq!(output, ".\n..\ngreeting\nsub\n");
    }

    #[test]
    fn long_listing_shows_types_and_identities() {
        let output = serve_to_string(Request::List {
            path: "/sub".to_string(),
            long: true,
        })
        .expect("listing should succeed");

        assert_eq!(output, "d      3 .\nd      1 ..\n-      4 note\n");
    }

    #[test]
    fn prints_file_attributes() {
        let output = serve_to_string(Request::Stat {
            path: "/greeting".to_string(),
        })
        .expect("stat should succeed");

        assert_eq!(
            output,
            "identity: 2\ntype: regular-file\nsize: 3\nmode: -0777\nlinks: 1\n"
        );
    }

    #[test]
    fn prints_directory_attributes() {
        let output = serve_to_string(Request::Stat {
            path: "/sub".to_string(),
        })
        .expect("stat should succeed");

        assert_eq!(
            output,
            "identity: 3\ntype: directory\nsize: 0\nmode: d0755\nlinks: 2\n"
        );
    }

    #[rstest]
    #[case(cat("/greeting", 0, None, 1), "hi\n")]
    #[case(cat("/greeting", 0, None, 4096), "hi\n")]
    #[case(cat("/greeting", 1, None, 2), "i\n")]
    #[case(cat("/greeting", 0, Some(2), 1), "hi")]
    #[case(cat("/greeting", 0, Some(0), 1), "")]
    #[case(cat("/greeting", 5, None, 3), "")]
    #[case(cat("/sub/note", 0, None, 8), "x")]
    fn cat_streams_file_content(#[case] request: Request, #[case] expected: &str) {
        let output = serve_to_string(request).expect("cat should succeed");

        assert_eq!(output, expected);
    }

    #[rstest]
    #[case(cat("/sub", 0, None, 16))]
    #[case(cat("/missing", 0, None, 16))]
    #[case(Request::List { path: "/greeting".to_string(), long: false })]
    #[case(Request::Stat { path: "/nope".to_string() })]
    fn failed_requests_surface_as_request_errors(#[case] request: Request) {
        let result = serve_to_string(request);

        assert!(matches!(result, Err(ApplicationError::RequestError { .. })));
    }

    #[cfg(feature = "fuse")]
    #[test]
    fn mount_failures_name_the_mountpoint() {
        let result = serve_to_string(Request::Mount {
            mountpoint: Path::new("/definitely/missing/mountpoint").to_path_buf(),
            allow_other: false,
        });

        match result {
            Err(ApplicationError::MountError { mountpoint, .. }) => {
                assert_eq!(mountpoint, "/definitely/missing/mountpoint");
            }
            other => panic!("Expected MountError, got {other:?}"),
        }
    }

    #[compio::test]
    async fn run_fails_for_a_missing_document() {
        let config = RuntimeConfig {
            document: Path::new("no-such-document.json").to_path_buf(),
            request: Request::PrintTree,
        };

        let result = Application::run(config).await;

        assert!(matches!(result, Err(ApplicationError::DocumentError { .. })));
    }

    #[compio::test]
    async fn run_fails_for_a_malformed_tree() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(
            file,
            r#"[{{ "inode": 1, "type": "dir", "entries": [{{ "name": "a", "inode": 9 }}] }}]"#
        )
        .expect("Failed to write to temp file");
        let config = RuntimeConfig {
            document: file.path().to_path_buf(),
            request: Request::PrintTree,
        };

        let result = Application::run(config).await;

        match result {
            Err(ApplicationError::TreeError { source, .. }) => {
                assert!(matches!(source, TreeBuildError::DanglingReference { .. }));
            }
            other => panic!("Expected TreeError, got {other:?}"),
        }
    }

    #[compio::test]
    async fn run_serves_a_valid_document() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(
            file,
            "- {{ inode: 1, type: dir, entries: [ {{ name: a, type: file, data: x }} ] }}"
        )
        .expect("Failed to write to temp file");
        let config = RuntimeConfig {
            document: file.path().to_path_buf(),
            request: Request::Stat {
                path: "/a".to_string(),
            },
        };

        let result = Application::run(config).await;

        assert!(result.is_ok());
    }
}
