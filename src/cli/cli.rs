use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::data::LogLevel;
use crate::document::DEFAULT_DOCUMENT_FILE_NAME;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Browse or mount a directory tree described by a document")]
pub struct Cli {
    /// The document describing the tree (JSON or YAML)
    #[clap(long, short, default_value = DEFAULT_DOCUMENT_FILE_NAME)]
    pub document: PathBuf,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Mount the tree read-only at the given directory
    #[cfg(feature = "fuse")]
    Mount {
        mountpoint: PathBuf,
        /// Let users other than the one mounting access the tree
        #[clap(long)]
        allow_other: bool,
    },
    /// Print every entry of the tree
    Tree,
    /// List a directory
    Ls {
        #[clap(default_value = "/")]
        path: String,
        /// Also show the type and identity of each entry
        #[clap(long, short)]
        long: bool,
    },
    /// Print the attributes of an entry
    Stat { path: String },
    /// Write the content of a file to stdout
    Cat {
        path: String,
        #[clap(long, default_value_t = 0)]
        offset: u64,
        /// Stop after this many bytes
        #[clap(long)]
        length: Option<u64>,
        /// Size of each read request
        #[clap(long, default_value = "4096")]
        chunk_size: NonZeroUsize,
    },
}
