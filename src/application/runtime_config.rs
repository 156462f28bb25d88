use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::cli::{Cli, Command};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub document: PathBuf,
    pub request: Request,
}

/// What the application should do with the built tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    #[cfg(feature = "fuse")]
    Mount {
        mountpoint: PathBuf,
        allow_other: bool,
    },
    PrintTree,
    List {
        path: String,
        long: bool,
    },
    Stat {
        path: String,
    },
    Cat {
        path: String,
        offset: u64,
        length: Option<u64>,
        chunk_size: NonZeroUsize,
    },
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        let request = match cli.command {
            #[cfg(feature = "fuse")]
            Command::Mount {
                mountpoint,
                allow_other,
            } => Request::Mount {
                mountpoint,
                allow_other,
            },
            Command::Tree => Request::PrintTree,
            Command::Ls { path, long } => Request::List { path, long },
            Command::Stat { path } => Request::Stat { path },
            Command::Cat {
                path,
                offset,
                length,
                chunk_size,
            } => Request::Cat {
                path,
                offset,
                length,
                chunk_size,
            },
        };

        Self {
            document: cli.document,
            request,
        }
    }
}
