#![allow(clippy::enum_variant_names)]

use clap::Parser as _;
use tracing::debug;

use crate::{
    application::{Application, ApplicationError, data::LogLevel},
    cli::Cli,
};

mod application;
#[cfg(feature = "fuse")]
mod bridge;
mod cli;
mod document;
mod ext;
mod filesystem;

#[compio::main]
#[snafu::report]
async fn main() -> Result<(), ApplicationError> {
    let cli_args = Cli::parse();
    setup_tracing(&cli_args);
    setup_colors();
    debug!("Parsed CLI arguments: {cli_args:?}");

    Application::run(cli_args).await?;

    Ok(())
}

fn setup_tracing(cli_args: &Cli) {
    if cli_args.log_level != LogLevel::Silent {
        tracing_subscriber::fmt()
            .with_max_level(cli_args.log_level)
            .without_time()
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn setup_colors() {
    if supports_color::on(supports_color::Stream::Stdout).is_none() {
        colored::control::set_override(false);
    }
}
