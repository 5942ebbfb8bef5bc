mod cli;
mod config;
mod errors;
mod factory;
mod labels_and_annotations;
mod logging;
mod proxmox;
mod secrets;
mod tools;
mod utils;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::{Cli, Session};
use crate::config::{FileConfig, LogSettings};
use crate::errors::Error;
use crate::logging::setup_tracing;
use crate::utils::poll::cancellable;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let file = FileConfig::load_optional(cli.config.as_deref())?;
    let _provider = setup_tracing(&LogSettings::resolve(&cli.log, &file.log))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });

    let session = Session::new(file, &cli.cluster, &cancel);
    cancellable(&cancel, "command", cli.command.run(&session)).await
}
