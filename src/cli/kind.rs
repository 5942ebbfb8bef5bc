use std::path::PathBuf;

use clap::{Args, Subcommand};

use super::Session;
use crate::config::KindSettings;
use crate::errors::{Context, Error};
use crate::tools::kind;

#[derive(Subcommand, Debug)]
pub enum KindCommand {
    /// Create the kind cluster
    Up(KindArgs),
    /// Delete the kind cluster
    Down(KindArgs),
    /// Delete (if present) and recreate the kind cluster
    Reset(KindArgs),
}

#[derive(Args, Debug)]
pub struct KindArgs {
    /// Kind cluster name [default: dev]
    #[arg(long)]
    pub name: Option<String>,
    /// Path to kind config [default: configs/kind.yaml]
    #[arg(long = "kind-config")]
    pub config: Option<PathBuf>,
}

pub async fn run(command: KindCommand, session: &Session) -> Result<(), Error> {
    let resolve = |args: KindArgs| KindSettings::resolve(args.name, args.config, &session.file.kind);
    match command {
        KindCommand::Up(args) => {
            let settings = resolve(args);
            kind::create(&session.runner, &settings.name, Some(&settings.config))
                .await
                .context("kind up")
        }
        KindCommand::Down(args) => {
            let settings = resolve(args);
            kind::delete(&session.runner, &settings.name)
                .await
                .context("kind down")
        }
        KindCommand::Reset(args) => {
            let settings = resolve(args);
            kind::reset(&session.runner, &settings.name, Some(&settings.config))
                .await
                .context("kind reset")
        }
    }
}
