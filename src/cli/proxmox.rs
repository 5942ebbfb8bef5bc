use clap::{Args, Subcommand};
use tracing::info;

use super::Session;
use crate::config::{ProxmoxArgs, ProxmoxSettings};
use crate::errors::{Context, Error};
use crate::factory::{get_talos_image, SchematicCache, TalosFactoryClient};
use crate::proxmox::{ProxmoxClient, TemplateBuilder, VmDescriptor};

#[derive(Args, Debug)]
pub struct ProxmoxCli {
    #[command(flatten)]
    pub settings: ProxmoxArgs,

    #[command(subcommand)]
    pub command: ProxmoxCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProxmoxCommand {
    /// Upload Talos schematic YAML and cache returned ID
    RefreshSchematic,
    /// Print cached schematic ID
    ShowSchematic,
    /// Remove cached schematic ID
    ClearSchematic,
    /// Download Talos ISO for the given version and upload to Proxmox storage
    GetTalosImage {
        /// Talos release version (e.g. 1.11.2)
        #[arg(long)]
        version: String,
    },
    /// Create a Proxmox VM from template JSON and convert it into a template
    CreateTemplate,
}

pub async fn run(cli: ProxmoxCli, session: &Session) -> Result<(), Error> {
    let settings = ProxmoxSettings::resolve(&cli.settings, &session.file.proxmox)?;
    let factory = TalosFactoryClient::new(&settings.factory_url, settings.http_timeout)?;
    let cache = SchematicCache::new(factory, &settings.schematic_file, &settings.schematic_yaml);

    match cli.command {
        ProxmoxCommand::RefreshSchematic => {
            let id = cache.refresh().await.context("refresh schematic")?;
            println!("{id}");
        }
        ProxmoxCommand::ShowSchematic => {
            println!("{}", cache.show().await?);
        }
        ProxmoxCommand::ClearSchematic => {
            cache.clear().await?;
        }
        ProxmoxCommand::GetTalosImage { version } => {
            let hypervisor = ProxmoxClient::new(&settings)?;
            info!(node = %settings.node, storage = %settings.iso_storage, %version, "get-talos-image");
            get_talos_image(&cache, &hypervisor, &version)
                .await
                .context("get-talos-image")?;
        }
        ProxmoxCommand::CreateTemplate => {
            let descriptor = VmDescriptor::load(&settings.template_json).await?;
            let builder = TemplateBuilder::new(ProxmoxClient::new(&settings)?, &session.cancel);
            builder
                .create_template(&descriptor)
                .await
                .with_context(|| format!("create template from vm {}", descriptor.vmid))?;
        }
    }
    Ok(())
}
