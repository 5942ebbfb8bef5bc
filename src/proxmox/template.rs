use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::Hypervisor;
use crate::errors::{Context, Error};
use crate::utils::poll::{cancellable, settle, Poller};

pub const DELETION_TIMEOUT: Duration = Duration::from_secs(90);
pub const DELETION_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Proxmox keeps the VM locked for a moment after creation.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// A VM creation payload plus the two fields the workflow needs from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmDescriptor {
    pub vmid: u64,
    pub name: String,
    pub raw_payload: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVmId {
    Number(serde_json::Number),
    Text(String),
}

#[derive(Deserialize)]
struct DescriptorFields {
    vmid: Option<RawVmId>,
    name: Option<String>,
}

impl VmDescriptor {
    pub fn parse(raw_payload: Vec<u8>) -> Result<Self, Error> {
        let fields: DescriptorFields =
            serde_json::from_slice(&raw_payload).context("parse template json")?;

        let vmid = match fields.vmid {
            None => None,
            Some(RawVmId::Text(text)) if text.trim().is_empty() => None,
            Some(RawVmId::Text(text)) => Some(text.trim().parse::<u64>().ok()),
            Some(RawVmId::Number(number)) => Some(number.as_u64()),
        };
        let vmid = match vmid {
            None => return Err(Error::Validation(String::from("template json missing vmid"))),
            Some(None) => {
                return Err(Error::Validation(String::from(
                    "template json vmid is not a non-negative integer",
                )))
            }
            Some(Some(vmid)) => vmid,
        };

        let name = fields.name.unwrap_or_default();
        if name.is_empty() {
            return Err(Error::Validation(String::from("template json missing name")));
        }

        Ok(VmDescriptor {
            vmid,
            name,
            raw_payload,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("read template json {}", path.display()))?;
        Self::parse(raw)
    }
}

/// Drives a VM from whatever state it is in to a freshly created template.
pub struct TemplateBuilder<H> {
    hypervisor: H,
    cancel: CancellationToken,
}

impl<H: Hypervisor> TemplateBuilder<H> {
    pub fn new(hypervisor: H, cancel: &CancellationToken) -> Self {
        TemplateBuilder {
            hypervisor,
            cancel: cancel.clone(),
        }
    }

    /// Free the vmid, create the VM and convert it. Strictly sequential; only
    /// the deletion wait retries.
    #[instrument(skip(self, descriptor), fields(vmid = descriptor.vmid, name = %descriptor.name))]
    pub async fn create_template(&self, descriptor: &VmDescriptor) -> Result<(), Error> {
        let vmid = descriptor.vmid;

        let present = cancellable(&self.cancel, "vm existence check", self.hypervisor.vm_exists(vmid))
            .await
            .context("check vm exists")?;
        if present {
            warn!("Existing VM found; deleting before template creation");
            cancellable(&self.cancel, "vm delete", self.hypervisor.delete_vm(vmid))
                .await
                .with_context(|| format!("delete vm {vmid}"))?;
            self.wait_for_deletion(vmid)
                .await
                .context("wait for vm deletion")?;
        }

        info!("Creating Proxmox VM from template descriptor");
        cancellable(&self.cancel, "vm create", self.hypervisor.create_vm(&descriptor.raw_payload))
            .await
            .context("create vm")?;

        settle(&self.cancel, "vm settle", SETTLE_DELAY).await?;

        cancellable(&self.cancel, "vm convert", self.hypervisor.convert_to_template(vmid))
            .await
            .with_context(|| format!("convert vm {vmid} to template"))?;

        info!("Template created successfully");
        Ok(())
    }

    async fn wait_for_deletion(&self, vmid: u64) -> Result<(), Error> {
        let mut poller = Poller::new(
            format!("vm {vmid} deletion"),
            DELETION_POLL_INTERVAL,
            DELETION_TIMEOUT,
            &self.cancel,
        );
        loop {
            poller.wait().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Conflict(format!(
                        "vm {vmid} still present {}s after delete",
                        DELETION_TIMEOUT.as_secs()
                    ))
                } else {
                    e
                }
            })?;
            if !poller.guard(self.hypervisor.vm_exists(vmid)).await? {
                debug!(vmid, "VM gone");
                return Ok(());
            }
            debug!(vmid, "VM still present");
        }
    }
}
