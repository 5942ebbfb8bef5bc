pub mod client;
pub mod template;

pub use client::{Hypervisor, ProxmoxClient};
pub use template::{TemplateBuilder, VmDescriptor};

#[cfg(test)]
pub use client::MockHypervisor;
