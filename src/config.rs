//! Settings resolution: command line and environment first, then the
//! optional YAML config file, then built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, ValueEnum};
use serde::Deserialize;

use crate::errors::{Context, Error};
use crate::factory::DEFAULT_FACTORY_URL;
use crate::tools::kind::{DEFAULT_KIND_CONFIG, DEFAULT_KIND_NAME};

pub const DEFAULT_CLUSTER_NAME: &str = "coffee-cluster";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_OUT_DIR: &str = "./out";
pub const DEFAULT_CILIUM_VERSION: &str = "1.16.4";
pub const DEFAULT_SECRET_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const DEFAULT_ISO_STORAGE: &str = "local";
const DEFAULT_SCHEMATIC_FILE: &str = ".schematic_id";
const DEFAULT_SCHEMATIC_YAML: &str = "talos-factory-schematic.yaml";
const DEFAULT_TEMPLATE_JSON: &str = "template.json";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

pub fn parse_duration(value: &str) -> Result<Duration, Error> {
    humanize_rs::duration::parse(value.trim())
        .with_context(|| format!("parse duration {value:?}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}

// Config file

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    pub cluster: ClusterSection,
    pub proxmox: ProxmoxSection,
    pub secrets: SecretsSection,
    pub kind: KindSection,
    pub log: LogSection,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterSection {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub kubeconfig_path: Option<PathBuf>,
    pub talosconfig_path: Option<PathBuf>,
    pub cilium_version: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxmoxSection {
    pub url: Option<String>,
    #[serde(rename = "tokenID")]
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub node: Option<String>,
    pub iso_storage: Option<String>,
    pub schematic_file: Option<PathBuf>,
    #[serde(rename = "schematicYAML")]
    pub schematic_yaml: Option<PathBuf>,
    #[serde(rename = "templateJSON")]
    pub template_json: Option<PathBuf>,
    #[serde(rename = "skipTLSVerify")]
    pub skip_tls_verify: Option<bool>,
    pub http_timeout: Option<String>,
    pub factory_url: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct SecretsSection {
    pub timeout: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct KindSection {
    pub name: Option<String>,
    pub config: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct LogSection {
    pub format: Option<LogFormat>,
    pub debug: Option<bool>,
}

impl FileConfig {
    /// Load a YAML (or JSON) config file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parse config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self, Error> {
        if contents.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self, Error> {
        path.map(Self::load).transpose().map(Option::unwrap_or_default)
    }
}

// Command line

/// Workload cluster flags shared by every command.
#[derive(Args, Debug, Default, Clone)]
pub struct ClusterArgs {
    /// Workload cluster name
    #[arg(long = "cluster-name", env = "CLUSTER", global = true)]
    pub name: Option<String>,
    /// Namespace holding the Cluster API objects
    #[arg(long, env = "NS", global = true)]
    pub namespace: Option<String>,
    /// Directory for generated kubeconfig/talosconfig files
    #[arg(long, env = "OUT_DIR", global = true)]
    pub out_dir: Option<PathBuf>,
    /// Workload cluster kubeconfig path
    #[arg(long, env = "KUBECONFIG_PATH", global = true)]
    pub kubeconfig_path: Option<PathBuf>,
    /// Workload cluster talosconfig path
    #[arg(long, env = "TALOSCONFIG_PATH", global = true)]
    pub talosconfig_path: Option<PathBuf>,
    /// Cilium chart version
    #[arg(long, env = "CILIUM_VER", global = true)]
    pub cilium_version: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ProxmoxArgs {
    /// Proxmox host or IP, without scheme
    #[arg(long, env = "PROXMOX_URL", global = true)]
    pub url: Option<String>,
    /// API token id (user@realm!token)
    #[arg(long, env = "PROXMOX_TOKEN", global = true)]
    pub token_id: Option<String>,
    #[arg(long, env = "PROXMOX_SECRET", hide_env_values = true, global = true)]
    pub token_secret: Option<String>,
    #[arg(long, env = "PVE_NODE", global = true)]
    pub node: Option<String>,
    /// Storage target for ISO uploads [default: local]
    #[arg(long, env = "PROXMOX_ISO_STORAGE", global = true)]
    pub iso_storage: Option<String>,
    /// Cached schematic id file [default: .schematic_id]
    #[arg(long, env = "SCHEMATIC_FILE", global = true)]
    pub schematic_file: Option<PathBuf>,
    /// Talos factory schematic definition
    #[arg(long, env = "TALOS_SCHEMATIC_YAML", global = true)]
    pub schematic_yaml: Option<PathBuf>,
    /// VM creation payload
    #[arg(long, env = "TEMPLATE_JSON", global = true)]
    pub template_json: Option<PathBuf>,
    #[arg(long, env = "PROXMOX_SKIP_TLS_VERIFY", action = ArgAction::Set, global = true)]
    pub skip_tls_verify: Option<bool>,
    /// Timeout for Proxmox and factory requests, e.g. 60s
    #[arg(long, global = true)]
    pub http_timeout: Option<String>,
    #[arg(long, global = true)]
    pub factory_url: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct LogArgs {
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,
    /// Debug logging unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub debug: bool,
}

// Resolved settings

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterSettings {
    pub name: String,
    pub namespace: String,
    pub out_dir: PathBuf,
    pub kubeconfig_path: PathBuf,
    pub talosconfig_path: PathBuf,
    pub cilium_version: String,
}

impl ClusterSettings {
    pub fn resolve(args: &ClusterArgs, file: &ClusterSection) -> Self {
        let name = non_empty(args.name.clone())
            .or_else(|| non_empty(file.name.clone()))
            .unwrap_or_else(|| String::from(DEFAULT_CLUSTER_NAME));
        let out_dir = non_empty_path(args.out_dir.clone())
            .or_else(|| non_empty_path(file.out_dir.clone()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
        let kubeconfig_path = non_empty_path(args.kubeconfig_path.clone())
            .or_else(|| non_empty_path(file.kubeconfig_path.clone()))
            .unwrap_or_else(|| out_dir.join(format!("kubeconfig-{name}")));
        let talosconfig_path = non_empty_path(args.talosconfig_path.clone())
            .or_else(|| non_empty_path(file.talosconfig_path.clone()))
            .unwrap_or_else(|| out_dir.join(format!("talosconfig-{name}")));

        ClusterSettings {
            namespace: non_empty(args.namespace.clone())
                .or_else(|| non_empty(file.namespace.clone()))
                .unwrap_or_else(|| String::from(DEFAULT_NAMESPACE)),
            cilium_version: non_empty(args.cilium_version.clone())
                .or_else(|| non_empty(file.cilium_version.clone()))
                .unwrap_or_else(|| String::from(DEFAULT_CILIUM_VERSION)),
            name,
            out_dir,
            kubeconfig_path,
            talosconfig_path,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxmoxSettings {
    pub url: String,
    pub token_id: String,
    pub token_secret: String,
    pub node: String,
    pub iso_storage: String,
    pub schematic_file: PathBuf,
    pub schematic_yaml: PathBuf,
    pub template_json: PathBuf,
    pub skip_tls_verify: bool,
    pub http_timeout: Duration,
    pub factory_url: String,
}

impl Default for ProxmoxSettings {
    fn default() -> Self {
        ProxmoxSettings {
            url: String::new(),
            token_id: String::new(),
            token_secret: String::new(),
            node: String::new(),
            iso_storage: String::from(DEFAULT_ISO_STORAGE),
            schematic_file: PathBuf::from(DEFAULT_SCHEMATIC_FILE),
            schematic_yaml: PathBuf::from(DEFAULT_SCHEMATIC_YAML),
            template_json: PathBuf::from(DEFAULT_TEMPLATE_JSON),
            skip_tls_verify: true,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            factory_url: String::from(DEFAULT_FACTORY_URL),
        }
    }
}

impl ProxmoxSettings {
    pub fn resolve(args: &ProxmoxArgs, file: &ProxmoxSection) -> Result<Self, Error> {
        let defaults = ProxmoxSettings::default();
        let required = |flag: &Option<String>, from_file: &Option<String>, what: &str| {
            non_empty(flag.clone())
                .or_else(|| non_empty(from_file.clone()))
                .ok_or_else(|| Error::Validation(format!("proxmox {what} is required")))
        };
        let http_timeout = match non_empty(args.http_timeout.clone())
            .or_else(|| non_empty(file.http_timeout.clone()))
        {
            Some(value) => parse_duration(&value).context("proxmox http timeout")?,
            None => defaults.http_timeout,
        };

        Ok(ProxmoxSettings {
            url: required(&args.url, &file.url, "URL")?,
            token_id: required(&args.token_id, &file.token_id, "token ID")?,
            token_secret: required(&args.token_secret, &file.token_secret, "token secret")?,
            node: required(&args.node, &file.node, "node")?,
            iso_storage: non_empty(args.iso_storage.clone())
                .or_else(|| non_empty(file.iso_storage.clone()))
                .unwrap_or(defaults.iso_storage),
            schematic_file: non_empty_path(args.schematic_file.clone())
                .or_else(|| non_empty_path(file.schematic_file.clone()))
                .unwrap_or(defaults.schematic_file),
            schematic_yaml: non_empty_path(args.schematic_yaml.clone())
                .or_else(|| non_empty_path(file.schematic_yaml.clone()))
                .unwrap_or(defaults.schematic_yaml),
            template_json: non_empty_path(args.template_json.clone())
                .or_else(|| non_empty_path(file.template_json.clone()))
                .unwrap_or(defaults.template_json),
            skip_tls_verify: args
                .skip_tls_verify
                .or(file.skip_tls_verify)
                .unwrap_or(defaults.skip_tls_verify),
            http_timeout,
            factory_url: non_empty(args.factory_url.clone())
                .or_else(|| non_empty(file.factory_url.clone()))
                .unwrap_or(defaults.factory_url),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindSettings {
    pub name: String,
    pub config: PathBuf,
}

impl KindSettings {
    pub fn resolve(name: Option<String>, config: Option<PathBuf>, file: &KindSection) -> Self {
        KindSettings {
            name: non_empty(name)
                .or_else(|| non_empty(file.name.clone()))
                .unwrap_or_else(|| String::from(DEFAULT_KIND_NAME)),
            config: non_empty_path(config)
                .or_else(|| non_empty_path(file.config.clone()))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KIND_CONFIG)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub debug: bool,
}

impl LogSettings {
    pub fn resolve(args: &LogArgs, file: &LogSection) -> Self {
        LogSettings {
            format: args.log_format.or(file.format).unwrap_or_default(),
            debug: args.debug || file.debug.unwrap_or(false),
        }
    }
}

/// How long `get-kubeconfig`/`get-talosconfig` wait for their secret.
pub fn secret_timeout(flag: Option<&str>, file: &SecretsSection) -> Result<Duration, Error> {
    match non_empty(flag.map(String::from)).or_else(|| non_empty(file.timeout.clone())) {
        Some(value) => parse_duration(&value).context("secret wait timeout"),
        None => Ok(DEFAULT_SECRET_TIMEOUT),
    }
}
