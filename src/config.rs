//! CLI configuration and argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

pub const DEFAULT_BOOTSTRAP_NAMESPACE: &str = "d8-cloud-instance-manager";
pub const DEFAULT_GROUP_LABEL: &str = "node.deckhouse.io/group";
pub const DEFAULT_PROGRESS_NAMESPACE: &str = "d8-system";
pub const DEFAULT_PROGRESS_SELECTOR: &str = "app=deckhouse";

/// Node group convergence CLI tool.
///
/// Upserts NodeGroups, waits for their nodes to become Ready, fetches
/// bootstrap cloud-config and removes nodes and groups, retrying every
/// step within a fixed attempt budget.
#[derive(Parser, Debug, Clone)]
#[command(name = "ngc")]
#[command(about = "Node group convergence CLI tool")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// Kubernetes context to use
    #[arg(long, global = true, env = "KUBECONFIG_CONTEXT")]
    pub context: Option<String>,

    /// Show planned changes without executing
    #[arg(long, global = true, default_value = "false")]
    pub dry_run: bool,

    /// Skip confirmation prompts
    #[arg(short, long, global = true, default_value = "false")]
    pub yes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "NGC_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Namespace holding the manual-bootstrap-for-<NODEGROUP> secrets
    #[arg(long, global = true, default_value = DEFAULT_BOOTSTRAP_NAMESPACE)]
    pub bootstrap_namespace: String,

    /// Node label carrying the NodeGroup name
    #[arg(long, global = true, default_value = DEFAULT_GROUP_LABEL)]
    pub group_label: String,

    /// Namespace of the controller whose logs are shown while waiting
    #[arg(long, global = true, default_value = DEFAULT_PROGRESS_NAMESPACE)]
    pub progress_namespace: String,

    /// Label selector of the controller pod
    #[arg(long, global = true, default_value = DEFAULT_PROGRESS_SELECTOR)]
    pub progress_selector: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Wait for the bootstrap secret of a NodeGroup and print its cloud-config (base64)
    CloudConfig {
        #[arg(value_name = "NODEGROUP")]
        node_group: String,
    },

    /// Create a NodeGroup, or merge-patch it if it already exists
    #[command(after_help = r#"Examples:
  ngc upsert -f worker.yaml     Apply a YAML declaration
  ngc upsert -f - < ng.json     Read the declaration from stdin"#)]
    Upsert {
        /// NodeGroup declaration (YAML or JSON, '-' for stdin)
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },

    /// Wait until a node is Ready
    WaitNode {
        #[arg(value_name = "NODE")]
        node: String,
    },

    /// Wait until at least N nodes of a NodeGroup are Ready
    WaitGroup {
        #[arg(value_name = "NODEGROUP")]
        node_group: String,

        /// Number of Ready nodes required
        #[arg(long)]
        desired: usize,
    },

    /// Wait until every listed node is Ready
    WaitNodes {
        #[arg(value_name = "NODE", required = true)]
        nodes: Vec<String>,
    },

    /// List node templates of all NodeGroups
    Templates,

    /// Delete a node (absent nodes count as deleted)
    DeleteNode {
        #[arg(value_name = "NODE")]
        node: String,
    },

    /// Delete a NodeGroup (absent NodeGroups count as deleted)
    #[command(name = "delete-nodegroup")]
    DeleteNodeGroup {
        #[arg(value_name = "NODEGROUP")]
        node_group: String,
    },
}

impl Command {
    /// Whether the command removes cluster objects and needs confirmation.
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::DeleteNode { .. } | Self::DeleteNodeGroup { .. })
    }

    /// Whether the command changes cluster state.
    pub const fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Upsert { .. } | Self::DeleteNode { .. } | Self::DeleteNodeGroup { .. }
        )
    }
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub context: Option<String>,
    pub dry_run: bool,
    pub yes: bool,
    pub log_level: String,
    pub log_format: LogFormat,
    pub bootstrap_namespace: String,
    pub group_label: String,
    pub progress_namespace: String,
    pub progress_selector: String,
    pub command: Command,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        Self {
            context: args.context.filter(|c| !c.is_empty()),
            dry_run: args.dry_run,
            yes: args.yes,
            log_level: args.log_level,
            log_format: args.log_format,
            bootstrap_namespace: args.bootstrap_namespace,
            group_label: args.group_label,
            progress_namespace: args.progress_namespace,
            progress_selector: args.progress_selector,
            command: args.command,
        }
    }
}
