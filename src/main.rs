//! ngc - node group convergence CLI tool.
//!
//! Upserts NodeGroups, waits for their nodes to become Ready, fetches
//! bootstrap cloud-config and removes nodes and groups. Every cluster
//! operation is retried within a fixed attempt budget.

mod config;
mod converge;
mod error;
mod k8s;
mod output;
mod progress;
mod readiness;
mod retry;

use std::future::Future;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use config::{Args, Command, Config, LogFormat};
use error::NgcError;
use k8s::cluster::KubeCluster;
use k8s::logs::PodLogSource;
use k8s::nodegroup::NodeGroup;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(args);

    if let Err(e) = init_tracing(&config.log_level, config.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!("Starting ngc - node group convergence");

    if let Err(e) = run(&config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(config: &Config) -> Result<()> {
    // Read the declaration before touching the cluster so bad input fails fast
    let declaration = match &config.command {
        Command::Upsert { file } => Some(read_declaration(file)?),
        _ => None,
    };

    if config.dry_run && config.command.is_mutating() {
        print_dry_run(&config.command, declaration.as_ref());
        return Ok(());
    }

    if config.command.is_destructive() && !config.yes && !confirm(&config.command)? {
        info!("Aborted, nothing was deleted");
        return Ok(());
    }

    let client = k8s::client::build_client(config.context.as_deref()).await?;
    let context_name = k8s::client::current_context(config.context.as_deref());
    debug!("Using cluster context {}", context_name);
    let cluster = KubeCluster::new(client.clone());

    match &config.command {
        Command::CloudConfig { node_group } => {
            let progress = PodLogSource::new(
                client,
                &config.progress_namespace,
                &config.progress_selector,
            );
            let cloud_config = interruptible(
                "Cloud config wait",
                converge::cloud_config::get_cloud_config(
                    &cluster,
                    &config.bootstrap_namespace,
                    node_group,
                    progress,
                ),
                tokio::signal::ctrl_c(),
            )
            .await?;
            println!("{}", cloud_config);
        }
        Command::Upsert { .. } => {
            if let Some(group) = &declaration {
                interruptible(
                    "NodeGroup upsert",
                    converge::nodegroup::upsert_node_group(&cluster, group),
                    tokio::signal::ctrl_c(),
                )
                .await?;
                println!("NodeGroup '{}' converged", group.name().bold());
            }
        }
        Command::WaitNode { node } => {
            let shutdown = shutdown_on_interrupt();
            converge::nodes::wait_for_node_ready(&cluster, node, &shutdown).await?;
            println!("Node '{}' is {}", node.bold(), "Ready".green());
        }
        Command::WaitGroup {
            node_group,
            desired,
        } => {
            let shutdown = shutdown_on_interrupt();
            let snapshot = converge::nodes::wait_for_group_ready(
                &cluster,
                &config.group_label,
                node_group,
                *desired,
                &shutdown,
            )
            .await?;
            output::table::print_readiness(&snapshot);
        }
        Command::WaitNodes { nodes } => {
            let shutdown = shutdown_on_interrupt();
            let snapshot =
                converge::nodes::wait_for_nodes_ready(&cluster, nodes, &shutdown).await?;
            output::table::print_readiness(&snapshot);
        }
        Command::Templates => {
            let templates = interruptible(
                "Template listing",
                converge::nodegroup::list_node_templates(&cluster),
                tokio::signal::ctrl_c(),
            )
            .await?;
            output::table::print_templates(&templates, &context_name);
        }
        Command::DeleteNode { node } => {
            interruptible(
                "Node deletion",
                converge::nodes::delete_node(&cluster, node),
                tokio::signal::ctrl_c(),
            )
            .await?;
            println!("Node '{}' deleted", node.bold());
        }
        Command::DeleteNodeGroup { node_group } => {
            interruptible(
                "NodeGroup deletion",
                converge::nodegroup::delete_node_group(&cluster, node_group),
                tokio::signal::ctrl_c(),
            )
            .await?;
            println!("NodeGroup '{}' deleted", node_group.bold());
        }
    }

    Ok(())
}

/// Token cancelled on the first Ctrl-C; a second Ctrl-C exits at once.
///
/// Only readiness waits install this: they watch the token between attempts.
fn shutdown_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Interrupt received, stopping after the current attempt (Ctrl-C again to abort)");
        on_signal.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    token
}

/// Run `operation` unless `interrupt` resolves first, in which case the
/// operation is dropped mid-flight.
///
/// If the interrupt cannot be listened for, the operation runs to completion.
async fn interruptible<T, F, I>(label: &str, operation: F, interrupt: I) -> Result<T, NgcError>
where
    F: Future<Output = Result<T, NgcError>>,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(operation);

    tokio::select! {
        result = &mut operation => result,
        signal = interrupt => match signal {
            Ok(()) => {
                info!("Interrupt received, abandoning {}", label);
                Err(NgcError::Cancelled(label.to_string()))
            }
            Err(e) => {
                debug!("Unable to listen for Ctrl-C: {}", e);
                operation.await
            }
        },
    }
}

/// Read a NodeGroup declaration from a file, or stdin for `-`.
fn read_declaration(path: &Path) -> Result<NodeGroup> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read declaration from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    Ok(NodeGroup::parse(&text)?)
}

fn print_dry_run(command: &Command, declaration: Option<&NodeGroup>) {
    let action = match (command, declaration) {
        (Command::Upsert { .. }, Some(group)) => {
            format!("create or update NodeGroup '{}'", group.name().bold())
        }
        (Command::DeleteNode { node }, _) => format!("delete Node '{}'", node.bold()),
        (Command::DeleteNodeGroup { node_group }, _) => {
            format!("delete NodeGroup '{}'", node_group.bold())
        }
        _ => return,
    };
    println!("{} Would {}", "[DRY RUN]".yellow(), action);
}

fn confirm(command: &Command) -> Result<bool> {
    let prompt = match command {
        Command::DeleteNode { node } => format!("Delete Node '{}'?", node),
        Command::DeleteNodeGroup { node_group } => {
            format!("Delete NodeGroup '{}'?", node_group)
        }
        _ => return Ok(true),
    };

    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

/// Initialize tracing subscriber.
fn init_tracing(log_level: &str, log_format: LogFormat) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    match log_format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => fmt()
            .compact()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .init(),
    }

    Ok(())
}
