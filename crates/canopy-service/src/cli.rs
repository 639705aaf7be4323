use std::path::PathBuf;

use clap::{Parser, Subcommand};

use canopy_core::model::{AccessType, NodeId};

#[derive(Debug, Parser)]
#[command(name = "canopy", version)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the benefactor of a node.
    Resolve {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long, value_parser = parse_node)]
        node: NodeId,
    },
    /// Decide whether a user may perform one access type on a node.
    Check {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_node)]
        node: NodeId,
        #[arg(long)]
        access: AccessType,
    },
    /// Print everything a user may do with a node.
    Permissions {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_node)]
        node: NodeId,
    },
    /// Move a node under a new parent and print the resulting benefactors.
    Move {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long, value_parser = parse_node)]
        node: NodeId,
        #[arg(long, value_parser = parse_node)]
        parent: NodeId,
    },
}

fn parse_node(s: &str) -> Result<NodeId, String> {
    s.parse::<u64>()
        .map(NodeId::new)
        .map_err(|e| format!("invalid node id '{s}': {e}"))
}
