use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relaygate-gateway", about = "Multi-agent coordination control plane")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the YAML config file; falls back to COVEN_CONFIG then defaults.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway server (default if no subcommand is given).
    Serve,

    /// Bootstrap and manage principals/roles directly against the ledger,
    /// for operators without a running admin session yet.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
pub enum AdminAction {
    /// Register a principal and print its id.
    CreatePrincipal {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Grant a role to an existing subject — typically used to bootstrap
    /// the first `owner`.
    GrantRole {
        #[arg(long)]
        subject_kind: String,
        #[arg(long)]
        subject_id: String,
        #[arg(long)]
        role: String,
    },
    /// List known principals.
    ListPrincipals,
}
