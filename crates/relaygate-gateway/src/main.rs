use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use relaygate_core::config::RelaygateConfig;
use relaygate_core::ids::{PrincipalKind, PrincipalStatus, RoleName};
use relaygate_ledger::Store;
use tracing::info;

mod authn;
mod binding;
mod cli;
mod http;
mod state;
mod ws;

use cli::{AdminAction, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaygate_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = RelaygateConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        RelaygateConfig::default()
    });

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Admin { action } => run_admin(config, action),
    }
}

async fn serve(config: RelaygateConfig) -> anyhow::Result<()> {
    let bind = config.listen.addr.clone();
    let state = Arc::new(state::AppState::new(config)?);
    let router = state::build_router(state);

    let addr: SocketAddr = bind.parse()?;
    info!("relaygate gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn run_admin(config: RelaygateConfig, action: AdminAction) -> anyhow::Result<()> {
    let store = Store::open(&config.database.path)?;

    match action {
        AdminAction::CreatePrincipal { kind, display_name, fingerprint } => {
            let kind: PrincipalKind = kind.parse().map_err(anyhow::Error::msg)?;
            let principal = store.create_principal(kind, fingerprint.as_deref(), &display_name, PrincipalStatus::Approved)?;
            println!("created principal {} ({})", principal.id, principal.display_name);
        }
        AdminAction::GrantRole { subject_kind, subject_id, role } => {
            let subject_kind: PrincipalKind = subject_kind.parse().map_err(anyhow::Error::msg)?;
            let role: RoleName = role.parse().map_err(anyhow::Error::msg)?;
            store.add_role(subject_kind, &subject_id, role)?;
            println!("granted {role} to {subject_id}");
        }
        AdminAction::ListPrincipals => {
            for principal in store.list_principals()? {
                println!("{}\t{}\t{}\t{}", principal.id, principal.kind, principal.status, principal.display_name);
            }
        }
    }
    Ok(())
}
