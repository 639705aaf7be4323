use std::path::Path;
use std::sync::Arc;

use canopy_core::engine::CheckRequest;
use canopy_core::model::{AccessType, NodeId, TenantId};
use canopy_service::cli::{Cli, Command};
use canopy_service::config::{AppConfig, LogFormat};
use canopy_service::fixture::Fixture;
use canopy_service::service::AccessService;
use canopy_storage::InMemoryStoreFactory;
use clap::Parser;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).init();
        }
    }
}

struct Session {
    service: AccessService<InMemoryStoreFactory>,
    tenant_id: TenantId,
    fixture: Fixture,
}

impl Session {
    async fn open(
        config: &AppConfig,
        fixture_path: &Path,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let fixture = Fixture::load(fixture_path)?;
        let service = AccessService::new(
            Arc::new(InMemoryStoreFactory::new()),
            config.to_engine_config(),
            config.certification.clone(),
        );
        let tenant_id = TenantId::new(uuid::Uuid::nil());
        fixture.apply(&service, &tenant_id).await?;

        Ok(Self {
            service,
            tenant_id,
            fixture,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Command::Resolve { fixture, node } => run_resolve(&config, &fixture, node).await,
        Command::Check {
            fixture,
            user,
            node,
            access,
        } => run_check(&config, &fixture, &user, node, access).await,
        Command::Permissions {
            fixture,
            user,
            node,
        } => run_permissions(&config, &fixture, &user, node).await,
        Command::Move {
            fixture,
            node,
            parent,
        } => run_move(&config, &fixture, node, parent).await,
    }
}

async fn run_resolve(
    config: &AppConfig,
    fixture: &Path,
    node: NodeId,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config, fixture).await?;
    let benefactor = session
        .service
        .resolve_benefactor(&session.tenant_id, node)
        .await?;

    println!("{node} -> {benefactor}");
    Ok(())
}

async fn run_check(
    config: &AppConfig,
    fixture: &Path,
    user: &str,
    node: NodeId,
    access: AccessType,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config, fixture).await?;
    let user = session.fixture.user(user)?;
    let request = CheckRequest::new(node, session.fixture.resource_type(node)?, access);

    let status = session
        .service
        .check_access(&session.tenant_id, &user, &request)
        .await?;

    if status.is_authorized() {
        println!("ALLOWED");
    } else {
        match status.denial_reason() {
            Some(reason) => println!("DENIED ({reason}): {}", status.message()),
            None => println!("DENIED: {}", status.message()),
        }
    }
    Ok(())
}

async fn run_permissions(
    config: &AppConfig,
    fixture: &Path,
    user: &str,
    node: NodeId,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config, fixture).await?;
    let user = session.fixture.user(user)?;
    let resource_type = session.fixture.resource_type(node)?;

    let perms = session
        .service
        .user_permissions(&session.tenant_id, &user, node, resource_type)
        .await?;

    println!("can_view               {}", perms.can_view);
    println!("can_download           {}", perms.can_download);
    println!("can_edit               {}", perms.can_edit);
    println!("can_add_child          {}", perms.can_add_child);
    println!("can_delete             {}", perms.can_delete);
    println!("can_change_permissions {}", perms.can_change_permissions);
    println!("can_change_settings    {}", perms.can_change_settings);
    println!("can_moderate           {}", perms.can_moderate);
    println!("can_move               {}", perms.can_move);
    println!("is_certified           {}", perms.is_certified);
    println!("can_public_read        {}", perms.can_public_read);
    Ok(())
}

async fn run_move(
    config: &AppConfig,
    fixture: &Path,
    node: NodeId,
    parent: NodeId,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config, fixture).await?;
    session
        .service
        .move_node(&session.tenant_id, node, parent)
        .await?;

    for spec in &session.fixture.nodes {
        let benefactor = session
            .service
            .resolve_benefactor(&session.tenant_id, spec.id)
            .await?;
        println!("{} -> {benefactor}", spec.id);
    }

    let stats = session.service.cache_stats(&session.tenant_id);
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        entries = stats.entries,
        "benefactor cache"
    );
    Ok(())
}
