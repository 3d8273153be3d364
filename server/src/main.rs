mod app;
mod auth;
mod config;
mod graphql;
mod http;
mod seed;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_db::{DatabaseSettings, DbPool, connect};
use platform_obs::{ObsConfig, init_tracing, shutdown_tracing};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::TokenVerifier,
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "permission-server", version, about = "Permission authorization service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Create the declared permissions and an Admin role holding them.
    Seed {
        #[arg(long, value_name = "USER_ID", help = "Grant the Admin role to this user")]
        admin_user: Option<Uuid>,
    },
    /// Verify that every gated operation maps to a known permission.
    #[command(name = "check-permissions")]
    CheckPermissions {
        #[arg(long, env = "STRICT_PERMISSIONS", help = "Fail when a declared permission is missing")]
        strict: bool,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
    #[arg(long, env = "STRICT_PERMISSIONS", help = "Refuse to start when a declared permission is missing")]
    strict_permissions: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(ObsConfig::from_env("permission-server")?)?;
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
        },
        Command::Seed { admin_user } => run_seed(admin_user).await,
        Command::CheckPermissions { strict } => run_check(strict).await,
    };
    shutdown_tracing();
    result
}

async fn setup_pool() -> Result<DbPool> {
    let settings = DatabaseSettings::from_env();
    connect(&settings).await.context("connecting to the database")
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = Arc::new(AppConfig::load()?);
    let pool = setup_pool().await?;
    ensure_migrations(&pool, cmd.allow_dirty).await?;
    let data = app::services(pool.clone())?;
    app::check_permissions(&data, cmd.strict_permissions).await?;

    let state = AppState {
        pool,
        schema: graphql::build_schema(data),
        verifier: TokenVerifier::new(&config.jwt_secret),
        config,
    };
    http::serve(ServeConfig::new(cmd.host, cmd.port), state).await
}

async fn run_seed(admin_user: Option<Uuid>) -> Result<()> {
    let pool = setup_pool().await?;
    let data = app::services(pool)?;
    seed::run(&data.service, admin_user).await?;
    Ok(())
}

async fn run_check(strict: bool) -> Result<()> {
    let pool = setup_pool().await?;
    let data = app::services(pool)?;
    app::check_permissions(&data, strict).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `cargo run -p server -- migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::up(&pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::down(&pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}
