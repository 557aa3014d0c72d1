mod config;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use dietcycle_core::clock::SystemClock;
use dietcycle_core::mail::relay::HttpMailRelay;
use dietcycle_core::mail::{LogMailer, Mailer};
use dietcycle_core::recommend::http::HttpRecommender;
use dietcycle_core::service::DietCycleService;
use dietcycle_db::pool;
use dietcycle_db::queries::users;

use config::DietCycleConfig;

#[derive(Parser)]
#[command(name = "dietcycle", about = "Diet-cycle lifecycle and notification engine")]
struct Cli {
    /// Database URL (overrides DIETCYCLE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a dietcycle config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/dietcycle")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the dietcycle database (requires config file or env vars)
    DbInit,
    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Run one feedback-reminder pass and exit
    Remind,
    /// Serve the HTTP API and run the reminder scheduler in the background
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a user
    Add {
        /// Email address for notifications
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
    },
}

/// Execute the `dietcycle init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let secret = config::generate_link_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
            max_connections: None,
        },
        links: config::LinksSection {
            secret: secret.clone(),
        },
        recommender: config::RecommenderSection::default(),
        mail: config::MailSection::default(),
        app: config::AppSection::default(),
        cycle: config::CycleSection::default(),
        scheduler: config::SchedulerSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  links.secret = {}...{}", &secret[..8], &secret[56..]);
    println!();
    println!("Next: run `dietcycle db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `dietcycle db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = DietCycleConfig::resolve(cli_db_url)?;

    println!("Initializing dietcycle database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("dietcycle db-init complete.");
    Ok(())
}

/// Wire the engine to the configured recommendation engine and mail relay.
fn build_service(db_pool: PgPool, cfg: &DietCycleConfig) -> anyhow::Result<DietCycleService> {
    let recommender = HttpRecommender::new(&cfg.recommender_url, cfg.recommender_timeout)
        .context("failed to build recommendation client")?;

    let mailer: Arc<dyn Mailer> = match &cfg.mail_relay_url {
        Some(url) => Arc::new(
            HttpMailRelay::new(url, &cfg.mail_from, cfg.engine.mail_timeout)
                .context("failed to build mail relay client")?,
        ),
        None => {
            tracing::warn!("no mail relay configured; emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    Ok(DietCycleService::new(
        db_pool,
        Arc::new(recommender),
        mailer,
        Arc::new(SystemClock),
        cfg.link_signer.clone(),
        cfg.engine.clone(),
    ))
}

async fn run_user_command(command: UserCommands, db_pool: &PgPool) -> anyhow::Result<()> {
    match command {
        UserCommands::Add { email, name } => {
            let email = email.trim();
            let user = users::insert_user(db_pool, email, name.trim())
                .await?
                .with_context(|| format!("a user with email {email} already exists"))?;
            println!("User {} created ({}).", user.id, user.email);
        }
    }
    Ok(())
}

async fn run_remind(service: &DietCycleService) -> anyhow::Result<()> {
    let report = service.scheduler().run_once().await?;
    service.dispatcher().flush_mail().await;
    println!(
        "Reminder pass: {} candidates, {} sent, {} debounced, {} already answered, {} failed.",
        report.candidates, report.sent, report.debounced, report.already_answered, report.failed
    );
    Ok(())
}

async fn run_serve(
    service: DietCycleService,
    cfg: &DietCycleConfig,
    bind: &str,
    port: u16,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn({
        let scheduler = service.scheduler().clone();
        let cancel = cancel.clone();
        let every = cfg.scheduler_interval;
        async move { scheduler.run(every, cancel).await }
    });

    let result = serve_cmd::run_serve(service.clone(), bind, port).await;

    cancel.cancel();
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "reminder scheduler task ended abnormally");
    }
    service.dispatcher().flush_mail().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::User { command } => {
            let resolved = DietCycleConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = run_user_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Remind => {
            let resolved = DietCycleConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match build_service(db_pool.clone(), &resolved) {
                Ok(service) => run_remind(&service).await,
                Err(e) => Err(e),
            };
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = DietCycleConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match build_service(db_pool.clone(), &resolved) {
                Ok(service) => run_serve(service, &resolved, &bind, port).await,
                Err(e) => Err(e),
            };
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
