mod runs;
mod schedule;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::runs::RunsCommands;
use crate::schedule::ScheduleCommands;

#[derive(Debug, Parser)]
#[command(name = "adintel-cli")]
#[command(about = "Ad intelligence scrape lifecycle command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Start, sync, and inspect scrape runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Advertiser schedules and the monthly budget
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("adintel-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = adintel_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = adintel_db::PoolConfig::from_app_config(&config);
    let pool = adintel_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                adintel_db::health_check(&pool).await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                let applied = adintel_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Runs { command } => runs::dispatch(&pool, &config, command).await?,
        Commands::Schedule { command } => schedule::dispatch(&pool, &config, command).await?,
    }

    Ok(())
}
