mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tutor_core::ProfileStore;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = commands::resolve_config(&cli)?;
    let mut profile = ProfileStore::open(config.profile_path());

    match cli.command {
        None => {
            let service = commands::start_service(&config).await?;
            commands::chat(&service, &mut profile, None).await
        }
        Some(Commands::Chat { system_prompt }) => {
            let service = commands::start_service(&config).await?;
            commands::chat(&service, &mut profile, system_prompt.as_deref()).await
        }
        Some(Commands::Lessons { unit }) => {
            commands::list_lessons(&config, &profile, unit.as_deref())
        }
        Some(Commands::Explain { unit, lesson }) => {
            commands::explain(&config, &mut profile, &unit, &lesson).await
        }
        Some(Commands::Complete { unit, lesson, xp }) => {
            commands::complete(&config, &mut profile, &unit, &lesson, xp)
        }
        Some(Commands::Profile { recent, reset }) => {
            commands::show_profile(&mut profile, recent, reset)
        }
    }
}
