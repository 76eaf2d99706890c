//! Command-line entry point.
//!
//! ```text
//! sage complete [--profile P] [--system S] [--max-tokens N] [--timeout SECS] [--json] [prompt...]
//! sage models <provider> [account]
//! sage profiles
//! ```
//!
//! Configuration comes from the JSON file named by `--config` / `SAGE_CONFIG`,
//! or from the environment (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//! `OLLAMA_HOST`, `SAGE_PROFILE`, `SAGE_MODEL`) when neither is given.

mod cli;

use std::io::{IsTerminal, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use sage::prelude::*;
use tracing::{debug, info};

use crate::cli::{Cli, Commands, CompleteArgs};

fn load_config(path: Option<&Path>) -> Result<SageConfig> {
    match path.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => {
            info!("Loading config from {}", path.display());
            SageConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(SageConfig::from_env()),
    }
}

/// Reads the whole of stdin when it is piped, `None` on a terminal.
fn piped_stdin() -> Result<Option<String>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut input = String::new();
    stdin.lock().read_to_string(&mut input).context("reading prompt from stdin")?;
    Ok(Some(input))
}

async fn run_complete(client: &Client, args: CompleteArgs) -> Result<()> {
    let piped = if args.prompt.is_empty() { piped_stdin()? } else { None };
    let prompt = args.to_prompt(piped)?;
    let profile = args.profile.as_deref().filter(|p| !p.is_empty());

    if args.json {
        let response = client.complete(profile, prompt).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let mut stream = client.complete_stream(profile, prompt).await?;
    let mut stdout = std::io::stdout();
    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted, dropping stream");
                writeln!(stdout)?;
                return Ok(());
            }
        };

        match chunk {
            Some(Chunk::Content(text)) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            Some(Chunk::Done) => break,
            Some(Chunk::Error(e)) => return Err(e.into()),
            None => return Err(SageError::IncompleteStream.into()),
        }
    }
    writeln!(stdout)?;
    Ok(())
}

async fn list_models(client: &Client, provider: &str, account: Option<&str>) -> Result<()> {
    let models = client.list_models(provider, account).await?;
    for model in models {
        if model.description.is_empty() {
            println!("{}\t{}", model.id, model.name);
        } else {
            println!("{}\t{}\t{}", model.id, model.name, model.description);
        }
    }
    Ok(())
}

fn list_profiles(client: &Client) {
    let default = client.default_profile();
    for (name, profile) in client.profiles() {
        let marker = if Some(name) == default { "*" } else { " " };
        println!(
            "{} {}\t{}:{}\t{}",
            marker, name, profile.provider, profile.account, profile.model
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .compact()
        .init();

    let registry = ProviderRegistry::with_defaults();
    let client = Client::new(load_config(cli.config.as_deref())?, registry);

    match cli.command {
        Commands::Complete(args) => run_complete(&client, args).await,
        Commands::Models { provider, account } => {
            list_models(&client, &provider, account.as_deref()).await
        }
        Commands::Profiles => {
            list_profiles(&client);
            Ok(())
        }
    }
}
