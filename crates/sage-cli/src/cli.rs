use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use sage::Prompt;

/// Command-line arguments for sage
#[derive(Parser, Debug)]
#[command(name = "sage")]
#[command(about = "One client for OpenAI, Anthropic, and Ollama completions")]
#[command(version)]
pub struct Cli {
    /// JSON config file; provider keys come from the environment when unset
    #[arg(long, env = "SAGE_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt through a profile and print the reply
    Complete(CompleteArgs),
    /// List the models a provider offers
    Models {
        /// Provider name (openai, anthropic, ollama)
        provider: String,
        /// Account whose credentials are used
        account: Option<String>,
    },
    /// List configured profiles; the default one is marked with `*`
    Profiles,
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Profile to use instead of the default one
    #[arg(short, long, env = "SAGE_PROFILE")]
    pub profile: Option<String>,

    /// System prompt
    #[arg(short, long, value_name = "TEXT")]
    pub system: Option<String>,

    /// Upper bound on generated tokens
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Wait for the whole reply and print it as JSON with token usage
    #[arg(long)]
    pub json: bool,

    /// Prompt words; read from stdin when omitted
    pub prompt: Vec<String>,
}

impl CompleteArgs {
    /// Builds the prompt from the positional words, or from `piped` input when there are none.
    pub fn to_prompt(&self, piped: Option<String>) -> Result<Prompt> {
        let text = if self.prompt.is_empty() {
            piped.map(|s| s.trim().to_string()).unwrap_or_default()
        } else {
            self.prompt.join(" ")
        };
        if text.is_empty() {
            bail!("no prompt provided");
        }

        let mut prompt = Prompt::new(text);
        if let Some(system) = self.system.as_deref().filter(|s| !s.is_empty()) {
            prompt = prompt.with_system(system);
        }
        if let Some(max_tokens) = self.max_tokens {
            prompt = prompt.with_max_tokens(max_tokens);
        }
        if let Some(secs) = self.timeout {
            prompt = prompt.with_timeout(Duration::from_secs(secs));
        }
        Ok(prompt)
    }
}
