//! skald - command-line front end for the generation orchestrator

use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use skald::{ChainSecretStore, Config, ContentKind, GenerationRequest, Orchestrator};

#[derive(Parser)]
#[command(name = "skald", version, about = "Multi-provider content generation")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "SKALD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate content for a prompt
    Generate {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        /// Content kind: title, body, excerpt, tags or comment
        #[arg(short, long, default_value = "title")]
        kind: ContentKind,
        /// Maximum tokens to generate (defaults per kind)
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Sampling temperature in [0, 1] (defaults per kind)
        #[arg(short, long)]
        temperature: Option<f32>,
        /// Output language code
        #[arg(short, long, default_value = "en")]
        language: String,
        /// Provider id to try first
        #[arg(short, long)]
        provider: Option<String>,
        /// Always call a provider; skip the response cache
        #[arg(long)]
        no_cache: bool,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured providers and their circuit state
    Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: warn for CLI; override with RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = ChainSecretStore::standard()?;
    let orchestrator = Orchestrator::from_config(&config, &secrets)?;

    match args.command {
        Command::Providers => {
            let providers = orchestrator.providers();
            if providers.is_empty() {
                println!("no providers configured");
            }
            for p in providers {
                println!(
                    "{} ({}): max_tokens={} cost_per_token={} circuit={}",
                    p.id, p.model, p.max_tokens, p.cost_per_token, p.circuit
                );
            }
        }

        Command::Generate {
            prompt,
            kind,
            max_tokens,
            temperature,
            language,
            provider,
            no_cache,
            json,
        } => {
            let prompt = resolve_prompt(prompt)?;
            let mut request = GenerationRequest::new(kind, prompt).language(language);
            if let Some(max_tokens) = max_tokens {
                request = request.max_tokens(max_tokens);
            }
            if let Some(temperature) = temperature {
                request = request.temperature(temperature);
            }
            if let Some(provider) = provider {
                request = request.prefer(provider);
            }
            if no_cache {
                request = request.bypass_cache();
            }

            let response = orchestrator.generate(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.content());
                eprintln!(
                    "provider: {} ({}), tokens: {}, cost: {:.6}, quality: {:.2}, took {:?}",
                    response.provider_id(),
                    response.model_id(),
                    response.tokens_used(),
                    response.cost(),
                    response.quality_score(),
                    response.processing_time(),
                );
            }
        }
    }

    Ok(())
}

fn resolve_prompt(prompt: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    match prompt {
        Some(p) => Ok(p),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf.trim_end().to_string())
        }
    }
}
