//! modelgate CLI: inspect what the router would admit right now.

use modelgate::{Config, LlmManager, TaskCategory};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "modelgate", version, about = "LLM admission control diagnostics")]
struct Cli {
    /// Path to a TOML config file layered over the built-in table.
    #[arg(short, long, env = "MODELGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List models that can serve a task category right now.
    Models {
        /// Task category: dialog, code, reasoning, summarize.
        category: TaskCategory,
    },
    /// Show usage counters for a model.
    Stats { model_id: String },
    /// Show current provider, persisted selection, and credentialed providers.
    Status,
    /// Persist a provider/model pair as the last known good selection.
    Select { provider: String, model_id: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelgate=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let manager = LlmManager::new(&config).context("failed to initialize router")?;

    match cli.command {
        Command::Models { category } => {
            let models = manager.get_available_models(category);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else if models.is_empty() {
                let wait = manager.next_available_in(category);
                match wait {
                    Some(wait) => println!(
                        "no {category} models available, next in {}s",
                        wait.as_secs()
                    ),
                    None => println!("no {category} models have credentials"),
                }
            } else {
                for model in models {
                    let limit = match model.rpm_limit {
                        0 => "unlimited".to_string(),
                        rpm => format!("{rpm} rpm"),
                    };
                    println!("{}\t{}\t{}", model.id, model.provider, limit);
                }
            }
        }
        Command::Stats { model_id } => {
            if manager.registry().get(&model_id).is_none() {
                tracing::warn!(model = %model_id, "model is not registered");
            }
            let stats = manager.get_stats(&model_id);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("requests in window: {}", stats.count_in_window);
                println!("tokens in window:   {}", stats.tokens_in_window);
                match stats.blacklisted_until {
                    Some(until) => println!("blacklisted until:  {until}"),
                    None => println!("blacklisted until:  -"),
                }
            }
        }
        Command::Status => {
            let credentialed: Vec<&str> = manager
                .registry()
                .providers()
                .into_iter()
                .filter(|provider| manager.credentials().has_credentials(provider))
                .collect();
            let persisted = manager.load_state();

            if cli.json {
                let status = serde_json::json!({
                    "current_provider": manager.get_current_provider(),
                    "persisted": persisted,
                    "credentialed_providers": credentialed,
                    "state_path": manager.state_store().path(),
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("current provider: {}", manager.get_current_provider());
                match persisted {
                    Some(selection) => println!(
                        "persisted:        {} / {} at {}",
                        selection.provider, selection.model_id, selection.timestamp
                    ),
                    None => println!("persisted:        -"),
                }
                println!("credentialed:     {}", credentialed.join(", "));
                println!("state file:       {}", manager.state_store().path().display());
            }
        }
        Command::Select { provider, model_id } => {
            let selection = manager.select(&provider, &model_id)?;
            tracing::info!(provider = %selection.provider, model = %selection.model_id, "selection saved");
        }
    }

    Ok(())
}
