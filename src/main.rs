use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pantheon::providers::{AnthropicBackend, Backend, LocalBackend};
use pantheon::{Config, Council, Registry, Task};

#[derive(Parser)]
#[command(name = "pantheon")]
#[command(about = "Multi-agent orchestration with validated execution and council sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered agent types
    Types,
    /// Run one task on an agent of the given type
    Run {
        #[arg(help = "Agent type or agent id")]
        agent: String,
        #[arg(help = "Task type, e.g. implement_feature")]
        task_type: String,
        #[arg(long, default_value = "{}", help = "Task payload as JSON")]
        payload: String,
    },
    /// Hold a council session and print its record
    Council {
        #[arg(help = "What the council is convened for")]
        purpose: String,
        #[arg(long = "summon", help = "Additional role to summon")]
        summon: Vec<String>,
        #[arg(long = "propose", help = "Proposal to put to a vote")]
        propose: Vec<String>,
        #[arg(long, help = "Closing summary")]
        end_summary: Option<String>,
        #[arg(long, help = "Print markdown instead of JSON")]
        markdown: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env(),
    };

    let registry = Registry::from_config(&config, backend(&config))
        .context("building the agent registry")?;

    match cli.command {
        Commands::Types => list_types(&registry),
        Commands::Run {
            agent,
            task_type,
            payload,
        } => run_task(&registry, &agent, &task_type, &payload).await?,
        Commands::Council {
            purpose,
            summon,
            propose,
            end_summary,
            markdown,
        } => {
            let council = Council::new(registry.clone(), config.council.clone());
            hold_council(&council, &purpose, &summon, &propose, end_summary, markdown).await?
        }
    }

    registry.terminate_all();
    Ok(())
}

fn backend(config: &Config) -> Arc<dyn Backend> {
    match &config.backend.anthropic_api_key {
        Some(api_key) => Arc::new(
            AnthropicBackend::new(api_key.clone())
                .with_model(config.backend.model.clone())
                .with_max_tokens(config.backend.max_tokens),
        ),
        None => {
            log::warn!("ANTHROPIC_API_KEY not set, using the offline backend");
            Arc::new(LocalBackend::new())
        }
    }
}

fn list_types(registry: &Registry) {
    for name in registry.agent_types() {
        if let Some(spec) = registry.blueprint(&name) {
            println!(
                "{:<20} {:<12} {:<32} {}",
                name,
                spec.role.as_str(),
                spec.model,
                spec.description
            );
        }
    }
}

async fn run_task(registry: &Registry, agent: &str, task_type: &str, payload: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("--payload must be valid JSON")?;
    let task = Task::new(task_type, payload).with_requestor("cli");

    let output = registry
        .execute(agent, task)
        .await
        .with_context(|| format!("{} failed on {}", task_type, agent))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn hold_council(
    council: &Council,
    purpose: &str,
    summon: &[String],
    propose: &[String],
    end_summary: Option<String>,
    markdown: bool,
) -> Result<()> {
    let session = council.start(purpose, serde_json::json!({})).await?;
    for role in summon {
        council.summon(session.id, role).await?;
    }
    for proposal in propose {
        council.vote(session.id, proposal, None).await?;
    }
    council.end(session.id, end_summary).await?;

    let document = council.documentation(session.id).await?;
    if markdown {
        println!("{}", document.to_markdown());
    } else {
        println!("{}", serde_json::to_string_pretty(&document)?);
    }
    Ok(())
}
