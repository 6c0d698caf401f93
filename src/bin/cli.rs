use anyhow::Context;
use clap::{Parser, Subcommand};
use scrapeflow::browser::HttpBrowser;
use scrapeflow::compiler::{loader, validator};
use scrapeflow::runtime::{ConfigStore, Engine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. "debug", "scrapeflow=trace")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        /// Path to the workflow YAML file
        file: PathBuf,
        /// Abort after this many steps
        #[arg(long)]
        max_steps: Option<usize>,
        /// Overrides the document's userAgent
        #[arg(long)]
        user_agent: Option<String>,
        /// Keep parameter write-backs in memory instead of rewriting the file
        #[arg(long)]
        no_persist: bool,
    },
    /// Report structural problems in a workflow file
    Check {
        file: PathBuf,
    },
    /// Print the states, methods, transitions and parameters of a workflow file
    Describe {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { file, max_steps, user_agent, no_persist } => {
            info!("Loading workflow from: {:?}", file);
            let workflow = loader::load_workflow_from_yaml(&file)
                .with_context(|| format!("Failed to load workflow {}", file.display()))?;
            loader::log_description(&workflow);

            for issue in validator::check(&workflow) {
                warn!("{}", issue);
            }
            validator::validate(&workflow)?;

            // Overrides apply to this run only; write-backs persist the document as loaded.
            let mut settings = workflow.settings.clone();
            if max_steps.is_some() {
                settings.max_steps = max_steps;
            }
            let user_agent = user_agent.or_else(|| workflow.user_agent.clone());

            let browser = HttpBrowser::new(user_agent.as_deref())
                .context("Failed to start the page driver")?;
            let mut client = reqwest::Client::builder();
            if let Some(ua) = user_agent.as_deref() {
                client = client.user_agent(ua);
            }
            let engine = Engine::with_standard_actions(Arc::new(browser), client.build()?);

            let store = if no_persist {
                ConfigStore::in_memory(workflow)
            } else {
                ConfigStore::with_path(workflow, &file)
            };

            let report = engine
                .run_with_settings(&store, settings)
                .await
                .context("Workflow run failed")?;
            info!(run_id = %report.run_id, steps = report.steps, "Run complete");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Check { file } => {
            let workflow = loader::load_workflow_from_yaml(&file)
                .with_context(|| format!("Failed to load workflow {}", file.display()))?;
            let issues = validator::check(&workflow);
            if issues.is_empty() {
                println!("{}: ok", file.display());
            } else {
                for issue in &issues {
                    println!("{}: {}", file.display(), issue);
                }
                validator::validate(&workflow)?;
            }
        }
        Commands::Describe { file } => {
            let workflow = loader::load_workflow_from_yaml(&file)
                .with_context(|| format!("Failed to load workflow {}", file.display()))?;
            print!("{}", loader::describe(&workflow));
        }
    }

    Ok(())
}

