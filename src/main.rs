use anyhow::{Context, Result};
use clap::Parser;
use decision_engine::config::EngineConfig;
use decision_engine::domain::{DecisionRequest, DecisionStatus};
use decision_engine::journal::EventJournal;
use decision_engine::{logging, paths, DecisionService, MemoryEventStore};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "decide")]
#[command(about = "Evaluate a decision with a pipeline of analysis roles")]
#[command(version = decision_engine::LONG_VERSION)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// The decision to evaluate (all arguments are joined)
    #[arg(trailing_var_arg = true, required_unless_present = "check_config")]
    prompt: Vec<String>,

    /// Config file (defaults to ~/.decision-engine/decision.yaml, then the built-in config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Persona to evaluate under (defaults to the config's default_persona)
    #[arg(short, long)]
    persona: Option<String>,

    /// Directory for the JSONL journal
    #[arg(long)]
    journal_dir: Option<PathBuf>,

    /// Do not write a journal
    #[arg(long)]
    no_journal: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init_tracing(cli.verbose) {
        eprintln!("[decide] {:#}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    if let Some(path) = &cli.config {
        return EngineConfig::load(path);
    }
    match paths::user_config_path()? {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Using user config");
            EngineConfig::load(&path)
        }
        None => EngineConfig::default_config(),
    }
}

fn print_summary(config: &EngineConfig) {
    println!("framing:   {}", config.workflow.framing);
    println!("parallel:  {}", config.workflow.parallel.join(", "));
    println!("synthesis: {}", config.workflow.synthesis);
    let mut personas: Vec<&String> = config.personas.keys().collect();
    personas.sort();
    let personas: Vec<&str> = personas.into_iter().map(String::as_str).collect();
    println!("personas:  {}", personas.join(", "));
    println!(
        "runtime:   activity timeout {}s, retention {}s",
        config.runtime.role_activity_timeout_secs, config.runtime.retention_secs
    );
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    if cli.check_config {
        config.build_registry()?;
        print_summary(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let persona = cli
        .persona
        .clone()
        .or_else(|| config.default_persona.clone())
        .context("No persona given and the config has no default_persona")?;
    let prompt = cli.prompt.join(" ");

    let service = Arc::new(DecisionService::new(
        Arc::new(config.build_registry()?),
        Arc::new(MemoryEventStore::new()),
        Arc::new(config.persona_catalog()),
        config.orchestrator_settings(),
    ));

    let (decision_id, mut events) = service
        .submit_and_stream(DecisionRequest::new(prompt, persona))
        .await?;
    tracing::info!(decision_id = %decision_id, "Decision submitted");

    let journal = if cli.no_journal {
        None
    } else {
        let dir = match cli.journal_dir.clone().or(config.runtime.journal_dir.clone()) {
            Some(dir) => dir,
            None => paths::journals_dir()?,
        };
        tracing::info!(
            path = %EventJournal::path_for(&dir, &decision_id).display(),
            "Writing journal"
        );
        Some(EventJournal::spawn(service.log(), decision_id.clone(), &dir))
    };

    let interrupt = {
        let service = service.clone();
        let decision_id = decision_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling decision");
                service.cancel(&decision_id);
            }
        })
    };

    let mut failure = None;
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let line = serde_json::to_string(&event).context("Failed to encode event")?;
                println!("{}", line);
            }
            Err(stream_failure) => failure = Some(stream_failure.reason),
        }
    }
    interrupt.abort();

    if let Some(journal) = journal {
        match journal.await {
            Ok(Ok(lines)) => tracing::debug!(lines, "Journal written"),
            Ok(Err(e)) => tracing::warn!("Journal failed: {:#}", e),
            Err(e) => tracing::warn!("Journal task failed: {}", e),
        }
    }

    let status = service.status(&decision_id);

    match failure {
        None => {
            tracing::info!(decision_id = %decision_id, ?status, "Decision finished");
            Ok(ExitCode::SUCCESS)
        }
        Some(reason) => {
            tracing::error!(decision_id = %decision_id, %reason, "Decision failed");
            if status == Some(DecisionStatus::Cancelled) || reason == "cancelled" {
                Ok(ExitCode::from(130))
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
