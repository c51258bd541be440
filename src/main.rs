// ABOUTME: Entry point for the storyloom binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and either runs one workflow or starts the HTTP server.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use storyloom_agent::{
    KnowledgeLookup, LorebookLookup, NoLookup, PromptStore, RunRequest, StreamMode, Workflow,
    create_chat_model,
};
use storyloom_core::{EventPayload, RunOutcome, WorkflowState};
use storyloom_server::{AppState, ProviderStatus, StoryloomConfig, create_router};

#[derive(Parser)]
#[command(
    name = "storyloom",
    version,
    about = "Refine, write and review short stories with a language model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one workflow and print the final story.
    Run {
        /// The story idea.
        prompt: String,
        /// Rejections tolerated before the run gives up.
        #[arg(long)]
        max_retries: Option<u32>,
        /// Chat-model provider (ollama, openai, anthropic).
        #[arg(long)]
        provider: Option<String>,
        /// Model name for the provider.
        #[arg(long)]
        model: Option<String>,
        /// Print progress events while the run executes.
        #[arg(long)]
        stream: bool,
        /// With --stream, also print model text as it arrives.
        #[arg(long, requires = "stream")]
        tokens: bool,
        /// Print the final state as JSON instead of the story text.
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("storyloom=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = StoryloomConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Run {
            prompt,
            max_retries,
            provider,
            model,
            stream,
            tokens,
            json,
        } => {
            let provider = provider
                .map(|p| p.to_lowercase())
                .unwrap_or_else(|| config.provider.clone());
            let model = model.or_else(|| config.model.clone());
            let workflow = Arc::new(build_workflow(&config, &provider, model.as_deref())?);
            let request = RunRequest::new(prompt)
                .with_max_retries(max_retries.unwrap_or(config.max_retries));

            let state = if stream {
                let mode = if tokens {
                    StreamMode::Tokens
                } else {
                    StreamMode::Updates
                };
                stream_run(&workflow, request, mode).await?
            } else {
                workflow.run(request).await
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_story(&state);
            }
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

/// Assemble the workflow from configuration: chat model, lorebook and prompts.
fn build_workflow(config: &StoryloomConfig, provider: &str, model: Option<&str>) -> Result<Workflow> {
    let chat = create_chat_model(provider, model)?;

    let lookup: Arc<dyn KnowledgeLookup> = match &config.lorebook_dir {
        Some(dir) => {
            let lorebook = LorebookLookup::from_dir(dir)
                .with_context(|| format!("failed to load lorebook from {}", dir.display()))?;
            Arc::new(lorebook)
        }
        None => Arc::new(NoLookup),
    };

    let prompts = Arc::new(PromptStore::new(config.prompts_dir.clone()));
    Ok(Workflow::new(chat, lookup, prompts))
}

async fn stream_run(workflow: &Arc<Workflow>, request: RunRequest, mode: StreamMode) -> Result<WorkflowState> {
    let mut events = workflow.stream(request, mode);
    let mut stderr = std::io::stderr();

    while let Some(event) = events.next().await {
        match event.payload {
            EventPayload::RunStarted { max_retries, .. } => {
                eprintln!("run {} started (max retries: {})", event.run_id, max_retries);
            }
            EventPayload::StepStarted { step } => eprintln!("\n== {} ==", step.label()),
            EventPayload::RequestRefined {
                request,
                fallback_used,
            } => {
                eprintln!("refined: {}{}", request.summary, fallback_marker(fallback_used));
            }
            EventPayload::DraftWritten {
                draft,
                revision,
                fallback_used,
            } => {
                eprintln!(
                    "draft #{}: {} ({} chars){}",
                    revision,
                    draft.title,
                    draft.length_hint,
                    fallback_marker(fallback_used)
                );
            }
            EventPayload::DraftReviewed {
                verdict,
                retry_count,
                ..
            } => {
                let decision = if verdict.approved { "approved" } else { "rejected" };
                eprintln!(
                    "review: {} (score {:.1}, retries {}): {}",
                    decision, verdict.score, retry_count, verdict.feedback
                );
            }
            EventPayload::ToolInvoked { role, tool, query } => {
                eprintln!("{} called {}: {}", role, tool, query);
            }
            EventPayload::ModelDelta { text, .. } => {
                write!(stderr, "{}", text)?;
                stderr.flush()?;
            }
            EventPayload::RunCompleted { state, .. } => return Ok(*state),
        }
    }

    anyhow::bail!("event stream ended before the run completed")
}

fn fallback_marker(fallback_used: bool) -> &'static str {
    if fallback_used { " [fallback]" } else { "" }
}

fn print_story(state: &WorkflowState) {
    match state.outcome() {
        Some(RunOutcome::Approved) => eprintln!("\nApproved after {} rejection(s).", state.retry_count),
        _ => eprintln!(
            "\nGave up after {} rejection(s); showing the last draft.",
            state.retry_count
        ),
    }
    if let Some(verdict) = &state.verdict {
        eprintln!("Final score: {:.1}", verdict.score);
    }

    match &state.draft {
        Some(draft) => {
            println!("# {}\n\n{}", draft.title, draft.body);
        }
        None => eprintln!("No draft was produced."),
    }
}

async fn serve(config: StoryloomConfig) -> Result<()> {
    let workflow = build_workflow(&config, &config.provider, config.model.as_deref())?;
    let provider_status = ProviderStatus::detect();
    let state = Arc::new(AppState::new(
        Arc::new(workflow),
        provider_status,
        config.max_retries,
    ));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(bind = %config.bind, provider = %config.provider, "storyloom listening");

    axum::serve(listener, create_router(state))
        .await
        .context("server error")?;
    Ok(())
}
