use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use solace::agents::{CodeWorker, CompanionWorker, ReportingWorker, ResearchWorker};
use solace::config::Config;
use solace::isolation::{
    BackendKind, ContainerBackend, IsolationProfile, IsolationRuntime, ProfileTier,
    SessionController, VmBackend, connect_docker,
};
use solace::llm::ModelClient;
use solace::memory::MemoryStore;
use solace::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "solace", about = "Personal companion agent runtime", version)]
struct Cli {
    /// Isolation backend for the session.
    #[arg(long, default_value = "container", global = true)]
    backend: BackendKind,

    /// Isolation profile tier.
    #[arg(long, default_value = "balanced", global = true)]
    profile: ProfileTier,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session.
    Chat,
    /// Run a single command in an isolated session and print the output.
    Exec {
        /// The command to run.
        command: String,
    },
    /// Show session and memory status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Chat => chat(config, cli.backend, cli.profile).await,
        Command::Exec { command } => exec(config, cli.backend, cli.profile, &command).await,
        Command::Status => status(config).await,
    }
}

async fn build_runtime(
    config: &Config,
    backend: BackendKind,
) -> anyhow::Result<Arc<dyn IsolationRuntime>> {
    match backend {
        BackendKind::Container => {
            let docker = connect_docker()
                .await
                .context("container backend needs a reachable Docker daemon")?;
            let mut container = ContainerBackend::new(
                docker,
                config.sandbox_image.clone(),
                config.data_dir.join("sessions").display().to_string(),
            );
            if let Some(skills) = &config.skills_dir {
                container = container.with_skills_dir(skills.display().to_string());
            }
            Ok(Arc::new(container))
        }
        BackendKind::Vm => Ok(Arc::new(VmBackend::new(config.vm_helper.clone()))),
    }
}

async fn start_session(
    config: &Config,
    backend: BackendKind,
    tier: ProfileTier,
) -> anyhow::Result<SessionController> {
    let runtime = build_runtime(config, backend).await?;
    let profile = IsolationProfile::for_tier(tier);
    let controller = SessionController::new(profile, backend, runtime);
    controller
        .start()
        .await
        .context("failed to start the isolated session")?;
    Ok(controller)
}

async fn chat(config: Config, backend: BackendKind, tier: ProfileTier) -> anyhow::Result<()> {
    let memory = Arc::new(MemoryStore::load(config.data_dir.clone()).await?);
    memory.spawn_autosave(config.flush_interval);

    let session = start_session(&config, backend, tier).await?;
    let runtime = session.runtime();

    let companion = Arc::new(
        CompanionWorker::new(Arc::clone(&memory))
            .with_specialist(Arc::new(CodeWorker::new(Arc::clone(&runtime))))
            .with_specialist(Arc::new(ResearchWorker::new()))
            .with_specialist(Arc::new(ReportingWorker::new())),
    );

    let llm = Arc::new(ModelClient::new(config.llm.clone())?);
    let orchestrator = Orchestrator::new(llm, runtime, Arc::clone(&memory), companion);

    println!("solace ready (session {}). Ctrl-D to exit.", session.id());
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match orchestrator.handle_message(line).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    session.stop().await?;
    memory.dispose().await?;
    Ok(())
}

async fn exec(
    config: Config,
    backend: BackendKind,
    tier: ProfileTier,
    command: &str,
) -> anyhow::Result<()> {
    let session = start_session(&config, backend, tier).await?;
    let runtime = session.runtime();

    let result = runtime
        .execute(
            command,
            solace::isolation::ExecOptions::default().with_timeout(config.exec_timeout),
        )
        .await;
    session.stop().await?;

    let result = result?;
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    std::process::exit(result.exit_code as i32);
}

async fn status(config: Config) -> anyhow::Result<()> {
    let memory = Arc::new(MemoryStore::load(config.data_dir.clone()).await?);

    println!("data dir: {}", config.data_dir.display());
    println!("contacts: {}", memory.contacts().await.len());
    println!("journal entries: {}", memory.journal_entries().await.len());

    let deadlines = memory.upcoming_deadlines(10).await;
    if deadlines.is_empty() {
        println!("no active deadlines");
    } else {
        println!("deadlines:");
        for d in &deadlines {
            println!(
                "  {} due {} ({:?}, {}%)",
                d.title,
                d.due_date.format("%Y-%m-%d"),
                d.phase,
                d.progress_percent
            );
        }
    }
    Ok(())
}
