//! decalforge CLI
//!
//! Submits decal generation jobs and inspects their records.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use decalforge::config::{self, AppConfig};
use decalforge::logging::{init_logging, LogFormat};
use decalforge::{
    ConfigError, Database, DecalError, GenerationRequest, Job, Orchestrator, PersistenceError,
    SqliteJobStore,
};

#[derive(Parser)]
#[command(name = "decalforge")]
#[command(about = "Generate game car decals with an AI image provider", long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a job and wait for it to finish
    Generate {
        /// Text description of the decal
        #[arg(long)]
        prompt: String,

        /// Palette color, repeat for more (up to 5)
        #[arg(long = "color", required = true)]
        colors: Vec<String>,

        /// Reference image location, repeatable
        #[arg(long = "reference")]
        references: Vec<String>,

        /// Owner of the job
        #[arg(long)]
        user: Option<String>,

        /// Provider to use instead of the configured one
        #[arg(long)]
        provider: Option<String>,
    },
    /// Show the status of a job
    Status { job_id: String },
    /// List jobs, newest first
    List {
        #[arg(long)]
        user: Option<String>,
    },
    /// List registered image providers
    Providers,
    /// Mark jobs abandoned by a stopped process as failed
    Recover,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, LogFormat::from_env()) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    let config = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let orchestrator = match build_orchestrator(&config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error starting decalforge: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, &orchestrator).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator, DecalError> {
    let path = config.database_path().ok_or_else(|| {
        DecalError::Config(ConfigError::Validation {
            message: "could not determine a database location, set DECALFORGE_DATABASE"
                .to_string(),
        })
    })?;
    let db = Database::open(&path).map_err(PersistenceError::from)?;
    let store = Arc::new(SqliteJobStore::new(db));

    Orchestrator::from_config(config, store)
}

async fn run(command: Command, orchestrator: &Orchestrator) -> Result<(), DecalError> {
    match command {
        Command::Generate {
            prompt,
            colors,
            references,
            user,
            provider,
        } => {
            if let Some(name) = provider {
                let active = orchestrator.set_provider(&name);
                if active != name {
                    eprintln!("Provider '{}' is not available, using '{}'", name, active);
                }
            }

            let colors: Vec<&str> = colors.iter().map(String::as_str).collect();
            let mut request =
                GenerationRequest::new(prompt, &colors).with_reference_images(references);
            if let Some(user) = user {
                request = request.with_user(user);
            }

            orchestrator.resume_incomplete().await?;
            let submitted = orchestrator.submit(request).await?;
            println!("Submitted job {} ({})", submitted.job_id, submitted.status);

            let job = orchestrator.wait(&submitted.job_id).await?;
            print_job(&job);
        }
        Command::Status { job_id } => {
            let status = orchestrator.get_status(&job_id).await?;
            println!("{}: {}", job_id, status.status);
            if let Some(url) = status.download_url {
                println!("  Download: {}", url);
            }
        }
        Command::List { user } => {
            let jobs = orchestrator.list_jobs(user.as_deref()).await?;
            if jobs.is_empty() {
                println!("No jobs found");
            }
            for job in jobs {
                println!(
                    "{}  {:<10}  {}  {}",
                    job.id,
                    job.status.as_str(),
                    job.created_at.format("%Y-%m-%d %H:%M:%S"),
                    job.name
                );
            }
        }
        Command::Providers => {
            let active = orchestrator.active_provider();
            for name in orchestrator.available_providers() {
                let marker = if name == active { "*" } else { " " };
                if orchestrator.provider_is_configured(&name) {
                    println!("{} {}", marker, name);
                } else {
                    println!("{} {} (not configured)", marker, name);
                }
            }
        }
        Command::Recover => {
            let marked = orchestrator.resume_incomplete().await?;
            println!("Marked {} interrupted job(s) as failed", marked);
        }
    }
    Ok(())
}

fn print_job(job: &Job) {
    println!("Job {}", job.id);
    println!("  Status: {}", job.status);
    if let Some(ref provider) = job.provider {
        println!("  Provider: {}", provider);
    }
    if let Some(ref url) = job.download_url {
        println!("  Download: {}", url);
    }
    if let Some(ref stage) = job.failed_stage {
        println!("  Failed stage: {}", stage);
    }
}
