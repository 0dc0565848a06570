//! `autoflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `list`     — show configured workflows and schedules.
//! - `validate` — build every workflow and schedule without running them.
//! - `run`      — run one workflow and print its summary.
//! - `schedule` — run the cron scheduler until Ctrl-C.
//! - `every`    — repeat one workflow at a fixed interval until Ctrl-C.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use engine::{Context, EngineError, WorkflowEngine};
use scheduler::{IntervalScheduler, JobCallback, JobStatus, WorkflowScheduler};
use tasks::TaskRegistry;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "autoflow",
    about = "Workflow automation engine with cron scheduling",
    version
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, global = true, default_value = "autoflow.json")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `engine=trace`. Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured workflows and schedules.
    List,
    /// Check that every workflow and schedule in the config is valid.
    Validate,
    /// Run one workflow now.
    Run {
        workflow: String,
        /// Initial context as a JSON object.
        #[arg(long)]
        context: Option<String>,
    },
    /// Run the configured cron schedules until interrupted.
    Schedule,
    /// Repeat a workflow at a fixed interval until interrupted.
    Every {
        workflow: String,
        #[arg(long)]
        seconds: f64,
        /// Initial context as a JSON object.
        #[arg(long)]
        context: Option<String>,
        /// Wait one interval before the first run.
        #[arg(long)]
        delay_first: bool,
    },
}

/// Logs the outcome of every scheduled run.
struct LogCallback;

#[async_trait]
impl JobCallback for LogCallback {
    async fn on_job_finished(
        &self,
        job: &JobStatus,
        result: Option<&Context>,
        error: Option<&EngineError>,
    ) -> anyhow::Result<()> {
        match (result, error) {
            (_, Some(err)) => warn!(job = %job.name, error = %err, "scheduled run failed"),
            (Some(ctx), None) => info!(
                job = %job.name,
                keys = ctx.len(),
                next_run = ?job.next_run,
                "scheduled run finished"
            ),
            (None, None) => {}
        }
        Ok(())
    }
}

fn init_logging(flag: Option<&str>, configured: Option<&str>) {
    let filter = match flag.or(configured) {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_context(raw: Option<&str>) -> anyhow::Result<Option<Context>> {
    raw.map(|json| serde_json::from_str::<Context>(json).context("--context must be a JSON object"))
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    init_logging(cli.log_level.as_deref(), config.logging.level.as_deref());

    let registry = TaskRegistry::with_builtins();

    match cli.command {
        Command::List => {
            for (name, definition) in &config.workflows {
                println!(
                    "{name} ({} tasks){}",
                    definition.tasks.len(),
                    definition
                        .description
                        .as_deref()
                        .map(|d| format!(" - {d}"))
                        .unwrap_or_default()
                );
            }
            for job in &config.schedules {
                println!(
                    "schedule {}: {} at '{}' ({}){}",
                    job.name,
                    job.workflow,
                    job.schedule,
                    job.timezone,
                    if job.enabled { "" } else { " [disabled]" }
                );
            }
        }
        Command::Validate => {
            let engine = config.build_engine(&registry).await?;
            let jobs = config.build_jobs()?;
            println!(
                "configuration is valid: {} workflows, {} schedules",
                engine.workflow_names().await.len(),
                jobs.len()
            );
        }
        Command::Run { workflow, context } => {
            let context = parse_context(context.as_deref())?;
            let engine = config.build_engine(&registry).await?;
            let outcome = engine.run(&workflow, context).await;
            if let Ok(summary) = engine.summary(&workflow).await {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            outcome.with_context(|| format!("workflow '{workflow}' failed"))?;
        }
        Command::Schedule => {
            let engine = config.build_engine(&registry).await?;
            let scheduler = WorkflowScheduler::new(engine, config.scheduler.clone());
            for job in config.build_jobs()? {
                scheduler.add_job(job).await;
            }
            scheduler.add_callback(Arc::new(LogCallback)).await;
            scheduler.start().await;

            let mut report = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = report.tick() => {
                        for status in scheduler.get_job_status().await {
                            println!("{}", serde_json::to_string(&status)?);
                        }
                    }
                }
            }

            info!("interrupted, shutting down");
            scheduler.stop().await;
        }
        Command::Every {
            workflow,
            seconds,
            context,
            delay_first,
        } => {
            let every = Duration::try_from_secs_f64(seconds)
                .context("--seconds must be a non-negative number")?;
            let context = parse_context(context.as_deref())?;
            let engine: Arc<WorkflowEngine> = config.build_engine(&registry).await?;
            if !engine.contains(&workflow).await {
                anyhow::bail!("unknown workflow '{workflow}'");
            }

            let intervals = IntervalScheduler::new(engine);
            intervals
                .schedule_workflow(&workflow, every, context, !delay_first)
                .await?;

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            info!("interrupted, shutting down");
            intervals.cancel_all().await;
        }
    }

    Ok(())
}
