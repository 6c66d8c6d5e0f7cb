use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use call_handler::{
    ActionCounters, ActionReport, CounterSnapshot, MetricsPort, SimConfig, SimulatedStage,
};
use chrono::{DateTime, Utc};
use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use roamdeck_cli::{Config, RoamSession, UserLog};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use super::output::{emit_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Number of listeners dialing in
    #[arg(long, default_value_t = 8)]
    pub callers: u64,

    /// How many of them are already on stage when the statement starts
    #[arg(long, default_value_t = 1)]
    pub seated: u64,

    /// Statement to run
    #[arg(long, default_value = "Cereal is a soup")]
    pub statement: String,

    /// Page reaction delay, e.g. `5ms`
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5ms")]
    pub latency: Duration,

    /// Never show the hang-up confirmation box
    #[arg(long)]
    pub stuck_confirmation: bool,

    /// Override the configured stage size
    #[arg(long)]
    pub max_roamers: Option<usize>,

    /// Seed for participant selection
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ReportView {
    action: String,
    caller: String,
    ok: bool,
    error: Option<String>,
    started_at: DateTime<Utc>,
    latency_ms: u64,
}

impl From<&ActionReport> for ReportView {
    fn from(report: &ActionReport) -> Self {
        Self {
            action: report.action.control.label.clone(),
            caller: report.action.caller.to_string(),
            ok: report.ok,
            error: report.error.as_ref().map(ToString::to_string),
            started_at: report.started_at,
            latency_ms: report.latency_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct SimulationSummary {
    statement: String,
    status: String,
    on_stage: Vec<String>,
    reports: Vec<ReportView>,
    counters: CounterSnapshot,
    leaderboard: Vec<UserLog>,
}

pub async fn cmd_simulate(args: SimulateArgs, config: &Config, output: OutputFormat) -> Result<()> {
    let mut settings = config.session.clone();
    if let Some(max_roamers) = args.max_roamers {
        settings.max_roamers = max_roamers;
    }

    let stage = SimulatedStage::new(SimConfig {
        latency: args.latency,
        confirmation_responds: !args.stuck_confirmation,
        ..SimConfig::default()
    });
    let counters = Arc::new(ActionCounters::default());
    let session = RoamSession::attach(
        Arc::new(stage.clone()),
        config.handler.clone(),
        settings,
        Some(counters.clone() as Arc<dyn MetricsPort>),
    )
    .await
    .context("attaching to the simulated room")?;

    for n in 1..=args.callers {
        let row = stage.dial_in(format!("listener-{n}"), Some(1000 + n));
        if n <= args.seated {
            stage.set_status(row, call_handler::RowStatus::InProgress);
        }
    }

    let index = session.add_statement(args.statement.clone());
    session.start_statement(index).await?;
    info!(status = %session.status_line(), "statement running");

    let mut reports = Vec::new();
    if session.can_add() {
        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        reports.extend(collect(session.auto_add_with(&mut rng)?).await?);
    }

    let on_stage = session
        .handler()
        .callers()
        .iter()
        .filter(|caller| caller.state.is_connected())
        .map(|caller| caller.name().to_string())
        .collect();

    reports.extend(collect(session.end_statement().await?).await?);

    let summary = SimulationSummary {
        statement: args.statement,
        status: session.status_line(),
        on_stage,
        reports: reports.iter().map(ReportView::from).collect(),
        counters: counters.snapshot(),
        leaderboard: session.leaderboard(),
    };
    if !emit_structured(output, &summary)? {
        print_human(&summary, &reports);
    }
    Ok(())
}

async fn collect(pending: Vec<JoinHandle<ActionReport>>) -> Result<Vec<ActionReport>> {
    let mut reports = Vec::with_capacity(pending.len());
    for task in pending {
        reports.push(task.await.context("call action task panicked")?);
    }
    Ok(reports)
}

fn print_human(summary: &SimulationSummary, reports: &[ActionReport]) {
    println!("Statement: {}", summary.statement);
    println!("Status: {}", summary.status);
    println!("On stage: {}", summary.on_stage.join(", "));
    println!();
    println!("Actions:");
    for report in reports {
        println!("- {}", report.summary());
    }
    println!();
    println!(
        "Counters: ok={} failed={} mean_latency={}ms",
        summary.counters.ok, summary.counters.failed, summary.counters.mean_latency_ms
    );
    println!();
    println!("Leaderboard:");
    for log in &summary.leaderboard {
        println!(
            "- {} called={} participated={} priority={}",
            log.name,
            log.called.len(),
            log.participated.len(),
            log.priority()
        );
    }
}
