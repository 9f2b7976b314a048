//! Operation subcommands - plan, confirm, execute, report

use anyhow::{Context as _, Result};
use chrono::Local;
use colored::Colorize;
use serde_json::json;
use reconcile::{
    Host, HostReport, HostStatus, HttpProbe, NoProgress, Operation, OperationReport,
    OperationRequest, Orchestrator, Plan, StepResult,
};
use std::time::Duration;

use crate::Context;
use crate::cli::OperationArgs;
use crate::progress::{self, HostBars};
use crate::runner;
use crate::ssh::SshTransport;
use crate::ui;

/// Remote output lines shown per failed step
const OUTPUT_TAIL: usize = 15;

pub fn run(ctx: &Context, operation: Operation, args: &OperationArgs) -> Result<()> {
    let config = &ctx.config;
    config.ensure_valid()?;

    let transport = SshTransport::new(config.transport.clone(), ctx.cancel.clone());
    let probe = HttpProbe::new(Duration::from_secs(config.service.health.timeout_secs));
    let orchestrator = Orchestrator::new(config.orchestrator_config(args.jobs), transport)
        .with_probe(probe)
        .with_cancel_token(ctx.cancel.clone());

    let plan = orchestrator
        .plan(&request(operation, args))
        .with_context(|| format!("Cannot run {operation}"))?;

    if !args.json {
        display_plan(&plan);
    }

    if args.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
        } else {
            println!();
            println!("  {} Dry run - no hosts contacted", "ℹ".blue());
        }
        return Ok(());
    }

    anyhow::ensure!(
        runner::command_exists(&config.transport.ssh),
        "ssh client '{}' not found on PATH",
        config.transport.ssh
    );

    if !args.yes && !confirm_proceed(&plan)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let report = if args.json || ctx.quiet {
        orchestrator.execute(&plan, &NoProgress)?
    } else {
        println!();
        let bars = HostBars::new(&plan);
        orchestrator.execute(&plan, &bars)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} host(s) did not converge",
            report.failed(),
            report.hosts.len()
        );
    }

    Ok(())
}

fn request(operation: Operation, args: &OperationArgs) -> OperationRequest {
    let mut request = OperationRequest::new(operation);
    request.role.clone_from(&args.role);
    request.branch.clone_from(&args.branch);
    request.hosts = args
        .hosts
        .as_ref()
        .map(|hosts| hosts.iter().map(|h| Host::new(h.trim())).collect());
    request
}

fn display_plan(plan: &Plan) {
    ui::header(&format!("{} ({})", plan.operation, plan.operation.description()));
    ui::kv("Role", &plan.role);
    ui::kv(
        "Environment",
        &format!(
            "{} from {}",
            plan.environment.name(),
            plan.environment.remote_ref()
        ),
    );
    ui::kv(
        "Hosts",
        &plan
            .hosts
            .iter()
            .map(Host::as_str)
            .collect::<Vec<_>>()
            .join(", "),
    );

    ui::section("Steps (per host, in order)");
    for (i, step) in plan.steps().iter().enumerate() {
        println!("  {} {}", format!("{}.", i + 1).dimmed(), step);
    }
}

fn plan_json(plan: &Plan) -> serde_json::Value {
    json!({
        "operation": plan.operation.name(),
        "role": plan.role,
        "environment": plan.environment.name(),
        "branch": plan.environment.branch(),
        "ref": plan.environment.remote_ref(),
        "hosts": plan.hosts.iter().map(Host::as_str).collect::<Vec<_>>(),
        "steps": plan.steps().iter().map(|s| s.name()).collect::<Vec<_>>(),
    })
}

/// Confirm with user
fn confirm_proceed(plan: &Plan) -> Result<bool> {
    println!();
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "Run {} on {} host(s)?",
            plan.operation,
            plan.hosts.len()
        ))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn print_report(report: &OperationReport) {
    ui::header("Report");
    ui::kv(
        "Finished",
        &report
            .finished_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    );
    println!();

    for host in &report.hosts {
        print_host(host);
    }

    let elapsed = (report.finished_at - report.started_at)
        .to_std()
        .unwrap_or_default();
    println!();
    if report.is_success() {
        println!(
            "  {} {} host(s) converged in {}",
            "✓".green().bold(),
            report.converged(),
            ui::format_duration(elapsed.as_millis() as u64)
        );
    } else {
        println!(
            "  {} {} converged, {} {}",
            "⚠".yellow().bold(),
            report.converged(),
            report.failed(),
            "failed".red()
        );
        ui::dim("Nothing was rolled back; failed hosts stay where they stopped.");
    }
}

fn print_host(host: &HostReport) {
    let total_ms: u64 = host.steps.iter().map(|s| s.duration_ms).sum();

    match &host.status {
        HostStatus::Converged => {
            let revision = host
                .revision
                .as_deref()
                .map(|r| format!(" at {}", progress::short_rev(r)))
                .unwrap_or_default();
            ui::success(&format!(
                "{}{} ({})",
                host.host,
                revision,
                ui::format_duration(total_ms)
            ));
        }
        HostStatus::Failed { step } => {
            ui::error(&format!("{} failed at {}", host.host, step));
        }
        HostStatus::Interrupted { step } => {
            ui::warn(&format!("{} interrupted at {}", host.host, step));
        }
    }

    let Some(record) = host.failure() else {
        return;
    };
    if let StepResult::Failed {
        category,
        error,
        stdout,
        stderr,
    } = &record.result
    {
        ui::dim(error);
        ui::dim(&format!("{}: {}", category.description(), category.advice()));
        for (label, text) in [("stdout", stdout), ("stderr", stderr)] {
            if text.trim().is_empty() {
                continue;
            }
            let (kept, skipped) = ui::tail(text, OUTPUT_TAIL);
            if skipped > 0 {
                ui::dim(&format!("{label} (last {OUTPUT_TAIL} lines, {skipped} skipped):"));
            } else {
                ui::dim(&format!("{label}:"));
            }
            for line in kept.lines() {
                ui::dim(&format!("  {line}"));
            }
        }
    }
}
