//! Per-host progress bars for operation runs

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reconcile::{Host, HostReport, HostStatus, Plan, ProgressCallback, StepKind, StepResult};
use std::collections::HashMap;
use std::time::Duration;

/// One bar per host, advancing a tick per step
pub struct HostBars {
    _multi: MultiProgress,
    bars: HashMap<Host, ProgressBar>,
}

impl HostBars {
    pub fn new(plan: &Plan) -> Self {
        let multi = MultiProgress::new();
        let width = plan.hosts.iter().map(|h| h.as_str().len()).max().unwrap_or(0);
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {{prefix:<{width}}} [{{bar:20.cyan/blue}}] {{pos}}/{{len}} {{msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        let bars = plan
            .hosts
            .iter()
            .map(|host| {
                let bar = multi.add(ProgressBar::new(plan.steps().len() as u64));
                bar.set_style(style.clone());
                bar.set_prefix(host.to_string());
                bar.set_message("waiting".dimmed().to_string());
                bar.enable_steady_tick(Duration::from_millis(120));
                (host.clone(), bar)
            })
            .collect();

        Self {
            _multi: multi,
            bars,
        }
    }
}

impl ProgressCallback for HostBars {
    fn on_step_start(&self, host: &Host, step: StepKind) {
        if let Some(bar) = self.bars.get(host) {
            bar.set_message(step.to_string());
        }
    }

    fn on_step_complete(&self, host: &Host, step: StepKind, result: &StepResult) {
        let Some(bar) = self.bars.get(host) else {
            return;
        };
        if result.is_success() {
            bar.inc(1);
        } else {
            bar.set_message(format!("{} {}", step, "failed".red()));
        }
    }

    fn on_host_complete(&self, report: &HostReport) {
        let Some(bar) = self.bars.get(&report.host) else {
            return;
        };
        let message = match &report.status {
            HostStatus::Converged => match &report.revision {
                Some(rev) => format!("{} {}", "converged".green(), short_rev(rev).dimmed()),
                None => "converged".green().to_string(),
            },
            HostStatus::Failed { step } => format!("{} at {}", "failed".red(), step),
            HostStatus::Interrupted { step } => format!("{} at {}", "interrupted".yellow(), step),
        };
        bar.finish_with_message(message);
    }
}

/// Abbreviated commit id
pub fn short_rev(rev: &str) -> &str {
    rev.get(..10).unwrap_or(rev)
}
