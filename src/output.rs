//! Report formatting.
//!
//! Renders change-sets, apply reports and drift reports as colored text
//! tables or as JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use std::str::FromStr;
use tabled::{Table, Tabled};

use crate::engine::DriftReport;
use crate::error::ConfigError;
use crate::planner::{Action, ApplyReport, ChangeSet};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON output.
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::validation(
                format!("Unknown output format '{other}', expected text or json"),
                "output",
            )),
        }
    }
}

/// Output formatter.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change-set row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Apply result row for table display.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a change-set for display.
    #[must_use]
    pub fn format_plan(&self, changes: &ChangeSet) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(changes)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(changes),
        }
    }

    fn format_plan_text(changes: &ChangeSet) -> String {
        if changes.is_empty() {
            return format!(
                "{} No changes required - infrastructure is up to date.\n",
                "✓".green()
            );
        }

        let rows: Vec<ChangeRow> = changes
            .changes()
            .into_iter()
            .enumerate()
            .map(|(i, entry)| ChangeRow {
                index: i + 1,
                action: Self::format_action(entry.action),
                resource: entry.logical_name.clone(),
                resource_type: entry.resource_type.to_string(),
                reason: Self::truncate(&entry.reason, 48),
            })
            .collect();

        let mut output = String::from("\nChange set\n\n");
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged",
            changes.count(Action::Create).to_string().green(),
            changes.count(Action::Update).to_string().yellow(),
            changes.count(Action::Delete).to_string().red(),
            changes.count(Action::NoOp)
        );

        output
    }

    /// Formats an apply report.
    #[must_use]
    pub fn format_report(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &ApplyReport) -> String {
        let status = if report.is_success() {
            format!("{} Apply complete", "✓".green())
        } else if report.cancelled {
            format!("{} Apply cancelled", "⚠".yellow())
        } else {
            format!("{} Apply finished with errors", "✗".red())
        };

        let mut rows: Vec<ResultRow> = Vec::new();
        rows.extend(report.applied.iter().map(|c| ResultRow {
            resource: c.logical_name.clone(),
            action: Self::format_action(c.action),
            result: "applied".green().to_string(),
            detail: c.provider_id.clone(),
        }));
        rows.extend(report.failed.iter().map(|c| ResultRow {
            resource: c.logical_name.clone(),
            action: Self::format_action(c.action),
            result: "failed".red().to_string(),
            detail: Self::truncate(&c.error, 60),
        }));
        rows.extend(report.skipped.iter().map(|c| ResultRow {
            resource: c.logical_name.clone(),
            action: Self::format_action(c.action),
            result: "skipped".yellow().to_string(),
            detail: c.reason.clone(),
        }));

        let mut output = format!("{status}\n\n");
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = writeln!(
            output,
            "\n   Applied: {}  Failed: {}  Skipped: {}  Unchanged: {}",
            report.applied.len(),
            report.failed.len(),
            report.skipped.len(),
            report.unchanged.len()
        );
        let _ = writeln!(
            output,
            "   Duration: {}ms",
            report.duration().num_milliseconds()
        );

        if !report.outputs.is_empty() {
            output.push_str("\nOutputs:\n");
            for (name, value) in &report.outputs {
                let rendered = value
                    .as_str()
                    .map_or_else(|| value.to_string(), ToString::to_string);
                let _ = writeln!(output, "   {name} = {rendered}");
            }
        }

        output
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - state is converged.\n", "✓".green());
                }

                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                for name in &report.missing {
                    let _ = writeln!(output, "   - {name}: {}", "missing".red());
                }
                for resource in &report.changed {
                    let _ = writeln!(
                        output,
                        "   - {}: changed ({})",
                        resource.logical_name,
                        resource.fields.join(", ")
                    );
                }
                let _ = write!(
                    output,
                    "\n{}/{} resources have drifted.\n",
                    report.missing.len() + report.changed.len(),
                    report.checked
                );
                output
            }
        }
    }

    /// Formats an action with color.
    fn format_action(action: Action) -> String {
        match action {
            Action::Create => "+create".green().to_string(),
            Action::Update => "~update".yellow().to_string(),
            Action::Delete => "-delete".red().to_string(),
            Action::NoOp => "no-op".dimmed().to_string(),
        }
    }

    /// Truncates a string to at most `max_len` characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

#[derive(Serialize)]
struct PlanJson {
    summary: String,
    creates: usize,
    updates: usize,
    deletes: usize,
    unchanged: usize,
    changes: Vec<ChangeJson>,
}

#[derive(Serialize)]
struct ChangeJson {
    action: Action,
    resource: String,
    resource_type: String,
    reason: String,
    requires: Vec<String>,
}

impl From<&ChangeSet> for PlanJson {
    fn from(changes: &ChangeSet) -> Self {
        Self {
            summary: changes.summary(),
            creates: changes.count(Action::Create),
            updates: changes.count(Action::Update),
            deletes: changes.count(Action::Delete),
            unchanged: changes.count(Action::NoOp),
            changes: changes
                .changes()
                .into_iter()
                .map(|entry| ChangeJson {
                    action: entry.action,
                    resource: entry.logical_name.clone(),
                    resource_type: entry.resource_type.to_string(),
                    reason: entry.reason.clone(),
                    requires: entry
                        .requires
                        .iter()
                        .map(|&i| changes.entries[i].logical_name.clone())
                        .collect(),
                })
                .collect(),
        }
    }
}
