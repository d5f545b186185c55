//! CLI output formatting

use crate::core::{RunStatus, StepState, Table, Visualization};
use crate::notify::{LogLevel, RunEvent, StepLogUpdate};
use crate::storage::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Width a single table cell is truncated to
const CELL_WIDTH: usize = 40;

/// Create a progress bar counting percent points over all steps
pub fn create_progress_bar(steps: usize) -> ProgressBar {
    let progress = ProgressBar::new((steps.max(1) * 100) as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Renders run events on a progress bar
pub struct RunProgress {
    bar: ProgressBar,
    step_names: Vec<String>,
}

impl RunProgress {
    pub fn new(step_names: Vec<String>) -> Self {
        Self {
            bar: create_progress_bar(step_names.len()),
            step_names,
        }
    }

    pub fn handle(&self, event: &RunEvent) {
        match event {
            RunEvent::Log(update) => {
                for line in format_log_update(update) {
                    self.bar.println(line);
                }
            }
            RunEvent::Status(status) => {
                let name = self.step_name(status.step_index);
                let overall = status.step_index as f64 * 100.0 + status.progress.clamp(0.0, 100.0);
                self.bar.set_position(overall as u64);
                match status.state {
                    StepState::Running => self.bar.set_message(name.to_string()),
                    StepState::Success if status.progress >= 100.0 => self.bar.println(format!(
                        "{} {}",
                        CHECK,
                        style(name).green()
                    )),
                    StepState::Failed if status.progress >= 100.0 => self.bar.println(format!(
                        "{} {}",
                        CROSS,
                        style(name).red()
                    )),
                    _ => {}
                }
            }
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn step_name(&self, index: usize) -> &str {
        self.step_names
            .get(index)
            .map(String::as_str)
            .unwrap_or("step")
    }
}

/// One printable line per logged message
pub fn format_log_update(update: &StepLogUpdate) -> Vec<String> {
    let (icon, label) = match update.level {
        LogLevel::Debug => (INFO, style("DEBUG").dim()),
        LogLevel::Info => (INFO, style("INFO").cyan()),
        LogLevel::Warning => (WARN, style("WARN").yellow()),
        LogLevel::Error => (CROSS, style("ERROR").red()),
    };
    update
        .logs
        .iter()
        .map(|line| {
            format!(
                "{}{} [{}] {}",
                icon,
                label,
                style(update.step_index + 1).dim(),
                line
            )
        })
        .collect()
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Initializing => style("INITIALIZING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a stored run for listing
pub fn format_run_summary(summary: &RunSummary) -> String {
    let icon = if summary.has_result { CHECK } else { SPINNER };
    format!(
        "{} {} - {}{}",
        icon,
        style(&summary.run_id).bold(),
        style(summary.modified.format("%Y-%m-%d %H:%M:%S")).dim(),
        if summary.has_result {
            String::new()
        } else {
            format!(" - {}", style("no result").dim())
        }
    )
}

/// Describe a visualization in one line
pub fn describe_visualization(visualization: &Visualization) -> String {
    match visualization {
        Visualization::SimpleText { text } => format_output(text, 5),
        Visualization::Html { html, .. } => format!("HTML ({} bytes)", html.len()),
        Visualization::Plotly { .. } => "Plotly figure".to_string(),
        Visualization::Multi { visualizations } => {
            format!("{} panel(s)", visualizations.len())
        }
    }
}

/// Render a table as aligned text
pub fn format_table(table: &Table) -> String {
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    let widths: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = table
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect();
    out.push_str(&style(header.join(" | ")).bold().to_string());
    out.push('\n');
    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        out.push_str(&line.join(" | "));
        out.push('\n');
    }
    out
}

fn render_cell(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace('\n', " "),
        other => other.to_string(),
    };
    if text.chars().count() > CELL_WIDTH {
        let truncated: String = text.chars().take(CELL_WIDTH - 1).collect();
        format!("{}…", truncated)
    } else {
        text
    }
}

/// Format output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_table_aligns_columns() {
        console::set_colors_enabled(false);
        let table = Table::from_rows(
            vec!["text".to_string(), "n".to_string()],
            vec![vec![json!("hello"), json!(12)], vec![json!(null), json!(3)]],
        )
        .unwrap();
        let rendered = format_table(&table);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "text  | n ");
        assert_eq!(lines[1], "hello | 12");
        assert_eq!(lines[2], "      | 3 ");
    }

    #[test]
    fn test_long_cells_are_truncated() {
        let cell = render_cell(&json!("x".repeat(100)));
        assert_eq!(cell.chars().count(), CELL_WIDTH);
    }
}
