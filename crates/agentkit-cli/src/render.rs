use std::fmt::Display;
use std::io::IsTerminal;

use agentkit_installer::{ExecutionResult, InstallPlan, Manifest, RunError, StepStatus};
use agentkit_resolver::ResolvedPlan;
use anstyle::{AnsiColor, Effects, Style};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn resolve_output_style(stdout_is_terminal: bool, no_color: bool) -> OutputStyle {
    if stdout_is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!();
            println!("{}", colorize(section_style(), &line));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(format!("== {title} ==")),
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn join_or_none<T: Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn format_plan_lines(resolved: &ResolvedPlan, plan: &InstallPlan) -> Vec<String> {
    let mut lines = vec![
        format!("components: {}", join_or_none(&resolved.ordered_components)),
        format!(
            "added dependencies: {}",
            join_or_none(&resolved.added_dependencies)
        ),
        format!("agents: {}", join_or_none(&resolved.supported_agents)),
    ];
    if !resolved.unsupported_agents.is_empty() {
        lines.push(format!(
            "unsupported agents: {}",
            join_or_none(&resolved.unsupported_agents)
        ));
    }
    lines.push(format!("snapshot: {}", plan.snapshot_id));

    if plan.steps.is_empty() {
        lines.push("steps: none".to_string());
        return lines;
    }
    lines.push("steps:".to_string());
    lines.extend(plan.step_ids().into_iter().map(|id| format!("  {id}")));
    lines.push("files:".to_string());
    lines.extend(
        plan.targets()
            .into_iter()
            .map(|path| format!("  {}", path.display())),
    );
    lines
}

pub(crate) fn format_execution_lines(
    style: OutputStyle,
    snapshot_id: &str,
    result: &ExecutionResult,
) -> Vec<String> {
    let mut lines = Vec::new();

    for step in result
        .prepare
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Failed)
    {
        lines.push(render_status_line(
            style,
            "err",
            &format!("{}: failed (reason={})", step.step_id, reason(&step.error)),
        ));
    }

    for step in &result.apply.steps {
        let line = match step.status {
            StepStatus::Succeeded => {
                render_status_line(style, "ok", &format!("{}: applied", step.step_id))
            }
            StepStatus::RolledBack => {
                render_status_line(style, "warn", &format!("{}: rolled back", step.step_id))
            }
            StepStatus::Failed => render_status_line(
                style,
                "err",
                &format!("{}: failed (reason={})", step.step_id, reason(&step.error)),
            ),
        };
        lines.push(line);
    }

    for step in result
        .rollback
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Failed)
    {
        lines.push(render_status_line(
            style,
            "err",
            &format!(
                "{}: rollback failed (reason={})",
                step.step_id,
                reason(&step.error)
            ),
        ));
    }

    let summary = match &result.error {
        None => render_status_line(
            style,
            "ok",
            &format!("install complete (snapshot={snapshot_id})"),
        ),
        Some(RunError::Prepare(_)) => render_status_line(
            style,
            "err",
            "install aborted before any file was changed",
        ),
        Some(RunError::Apply {
            rolled_back: true, ..
        }) => render_status_line(
            style,
            "warn",
            &format!("install failed; changes rolled back (snapshot={snapshot_id})"),
        ),
        Some(RunError::Apply {
            rolled_back: false,
            ..
        }) => render_status_line(
            style,
            "err",
            &format!("install failed; partial changes kept (snapshot={snapshot_id})"),
        ),
        Some(RunError::Rollback { .. }) => render_status_line(
            style,
            "err",
            &format!(
                "rollback failed; files may be left modified (restore with: agentkit restore --snapshot {snapshot_id})"
            ),
        ),
    };
    lines.push(summary);
    lines
}

fn reason(error: &Option<String>) -> &str {
    error.as_deref().unwrap_or("unknown")
}

pub(crate) fn format_snapshot_lines(manifests: &[Manifest]) -> Vec<String> {
    if manifests.is_empty() {
        return vec!["no snapshots".to_string()];
    }
    manifests
        .iter()
        .map(|manifest| {
            let captured = manifest.entries.iter().filter(|entry| entry.existed).count();
            format!(
                "{} created={} files={} absent={}",
                manifest.id,
                manifest.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
                captured,
                manifest.entries.len() - captured
            )
        })
        .collect()
}
