//! Text summary builder for CLI output.
//!
//! Formats install outcomes and application listings as human-readable lines.

use crate::model::{ApplicationRecord, InstallOutcome, PollOutcome};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn app_line(verb: &str, app: &ApplicationRecord) -> String {
    format!(
        "{verb} application '{}' (id {}) at {}: {}",
        app.user_app_name, app.id, app.base_url, app.status
    )
}

fn poll_line(poll: &PollOutcome) -> String {
    format!(
        "Final status: {} after {} status {}",
        poll.final_status,
        poll.attempts,
        if poll.attempts == 1 { "check" } else { "checks" }
    )
}

/// Build a text summary of an install invocation.
pub(crate) fn build_install_summary(outcome: &InstallOutcome) -> TextSummary {
    let mut lines = Vec::new();
    match outcome {
        InstallOutcome::Deployed { application, poll } => {
            lines.push(app_line("Deployed", application));
            lines.extend(poll.as_ref().map(poll_line));
        }
        InstallOutcome::Updated { application, poll } => {
            lines.push(app_line("Updated", application));
            lines.extend(poll.as_ref().map(poll_line));
        }
        InstallOutcome::Library { library } => {
            let version = library.version.as_deref().unwrap_or("-");
            lines.push(format!(
                "Deployed library '{}' {} (id {}): {}",
                library.name, version, library.id, library.status
            ));
        }
    }
    TextSummary { lines }
}

/// Build an aligned table of applications.
pub(crate) fn build_status_summary(apps: &[ApplicationRecord]) -> TextSummary {
    if apps.is_empty() {
        return TextSummary {
            lines: vec!["No applications deployed".to_string()],
        };
    }
    let id_w = apps.iter().map(|a| a.id.len()).max().unwrap_or(0).max(2);
    let name_w = apps.iter().map(|a| a.user_app_name.len()).max().unwrap_or(0).max(4);
    let status_w = apps.iter().map(|a| a.status.len()).max().unwrap_or(0).max(6);

    let mut lines = vec![format!(
        "{:<id_w$}  {:<name_w$}  {:<status_w$}  BASE URL",
        "ID", "NAME", "STATUS"
    )];
    for app in apps {
        lines.push(format!(
            "{:<id_w$}  {:<name_w$}  {:<status_w$}  {}",
            app.id, app.user_app_name, app.status, app.base_url
        ));
        for message in &app.messages {
            lines.push(format!("{:<id_w$}  ! {message}", ""));
        }
    }
    TextSummary { lines }
}
