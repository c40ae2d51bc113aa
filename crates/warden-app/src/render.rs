//! Console rendering of command replies.

use std::fmt::Write;

use warden_action::{BatchSummary, CommandOutcome, Match, Page, Reply};

/// Render a reply as plain text.
pub fn render_text(reply: &Reply) -> String {
    match reply {
        Reply::Notice(text) => text.clone(),
        Reply::Outcome(outcome) => render_outcome(outcome),
    }
}

/// Render a reply as a JSON document.
pub fn render_json(reply: &Reply) -> Result<String, serde_json::Error> {
    match reply {
        Reply::Notice(text) => serde_json::to_string_pretty(&serde_json::json!({ "notice": text })),
        Reply::Outcome(outcome) => serde_json::to_string_pretty(outcome),
    }
}

fn render_outcome(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::ScanPage(page) | CommandOutcome::Page(page) => render_page(page),
        CommandOutcome::NoMatches => "No banned users found in this server.".to_string(),
        CommandOutcome::Batch(summary) => render_batch(summary),
        CommandOutcome::Check(check) => {
            let mut out = format!("User {}\n", check.user_id);
            let _ = writeln!(out, "In server: {}", if check.in_server { "Yes" } else { "No" });
            match check.identity {
                Some(ref identity) => {
                    let _ = writeln!(out, "In roster: Yes");
                    let _ = writeln!(out, "Username: {}", identity.display_name);
                    let _ = write!(out, "Server: {}", identity.origin_server);
                }
                None => {
                    let _ = write!(out, "In roster: No");
                }
            }
            out
        }
        CommandOutcome::Warned(member) => {
            format!("Warning sent to {} ({}).", member.display_tag, member.id)
        }
        CommandOutcome::Report(report) => {
            if report.total == 0 {
                return "No flagged users found in this server.".to_string();
            }
            let mut out = format!("Flagged users ({}):\n{}", report.total, report.mentions);
            for (i, section) in report.sections.iter().enumerate() {
                let _ = write!(out, "\n\nSection {}/{}", i + 1, report.sections.len());
                for m in section {
                    let _ = write!(out, "\n{}", describe_match(m));
                }
            }
            out
        }
        CommandOutcome::Reloaded { total } => format!("Roster reloaded: {} entries.", total),
        CommandOutcome::Added(identity) => format!(
            "Added {} ({}) from {} to the roster.",
            identity.display_name, identity.id, identity.origin_server
        ),
        CommandOutcome::Removed(identity) => format!(
            "Removed {} ({}) from the roster.",
            identity.display_name, identity.id
        ),
        CommandOutcome::Status(status) => {
            let modified = status
                .last_modified
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            format!("Roster entries: {}\nLast modified: {}", status.total, modified)
        }
        CommandOutcome::Override { enabled } => format!(
            "Privileged override {}.",
            if *enabled { "enabled" } else { "disabled" }
        ),
        CommandOutcome::Cancel { stopped } => {
            if *stopped {
                "Stopping the running batch action.".to_string()
            } else {
                "No batch action is running.".to_string()
            }
        }
        CommandOutcome::Help(entries) => {
            let width = entries.iter().map(|e| e.usage.len()).max().unwrap_or(0);
            entries
                .iter()
                .map(|e| format!("{:width$}  {}", e.usage, e.description, width = width))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

fn describe_match(m: &Match) -> String {
    format!(
        "{} ({}) | ID: {} | Server: {}",
        m.member.display_tag, m.identity.display_name, m.member.id, m.identity.origin_server
    )
}

fn render_page(page: &Page<Match>) -> String {
    let mut out = format!(
        "Found {} banned users (Page {}/{})",
        page.total_items,
        page.index + 1,
        page.total_pages
    );
    for m in &page.items {
        let _ = write!(out, "\n{}", describe_match(m));
    }
    let controls = page.controls();
    if !controls.prev_disabled {
        let _ = write!(out, "\n[prev] {}", controls.prev);
    }
    if !controls.next_disabled {
        let _ = write!(out, "\n[next] {}", controls.next);
    }
    out
}

fn render_batch(summary: &BatchSummary) -> String {
    let run = &summary.run;
    if run.total == 0 {
        return "No banned users found to act on.".to_string();
    }
    let verb = if summary.action == "BAN" { "Banned" } else { "Warned" };
    let mut out = format!(
        "{} {} users. Failed: {}. Total: {}.",
        verb, run.succeeded, run.failed, run.total
    );
    if run.cancelled {
        out.push_str(" Cancelled before completion.");
    }
    out
}
