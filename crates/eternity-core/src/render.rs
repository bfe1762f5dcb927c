//! Message text for notifications, listings, results and the roster board.

use crate::directory::RoleSnapshot;
use crate::poll::PollSummary;
use crate::results::PollResults;
use crate::targets::{operator_summary, redacted_summary};
use chrono::{DateTime, FixedOffset, Utc};
use eternity_models::{Member, Poll, PollState};
use std::collections::BTreeSet;
use std::fmt::Write;

const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M";

fn kind_label(poll: &Poll) -> &'static str {
    if poll.identifiable {
        "named"
    } else {
        "anonymous"
    }
}

fn kind_detail(poll: &Poll) -> &'static str {
    if poll.identifiable {
        "named (nickname, job and level are shown)"
    } else {
        "anonymous (only per-choice statistics are shown)"
    }
}

pub fn format_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(DEADLINE_FORMAT).to_string()
}

fn deadline_text(poll: &Poll, offset: FixedOffset) -> String {
    match poll.deadline() {
        Some(deadline) => format_time(deadline, offset),
        None => "not started".to_string(),
    }
}

fn push_choices(out: &mut String, poll: &Poll) {
    for (idx, choice) in poll.choices.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", idx + 1, choice);
    }
}

/// Direct message inviting one member to respond.
pub fn notification(poll: &Poll, member: &Member, offset: FixedOffset) -> String {
    let name = &member.display_name;
    let mut out = String::new();
    let _ = writeln!(out, "**[Eternity guild poll]**");
    let _ = writeln!(out, "Hello, {name}! Your opinion is needed for the guild's plans.");
    let _ = writeln!(out, "```* Poll id: {}", poll.id);
    let _ = writeln!(out, "* Targets: {}", redacted_summary(&poll.targets));
    let _ = writeln!(out, "* Title: {}", poll.title);
    let _ = writeln!(out, "* Kind: {}", kind_detail(poll));
    let _ = writeln!(
        out,
        "* Duration: {} hours (until {})",
        poll.duration_hours,
        deadline_text(poll, offset)
    );
    let _ = writeln!(out, "* Choices:");
    push_choices(&mut out, poll);
    let _ = writeln!(out, "---\n[Description]\n{}", poll.description);
    out.push_str("```\n");
    let _ = writeln!(out, "Reply with `!poll vote <poll id> <choice number>`, for example:");
    for (idx, choice) in poll.choices.iter().enumerate() {
        let _ = writeln!(out, "* `!poll vote {} {}`: {}", poll.id, idx + 1, choice);
    }
    let _ = write!(out, "\nThank you, {name}.");
    out
}

/// Operator view of one poll, targets unredacted.
pub fn poll_info(poll: &Poll, offset: FixedOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "**[Poll info: '{}']**", poll.title);
    let _ = writeln!(out, "* Poll id: {}", poll.id);
    let _ = writeln!(out, "* Targets: {}", operator_summary(&poll.targets));
    let _ = writeln!(out, "* Kind: {}", kind_label(poll));
    let _ = writeln!(
        out,
        "* Duration: {} hours (until {})",
        poll.duration_hours,
        deadline_text(poll, offset)
    );
    let _ = writeln!(out, "* Choices:");
    push_choices(&mut out, poll);
    let _ = write!(out, "---\n[Description]\n{}", poll.description);
    out
}

/// Polls grouped into active, not started and finished sections.
pub fn poll_list(polls: &[PollSummary], now: DateTime<Utc>, offset: FixedOffset) -> String {
    let mut out = String::new();
    let sections = [
        ("Active polls", &[PollState::Active][..]),
        ("Not started", &[PollState::Draft][..]),
        ("Finished", &[PollState::Expired, PollState::Closed][..]),
    ];

    for (idx, (heading, states)) in sections.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "**[{heading}]**");
        let mut any = false;
        for summary in polls.iter().filter(|s| states.contains(&s.state)) {
            any = true;
            let poll = &summary.poll;
            let _ = match summary.state {
                PollState::Draft => writeln!(
                    out,
                    "* [{}] '{}' - not started ({} hours once started)",
                    kind_label(poll),
                    poll.title,
                    poll.duration_hours
                ),
                PollState::Active => {
                    let remaining = poll
                        .deadline()
                        .map(|d| (d - now).num_hours())
                        .unwrap_or_default();
                    writeln!(
                        out,
                        "* [{}] '{}' - until {} ({} hours left)",
                        kind_label(poll),
                        poll.title,
                        deadline_text(poll, offset),
                        remaining
                    )
                }
                PollState::Expired | PollState::Closed => writeln!(
                    out,
                    "* [{}] '{}' - ended {}",
                    kind_label(poll),
                    poll.title,
                    deadline_text(poll, offset)
                ),
            };
        }
        if !any {
            let _ = writeln!(out, "* none");
        }
    }
    out
}

pub fn results(results: &PollResults) -> String {
    let poll = &results.poll;
    let mut out = String::new();
    let _ = writeln!(out, "**[Poll results: '{}']**", poll.title);
    let _ = writeln!(out, "* Participants: {}", results.participants);
    for entry in &results.tallies {
        let _ = writeln!(out, "* {}: {}", entry.choice, entry.count);
        if poll.identifiable {
            if !entry.voters.is_empty() {
                let _ = writeln!(out, "  * {}", entry.voters.join(", "));
            }
        } else if !entry.job_roles.is_empty() {
            let roles: Vec<String> = entry
                .job_roles
                .iter()
                .map(|(role, count)| format!("{role}({count})"))
                .collect();
            let _ = writeln!(out, "  * By job: {}", roles.join(" "));
        }
    }
    out
}

/// Guild member board grouped by job role, in allow-list order. A member
/// holding several job roles is listed under each; the total counts people.
pub fn roster(
    job_roles: &[String],
    roles: &RoleSnapshot,
    members: &[Member],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "**[Guild members]** (as of {})",
        now.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S")
    );
    let mut listed = BTreeSet::new();
    for role in job_roles {
        let Some(role_id) = roles.id_of(role) else {
            continue;
        };
        let holders: Vec<&Member> = members
            .iter()
            .filter(|m| !m.is_bot && m.has_role(role_id))
            .collect();
        if holders.is_empty() {
            continue;
        }
        listed.extend(holders.iter().map(|m| m.id));
        let mentions: Vec<String> = holders.iter().map(|m| format!("<@{}>", m.id)).collect();
        let _ = writeln!(out, "\n**{}** ({}): {}", role, mentions.len(), mentions.join(" "));
    }
    let _ = writeln!(out, "\n**[Total: {}]**", listed.len());
    out
}
