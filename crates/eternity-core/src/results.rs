use crate::directory::MemberSnapshot;
use eternity_models::{Poll, PollResponse};
use serde::Serialize;
use std::collections::BTreeMap;

/// Job role bucket for respondents no longer in the directory.
pub const UNKNOWN_JOB_ROLE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceTally {
    pub choice: String,
    pub count: usize,
    /// Respondent identities; only filled for named polls.
    pub voters: Vec<String>,
    /// Respondents per job role; only filled for anonymous polls.
    pub job_roles: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResults {
    pub poll: Poll,
    pub participants: usize,
    pub tallies: Vec<ChoiceTally>,
}

/// Tally responses by choice text in the poll's choice order.
pub fn tally(poll: &Poll, responses: &[PollResponse], members: &MemberSnapshot) -> PollResults {
    let mut tallies: Vec<ChoiceTally> = poll
        .choices
        .iter()
        .map(|choice| ChoiceTally {
            choice: choice.clone(),
            count: 0,
            voters: Vec::new(),
            job_roles: Vec::new(),
        })
        .collect();
    let mut role_counts: Vec<BTreeMap<String, usize>> = vec![BTreeMap::new(); tallies.len()];

    for response in responses {
        let Some(idx) = poll.choices.iter().position(|c| *c == response.choice) else {
            tracing::warn!(
                "poll {}: response {} has unknown choice '{}'",
                poll.id,
                response.id,
                response.choice
            );
            continue;
        };
        let member = members.get(response.voter_id);
        tallies[idx].count += 1;

        if poll.identifiable {
            let identity = match member {
                Some(member) => member.identity(),
                None => format!("unknown member ({})", response.voter_id),
            };
            tallies[idx].voters.push(identity);
        } else {
            let role = member
                .map(|m| m.job_role.clone())
                .unwrap_or_else(|| UNKNOWN_JOB_ROLE.to_string());
            *role_counts[idx].entry(role).or_insert(0) += 1;
        }
    }

    for (entry, counts) in tallies.iter_mut().zip(role_counts) {
        entry.job_roles = counts.into_iter().collect();
    }

    PollResults {
        poll: poll.clone(),
        participants: tallies.iter().map(|t| t.count).sum(),
        tallies,
    }
}
