use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const SELECTOR_ALL: &str = "ALL";
const SELECTOR_USER_PREFIX: &str = "user:";

/// One entry of a poll's target list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Selector {
    All,
    Role(String),
    User(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == SELECTOR_ALL {
            return Selector::All;
        }
        match raw.strip_prefix(SELECTOR_USER_PREFIX) {
            Some(nickname) => Selector::User(nickname.to_string()),
            None => Selector::Role(raw.to_string()),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Selector::User(_))
    }

    /// The role name or nickname without its prefix.
    pub fn value(&self) -> &str {
        match self {
            Selector::All => SELECTOR_ALL,
            Selector::Role(name) => name,
            Selector::User(nickname) => nickname,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str(SELECTOR_ALL),
            Selector::Role(name) => f.write_str(name),
            Selector::User(nickname) => write!(f, "{SELECTOR_USER_PREFIX}{nickname}"),
        }
    }
}

impl From<String> for Selector {
    fn from(raw: String) -> Self {
        Selector::parse(&raw)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

/// Lifecycle position of a poll at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    Draft,
    Active,
    /// Past its deadline but not yet swept closed.
    Expired,
    Closed,
}

/// Which closing condition ended a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    Timeout,
    Quorum,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Timeout => "timeout",
            CloseReason::Quorum => "quorum",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "timeout" => Some(CloseReason::Timeout),
            "quorum" => Some(CloseReason::Quorum),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: i64,
    pub title: String,
    pub identifiable: bool,
    pub targets: Vec<Selector>,
    pub choices: Vec<String>,
    pub description: String,
    pub duration_hours: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub closed: bool,
    /// Set together with `closed`.
    pub closed_by: Option<CloseReason>,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .map(|started| started + Duration::hours(self.duration_hours))
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> PollState {
        if self.closed {
            return PollState::Closed;
        }
        match self.deadline() {
            None => PollState::Draft,
            Some(deadline) if now >= deadline => PollState::Expired,
            Some(_) => PollState::Active,
        }
    }

    /// Responses are taken strictly before the deadline.
    pub fn accepts_responses_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == PollState::Active
    }

    /// Timeout close fires strictly after the deadline.
    pub fn timed_out_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|deadline| now > deadline)
    }

    /// Text of the 1-based choice, if in range.
    pub fn choice(&self, index: i64) -> Option<&str> {
        if index < 1 {
            return None;
        }
        let idx = usize::try_from(index - 1).ok()?;
        self.choices.get(idx).map(String::as_str)
    }
}

/// Fields supplied when a poll is created; everything else starts at its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPoll {
    pub title: String,
    pub identifiable: bool,
    pub targets: Vec<Selector>,
    pub choices: Vec<String>,
    pub duration_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub id: i64,
    pub poll_id: i64,
    pub voter_id: i64,
    pub choice: String,
    pub created_at: DateTime<Utc>,
}
