//! In-process fakes for tests: a scripted directory source, a recording
//! notification sink and a hand-driven clock.

use crate::clock::Clock;
use crate::directory::{DirectorySource, DEFAULT_JOB_ROLES};
use crate::error::UpstreamError;
use crate::notify::NotificationSink;
use chrono::{DateTime, Duration, Utc};
use eternity_models::{RawMember, Role};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    roles: Vec<Role>,
    members: Vec<RawMember>,
    failing: bool,
    role_fetches: usize,
    member_fetches: usize,
}

/// Directory source backed by in-memory lists. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with the default job roles, ids 1 through 10 in allow-list order.
    pub fn with_job_roles() -> Self {
        let directory = Self::new();
        for (idx, name) in DEFAULT_JOB_ROLES.iter().enumerate() {
            directory.add_role(idx as i64 + 1, name);
        }
        directory
    }

    pub fn add_role(&self, id: i64, name: &str) {
        lock(&self.state).roles.push(Role {
            id,
            name: name.to_string(),
        });
    }

    pub fn remove_role(&self, id: i64) {
        lock(&self.state).roles.retain(|role| role.id != id);
    }

    pub fn add_member(&self, id: i64, nickname: &str, role_ids: &[i64]) {
        self.push_member(id, nickname, role_ids, false);
    }

    pub fn add_bot(&self, id: i64, nickname: &str, role_ids: &[i64]) {
        self.push_member(id, nickname, role_ids, true);
    }

    fn push_member(&self, id: i64, nickname: &str, role_ids: &[i64], is_bot: bool) {
        lock(&self.state).members.push(RawMember {
            id,
            raw_nickname: nickname.to_string(),
            role_ids: role_ids.to_vec(),
            is_bot,
        });
    }

    pub fn remove_member(&self, id: i64) {
        lock(&self.state).members.retain(|member| member.id != id);
    }

    /// While set, every fetch fails.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn role_fetches(&self) -> usize {
        lock(&self.state).role_fetches
    }

    pub fn member_fetches(&self) -> usize {
        lock(&self.state).member_fetches
    }
}

impl DirectorySource for FakeDirectory {
    async fn fetch_roles(&self, _guild_id: i64) -> Result<Vec<Role>, UpstreamError> {
        let mut state = lock(&self.state);
        state.role_fetches += 1;
        if state.failing {
            return Err(UpstreamError::new("fake directory offline"));
        }
        Ok(state.roles.clone())
    }

    async fn fetch_members(&self, _guild_id: i64) -> Result<Vec<RawMember>, UpstreamError> {
        let mut state = lock(&self.state);
        state.member_fetches += 1;
        if state.failing {
            return Err(UpstreamError::new("fake directory offline"));
        }
        Ok(state.members.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Direct {
        user_id: i64,
        text: String,
    },
    Channel {
        channel_id: i64,
        text: String,
    },
    Edit {
        channel_id: i64,
        message_id: i64,
        text: String,
    },
}

#[derive(Debug, Default)]
struct SinkState {
    sent: Vec<SentMessage>,
    unreachable_users: HashSet<i64>,
    failing: bool,
}

/// Notification sink that records every delivered message. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct messages to `user_id` fail from now on.
    pub fn make_unreachable(&self, user_id: i64) {
        lock(&self.state).unreachable_users.insert(user_id);
    }

    /// While set, every delivery fails.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.state).sent.clone()
    }

    pub fn directs(&self) -> Vec<(i64, String)> {
        lock(&self.state)
            .sent
            .iter()
            .filter_map(|msg| match msg {
                SentMessage::Direct { user_id, text } => Some((*user_id, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn channel_posts(&self) -> Vec<(i64, String)> {
        lock(&self.state)
            .sent
            .iter()
            .filter_map(|msg| match msg {
                SentMessage::Channel { channel_id, text } => Some((*channel_id, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(i64, i64, String)> {
        lock(&self.state)
            .sent
            .iter()
            .filter_map(|msg| match msg {
                SentMessage::Edit {
                    channel_id,
                    message_id,
                    text,
                } => Some((*channel_id, *message_id, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.state).sent.clear();
    }

    fn record(&self, message: SentMessage) -> Result<(), UpstreamError> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(UpstreamError::new("fake sink offline"));
        }
        if let SentMessage::Direct { user_id, .. } = &message {
            if state.unreachable_users.contains(user_id) {
                return Err(UpstreamError::new(format!("cannot message user {user_id}")));
            }
        }
        state.sent.push(message);
        Ok(())
    }
}

impl NotificationSink for RecordingSink {
    async fn send_direct(&self, user_id: i64, text: &str) -> Result<(), UpstreamError> {
        self.record(SentMessage::Direct {
            user_id,
            text: text.to_string(),
        })
    }

    async fn send_channel(&self, channel_id: i64, text: &str) -> Result<(), UpstreamError> {
        self.record(SentMessage::Channel {
            channel_id,
            text: text.to_string(),
        })
    }

    async fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), UpstreamError> {
        self.record(SentMessage::Edit {
            channel_id,
            message_id,
            text: text.to_string(),
        })
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *lock(&self.now) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
