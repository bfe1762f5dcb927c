//! Poll lifecycle: draft, start and notify, collect responses, close on
//! timeout or quorum, publish results.

use crate::clock::Clock;
use crate::directory::{DirectoryCache, DirectorySource};
use crate::error::CoreError;
use crate::notify::NotificationSink;
use crate::render;
use crate::results::{tally, PollResults};
use crate::schedule::Scheduler;
use crate::targets::resolve_targets;
use chrono::FixedOffset;
use eternity_db::{poll_responses, polls, DbError, DbPool};
use eternity_models::{Member, NewPoll, Poll, PollResponse, PollState};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub use eternity_models::CloseReason;

pub const DEFAULT_MAX_DURATION_HOURS: i64 = 168;

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Channel that receives results and close announcements.
    pub poll_channel_id: i64,
    pub max_duration_hours: i64,
    /// Offset used when showing deadlines to people.
    pub display_offset: FixedOffset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollSummary {
    pub poll: Poll,
    pub state: PollState,
}

/// Outcome of notifying a poll's targets.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub poll: Poll,
    /// Members a notification was attempted for.
    pub targeted: Vec<Member>,
    /// How many of those notifications went through.
    pub delivered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Closed, not started, deleted, or closed concurrently by someone else.
    Skipped,
    StillOpen { outstanding: usize },
    Closed(CloseReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub closed: usize,
    pub failed: usize,
}

pub struct PollEngine<S, N> {
    db: DbPool,
    directory: Arc<DirectoryCache<S>>,
    sink: N,
    clock: Arc<dyn Clock>,
    settings: PollSettings,
}

impl<S: DirectorySource, N: NotificationSink> PollEngine<S, N> {
    pub fn new(
        db: DbPool,
        directory: Arc<DirectoryCache<S>>,
        sink: N,
        clock: Arc<dyn Clock>,
        settings: PollSettings,
    ) -> Self {
        Self {
            db,
            directory,
            sink,
            clock,
            settings,
        }
    }

    pub fn directory(&self) -> &Arc<DirectoryCache<S>> {
        &self.directory
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    fn validate(&self, poll: &NewPoll) -> Result<(), CoreError> {
        if poll.title.trim().is_empty() {
            return Err(CoreError::BadRequest("title must not be empty".into()));
        }
        if poll.targets.is_empty() {
            return Err(CoreError::BadRequest("at least one target is required".into()));
        }
        if poll.targets.iter().any(|t| t.value().trim().is_empty()) {
            return Err(CoreError::BadRequest("targets must not be empty".into()));
        }
        if poll.choices.is_empty() {
            return Err(CoreError::BadRequest("at least one choice is required".into()));
        }
        if poll.choices.iter().any(|c| c.trim().is_empty()) {
            return Err(CoreError::BadRequest("choices must not be empty".into()));
        }
        if poll.duration_hours < 1 || poll.duration_hours > self.settings.max_duration_hours {
            return Err(CoreError::BadRequest(format!(
                "duration must be between 1 and {} hours",
                self.settings.max_duration_hours
            )));
        }
        Ok(())
    }

    pub async fn create(&self, new_poll: NewPoll) -> Result<Poll, CoreError> {
        self.validate(&new_poll)?;
        let poll = polls::create_poll(&self.db, &new_poll, self.clock.now())
            .await
            .map_err(|err| match err {
                DbError::Conflict => CoreError::DuplicateTitle(new_poll.title.clone()),
                other => other.into(),
            })?;
        tracing::info!("poll {} '{}' created", poll.id, poll.title);
        Ok(poll)
    }

    pub async fn find_by_title(&self, title: &str) -> Result<Poll, CoreError> {
        polls::get_poll_by_title(&self.db, title)
            .await?
            .ok_or(CoreError::NotFound)
    }

    pub async fn set_description(&self, title: &str, description: &str) -> Result<Poll, CoreError> {
        let mut poll = self.find_by_title(title).await?;
        if poll.started_at.is_some() {
            return Err(CoreError::AlreadyStarted);
        }
        // The update is guarded on started_at, so a concurrent start wins.
        if !polls::set_description(&self.db, poll.id, description).await? {
            return Err(CoreError::AlreadyStarted);
        }
        poll.description = description.to_string();
        Ok(poll)
    }

    fn resolve(&self, poll: &Poll) -> Result<Vec<Member>, CoreError> {
        let roles = self.directory.roles();
        let members = self.directory.members();
        resolve_targets(&poll.targets, &roles, &members)
    }

    async fn notify(&self, poll: &Poll, members: &[Member]) -> usize {
        let mut delivered = 0;
        for member in members {
            let text = render::notification(poll, member, self.settings.display_offset);
            match self.sink.send_direct(member.id, &text).await {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!(
                    "poll {}: notification to member {} failed: {}",
                    poll.id,
                    member.id,
                    err
                ),
            }
        }
        delivered
    }

    /// Start a draft poll and notify every resolved target.
    ///
    /// Targets are resolved before anything is written, so a failed
    /// resolution leaves the poll in draft.
    pub async fn start(&self, title: &str) -> Result<Delivery, CoreError> {
        let mut poll = self.find_by_title(title).await?;
        if poll.started_at.is_some() {
            return Err(CoreError::AlreadyStarted);
        }
        let targeted = self.resolve(&poll)?;

        let now = self.clock.now();
        if !polls::mark_started(&self.db, poll.id, now).await? {
            return Err(CoreError::AlreadyStarted);
        }
        poll.started_at = Some(now);
        tracing::info!(
            "poll {} '{}' started for {} members",
            poll.id,
            poll.title,
            targeted.len()
        );

        let delivered = self.notify(&poll, &targeted).await;
        Ok(Delivery {
            poll,
            targeted,
            delivered,
        })
    }

    async fn outstanding(&self, poll: &Poll) -> Result<Vec<Member>, CoreError> {
        let targeted = self.resolve(poll)?;
        let responded: HashSet<i64> = poll_responses::get_responded_voter_ids(&self.db, poll.id)
            .await?
            .into_iter()
            .collect();
        Ok(targeted
            .into_iter()
            .filter(|m| !responded.contains(&m.id))
            .collect())
    }

    /// Re-notify the targets of an active poll who have not responded yet.
    pub async fn resend(&self, title: &str) -> Result<Delivery, CoreError> {
        let poll = self.find_by_title(title).await?;
        if !poll.accepts_responses_at(self.clock.now()) {
            return Err(CoreError::PollNotActive);
        }
        let targeted = self.outstanding(&poll).await?;
        let delivered = self.notify(&poll, &targeted).await;
        tracing::info!(
            "poll {} '{}' resent to {} members",
            poll.id,
            poll.title,
            targeted.len()
        );
        Ok(Delivery {
            poll,
            targeted,
            delivered,
        })
    }

    /// Store `voter_id`'s choice (1-based) as its text.
    pub async fn record_response(
        &self,
        poll_id: i64,
        voter_id: i64,
        choice_index: i64,
    ) -> Result<PollResponse, CoreError> {
        let poll = polls::get_poll(&self.db, poll_id)
            .await?
            .ok_or(CoreError::PollNotActive)?;
        let now = self.clock.now();
        if !poll.accepts_responses_at(now) {
            return Err(CoreError::PollNotActive);
        }
        let choice = poll
            .choice(choice_index)
            .ok_or(CoreError::InvalidChoice(choice_index))?;

        let response = poll_responses::create_response(&self.db, poll.id, voter_id, choice, now)
            .await
            .map_err(|err| match err {
                DbError::Conflict => CoreError::AlreadyResponded,
                other => other.into(),
            })?;
        tracing::debug!("poll {}: member {} responded", poll.id, voter_id);
        Ok(response)
    }

    /// Close the poll if it timed out or every current target has responded,
    /// then post its results.
    ///
    /// Closing is a conditional update and posting is claimed in the store, so
    /// only one caller ever publishes. A failed post gives the claim back and
    /// the next sweep retries it.
    pub async fn check_and_close(&self, poll_id: i64) -> Result<CloseOutcome, CoreError> {
        let Some(poll) = polls::get_poll(&self.db, poll_id).await? else {
            return Ok(CloseOutcome::Skipped);
        };
        if poll.started_at.is_none() {
            return Ok(CloseOutcome::Skipped);
        }

        let reason = match poll.closed_by {
            Some(reason) => reason,
            None if poll.closed => return Ok(CloseOutcome::Skipped),
            None => {
                let reason = if poll.timed_out_at(self.clock.now()) {
                    CloseReason::Timeout
                } else {
                    let outstanding = self.outstanding(&poll).await?.len();
                    if outstanding > 0 {
                        return Ok(CloseOutcome::StillOpen { outstanding });
                    }
                    CloseReason::Quorum
                };
                if !polls::mark_closed(&self.db, poll.id, reason).await? {
                    return Ok(CloseOutcome::Skipped);
                }
                tracing::info!("poll {} '{}' closed ({:?})", poll.id, poll.title, reason);
                reason
            }
        };

        if !polls::claim_results(&self.db, poll.id, self.clock.now()).await? {
            return Ok(CloseOutcome::Skipped);
        }
        if let Err(err) = self.publish_results(poll.id).await {
            polls::release_results(&self.db, poll.id).await?;
            return Err(err);
        }

        let announcement = match reason {
            CloseReason::Timeout => format!("Poll '{}' closed: its deadline passed.", poll.title),
            CloseReason::Quorum => {
                format!("Poll '{}' closed early: every target has responded.", poll.title)
            }
        };
        if let Err(err) = self
            .sink
            .send_channel(self.settings.poll_channel_id, &announcement)
            .await
        {
            tracing::warn!("poll {}: close announcement failed: {}", poll.id, err);
        }
        Ok(CloseOutcome::Closed(reason))
    }

    /// Run `check_and_close` over every poll that is open or still owes its
    /// results. Per-poll failures are logged.
    pub async fn sweep(&self) -> Result<SweepReport, CoreError> {
        let open = polls::list_open_polls(&self.db).await?;
        let mut report = SweepReport::default();
        for poll in open {
            report.checked += 1;
            match self.check_and_close(poll.id).await {
                Ok(CloseOutcome::Closed(_)) => report.closed += 1,
                Ok(_) => {}
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!("poll {}: close check failed: {}", poll.id, err);
                }
            }
        }
        tracing::debug!(
            "poll sweep: checked={} closed={} failed={}",
            report.checked,
            report.closed,
            report.failed
        );
        Ok(report)
    }

    async fn tally(&self, poll: Poll) -> Result<PollResults, CoreError> {
        let responses = poll_responses::get_poll_responses(&self.db, poll.id).await?;
        let members = self.directory.members();
        Ok(tally(&poll, &responses, &members))
    }

    /// Post the rendered results of a poll to the poll channel.
    pub async fn publish_results(&self, poll_id: i64) -> Result<PollResults, CoreError> {
        let poll = polls::get_poll(&self.db, poll_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let results = self.tally(poll).await?;
        self.sink
            .send_channel(self.settings.poll_channel_id, &render::results(&results))
            .await?;
        Ok(results)
    }

    /// Results of a finished (closed or expired) poll, without publishing them.
    pub async fn results(&self, title: &str) -> Result<PollResults, CoreError> {
        let poll = self.find_by_title(title).await?;
        match poll.state_at(self.clock.now()) {
            PollState::Draft | PollState::Active => Err(CoreError::NotFinished),
            PollState::Expired | PollState::Closed => self.tally(poll).await,
        }
    }

    pub async fn list_polls(&self) -> Result<Vec<PollSummary>, CoreError> {
        let now = self.clock.now();
        Ok(polls::list_polls(&self.db)
            .await?
            .into_iter()
            .map(|poll| PollSummary {
                state: poll.state_at(now),
                poll,
            })
            .collect())
    }

    /// Soft delete; the title becomes available again.
    pub async fn delete(&self, title: &str) -> Result<Poll, CoreError> {
        let poll = self.find_by_title(title).await?;
        if !polls::soft_delete_poll(&self.db, poll.id, self.clock.now()).await? {
            return Err(CoreError::NotFound);
        }
        tracing::info!("poll {} '{}' deleted", poll.id, poll.title);
        Ok(poll)
    }

    /// Register the periodic close sweep on `scheduler`.
    pub fn spawn_sweeper(self: &Arc<Self>, scheduler: &mut Scheduler, period: Duration) {
        let engine = self.clone();
        scheduler.spawn("poll_sweep", period, move || {
            let engine = engine.clone();
            async move {
                if let Err(err) = engine.sweep().await {
                    tracing::warn!("poll sweep failed: {}", err);
                }
            }
        });
    }
}
