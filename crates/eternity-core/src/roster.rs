use crate::clock::Clock;
use crate::directory::{DirectoryCache, DirectorySource};
use crate::error::CoreError;
use crate::notify::NotificationSink;
use crate::render;
use crate::schedule::Scheduler;
use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;

/// A channel message kept in sync with the cached member directory.
pub struct RosterBoard<S, N> {
    directory: Arc<DirectoryCache<S>>,
    sink: N,
    clock: Arc<dyn Clock>,
    channel_id: i64,
    message_id: i64,
    display_offset: FixedOffset,
}

impl<S: DirectorySource, N: NotificationSink> RosterBoard<S, N> {
    pub fn new(
        directory: Arc<DirectoryCache<S>>,
        sink: N,
        clock: Arc<dyn Clock>,
        channel_id: i64,
        message_id: i64,
        display_offset: FixedOffset,
    ) -> Self {
        Self {
            directory,
            sink,
            clock,
            channel_id,
            message_id,
            display_offset,
        }
    }

    pub fn render(&self) -> String {
        let members = self.directory.list_members();
        render::roster(
            self.directory.job_roles(),
            &self.directory.roles(),
            &members,
            self.clock.now(),
            self.display_offset,
        )
    }

    /// Re-render the board and edit the message in place.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let text = self.render();
        self.sink
            .edit_message(self.channel_id, self.message_id, &text)
            .await?;
        tracing::debug!(
            "roster: board {}/{} updated",
            self.channel_id,
            self.message_id
        );
        Ok(())
    }

    pub fn spawn(self: &Arc<Self>, scheduler: &mut Scheduler, period: Duration) {
        let board = self.clone();
        scheduler.spawn("roster_board", period, move || {
            let board = board.clone();
            async move {
                if let Err(err) = board.refresh().await {
                    tracing::warn!("roster: board update failed: {}", err);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::default_job_roles;
    use crate::testing::{FakeDirectory, ManualClock, RecordingSink};
    use chrono::{TimeZone, Utc};

    async fn board(
        directory: &FakeDirectory,
        sink: &RecordingSink,
    ) -> RosterBoard<FakeDirectory, RecordingSink> {
        let cache = Arc::new(DirectoryCache::new(directory.clone(), 1, default_job_roles()));
        cache.refresh_all().await.unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        RosterBoard::new(
            cache,
            sink.clone(),
            Arc::new(clock),
            300,
            301,
            FixedOffset::east_opt(9 * 3600).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_refresh_edits_configured_message() {
        let directory = FakeDirectory::with_job_roles();
        directory.add_member(1, "Lv120 바람", &[8]);
        directory.add_member(2, "Lv130 구름", &[1]);
        directory.add_member(3, "손님", &[1]);
        directory.add_member(4, "Lv140 하늘", &[2, 8]);
        let sink = RecordingSink::new();
        let board = board(&directory, &sink).await;

        board.refresh().await.unwrap();
        let edits = sink.edits();
        assert_eq!(edits.len(), 1);
        let (channel, message, text) = &edits[0];
        assert_eq!((*channel, *message), (300, 301));
        assert!(text.contains("(as of 2025-03-01 09:00:00)"));
        let knight = text.find("**다크나이트** (1): <@2>").unwrap();
        let bishop = text.find("**비숍** (2): <@1> <@4>").unwrap();
        let hero = text.find("**히어로** (1): <@4>").unwrap();
        assert!(knight < hero && hero < bishop);
        assert!(text.contains("**[Total: 3]**"));
    }

    #[tokio::test]
    async fn test_refresh_reports_sink_failure() {
        let directory = FakeDirectory::with_job_roles();
        let sink = RecordingSink::new();
        let board = board(&directory, &sink).await;
        sink.set_failing(true);
        assert!(matches!(
            board.refresh().await,
            Err(CoreError::UpstreamUnavailable(_))
        ));
    }
}
