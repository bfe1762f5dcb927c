use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use eternity_models::{CloseReason, NewPoll, Poll, Selector};

const POLL_COLUMNS: &str = "id, title, identifiable, targets, choices, description, duration_hours, started_at, closed, close_reason, created_at";

/// Row shape of `polls`; list columns are JSON text and only decoded here.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PollRow {
    id: i64,
    title: String,
    identifiable: bool,
    targets: String,
    choices: String,
    description: String,
    duration_hours: i64,
    started_at: Option<DateTime<Utc>>,
    closed: bool,
    close_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl PollRow {
    fn into_poll(self) -> Result<Poll, DbError> {
        let targets: Vec<Selector> = serde_json::from_str(&self.targets)?;
        let choices: Vec<String> = serde_json::from_str(&self.choices)?;
        let closed_by = self
            .close_reason
            .map(|raw| {
                CloseReason::parse(&raw).ok_or(DbError::InvalidColumn {
                    column: "close_reason",
                    value: raw,
                })
            })
            .transpose()?;
        Ok(Poll {
            id: self.id,
            title: self.title,
            identifiable: self.identifiable,
            targets,
            choices,
            description: self.description,
            duration_hours: self.duration_hours,
            started_at: self.started_at,
            closed: self.closed,
            closed_by,
            created_at: self.created_at,
        })
    }
}

fn into_polls(rows: Vec<PollRow>) -> Result<Vec<Poll>, DbError> {
    rows.into_iter().map(PollRow::into_poll).collect()
}

/// Insert a draft poll. Fails with `DbError::Conflict` when a live poll already has the title.
pub async fn create_poll(
    pool: &DbPool,
    poll: &NewPoll,
    created_at: DateTime<Utc>,
) -> Result<Poll, DbError> {
    let targets = serde_json::to_string(&poll.targets)?;
    let choices = serde_json::to_string(&poll.choices)?;
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "INSERT INTO polls (title, identifiable, targets, choices, duration_hours, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING {POLL_COLUMNS}"
    ))
    .bind(&poll.title)
    .bind(poll.identifiable)
    .bind(targets)
    .bind(choices)
    .bind(poll.duration_hours)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_insert)?;
    row.into_poll()
}

pub async fn get_poll(pool: &DbPool, id: i64) -> Result<Option<Poll>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE id = ?1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(PollRow::into_poll).transpose()
}

pub async fn get_poll_by_title(pool: &DbPool, title: &str) -> Result<Option<Poll>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE title = ?1 AND deleted_at IS NULL"
    ))
    .bind(title)
    .fetch_optional(pool)
    .await?;
    row.map(PollRow::into_poll).transpose()
}

pub async fn list_polls(pool: &DbPool) -> Result<Vec<Poll>, DbError> {
    let rows = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE deleted_at IS NULL ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    into_polls(rows)
}

/// Started polls the sweep still has work for: not closed yet, or closed
/// with their results not posted.
pub async fn list_open_polls(pool: &DbPool) -> Result<Vec<Poll>, DbError> {
    let rows = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls
         WHERE deleted_at IS NULL
           AND started_at IS NOT NULL
           AND (closed = 0 OR results_published_at IS NULL)
         ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    into_polls(rows)
}

/// Update the description of a draft. Returns false once the poll has started.
pub async fn set_description(pool: &DbPool, id: i64, description: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls SET description = ?2
         WHERE id = ?1 AND started_at IS NULL AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(description)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Stamp `started_at`. Only the first caller wins; later calls return false.
pub async fn mark_started(
    pool: &DbPool,
    id: i64,
    started_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls SET started_at = ?2
         WHERE id = ?1 AND started_at IS NULL AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(started_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Flip an open poll to closed. Returns false if it was already closed (or never started).
pub async fn mark_closed(pool: &DbPool, id: i64, reason: CloseReason) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls SET closed = 1, close_reason = ?2
         WHERE id = ?1 AND closed = 0 AND started_at IS NOT NULL",
    )
    .bind(id)
    .bind(reason.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Claim the right to post a closed poll's results. Only one caller gets
/// true until the claim is released.
pub async fn claim_results(
    pool: &DbPool,
    id: i64,
    published_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls SET results_published_at = ?2
         WHERE id = ?1 AND closed = 1 AND results_published_at IS NULL",
    )
    .bind(id)
    .bind(published_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Give a claim back after the results could not be posted.
pub async fn release_results(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE polls SET results_published_at = NULL WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn soft_delete_poll(
    pool: &DbPool,
    id: i64,
    deleted_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE polls SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(deleted_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn new_poll(title: &str) -> NewPoll {
        NewPoll {
            title: title.to_string(),
            identifiable: true,
            targets: vec![
                Selector::Role("비숍".into()),
                Selector::User("바람".into()),
            ],
            choices: vec!["네".into(), "아니오".into(), "모르겠음".into()],
            duration_hours: 24,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_poll() {
        let pool = test_pool().await;
        let created = create_poll(&pool, &new_poll("raid day"), now()).await.unwrap();
        assert_eq!(created.title, "raid day");
        assert!(created.identifiable);
        assert_eq!(created.duration_hours, 24);
        assert!(created.started_at.is_none());
        assert!(!created.closed);
        assert_eq!(created.description, "");
        assert_eq!(created.created_at, now());

        let fetched = get_poll(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(
            fetched.targets,
            vec![Selector::Role("비숍".into()), Selector::User("바람".into())]
        );
        assert_eq!(fetched.choices, vec!["네", "아니오", "모르겠음"]);
    }

    #[tokio::test]
    async fn test_get_poll_by_title() {
        let pool = test_pool().await;
        let created = create_poll(&pool, &new_poll("by title"), now()).await.unwrap();
        let fetched = get_poll_by_title(&pool, "by title").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert!(get_poll_by_title(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_title_conflicts() {
        let pool = test_pool().await;
        create_poll(&pool, &new_poll("dup"), now()).await.unwrap();
        let err = create_poll(&pool, &new_poll("dup"), now()).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_poll_and_frees_title() {
        let pool = test_pool().await;
        let created = create_poll(&pool, &new_poll("gone"), now()).await.unwrap();
        assert!(soft_delete_poll(&pool, created.id, now()).await.unwrap());
        assert!(!soft_delete_poll(&pool, created.id, now()).await.unwrap());
        assert!(get_poll(&pool, created.id).await.unwrap().is_none());
        assert!(list_polls(&pool).await.unwrap().is_empty());

        let again = create_poll(&pool, &new_poll("gone"), now()).await.unwrap();
        assert_ne!(again.id, created.id);
    }

    #[tokio::test]
    async fn test_description_only_editable_before_start() {
        let pool = test_pool().await;
        let created = create_poll(&pool, &new_poll("desc"), now()).await.unwrap();
        assert!(set_description(&pool, created.id, "line one\nline two").await.unwrap());
        assert!(mark_started(&pool, created.id, now()).await.unwrap());
        assert!(!set_description(&pool, created.id, "too late").await.unwrap());

        let fetched = get_poll(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.description, "line one\nline two");
        assert_eq!(fetched.started_at, Some(now()));
    }

    #[tokio::test]
    async fn test_mark_started_only_once() {
        let pool = test_pool().await;
        let created = create_poll(&pool, &new_poll("start"), now()).await.unwrap();
        assert!(mark_started(&pool, created.id, now()).await.unwrap());
        assert!(!mark_started(&pool, created.id, now() + Duration::hours(1))
            .await
            .unwrap());
        let fetched = get_poll(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.started_at, Some(now()));
    }

    #[tokio::test]
    async fn test_mark_closed_requires_started_and_is_terminal() {
        let pool = test_pool().await;
        let created = create_poll(&pool, &new_poll("close"), now()).await.unwrap();
        assert!(!mark_closed(&pool, created.id, CloseReason::Timeout).await.unwrap());
        mark_started(&pool, created.id, now()).await.unwrap();
        assert!(mark_closed(&pool, created.id, CloseReason::Quorum).await.unwrap());
        assert!(!mark_closed(&pool, created.id, CloseReason::Timeout).await.unwrap());
        let fetched = get_poll(&pool, created.id).await.unwrap().unwrap();
        assert!(fetched.closed);
        assert_eq!(fetched.closed_by, Some(CloseReason::Quorum));
    }

    #[tokio::test]
    async fn test_list_open_polls_returns_started_polls_with_pending_work() {
        let pool = test_pool().await;
        let draft = create_poll(&pool, &new_poll("draft"), now()).await.unwrap();
        let open = create_poll(&pool, &new_poll("open"), now()).await.unwrap();
        let closed = create_poll(&pool, &new_poll("closed"), now()).await.unwrap();
        let deleted = create_poll(&pool, &new_poll("deleted"), now()).await.unwrap();
        for id in [open.id, closed.id, deleted.id] {
            mark_started(&pool, id, now()).await.unwrap();
        }
        mark_closed(&pool, closed.id, CloseReason::Timeout).await.unwrap();
        claim_results(&pool, closed.id, now()).await.unwrap();
        soft_delete_poll(&pool, deleted.id, now()).await.unwrap();

        let ids: Vec<i64> = list_open_polls(&pool)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![open.id]);

        let all: Vec<i64> = list_polls(&pool).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(all, vec![draft.id, open.id, closed.id]);
    }

    #[tokio::test]
    async fn test_results_claim_is_exclusive_until_released() {
        let pool = test_pool().await;
        let poll = create_poll(&pool, &new_poll("claim"), now()).await.unwrap();
        mark_started(&pool, poll.id, now()).await.unwrap();
        assert!(!claim_results(&pool, poll.id, now()).await.unwrap());

        mark_closed(&pool, poll.id, CloseReason::Timeout).await.unwrap();
        let pending: Vec<i64> = list_open_polls(&pool).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(pending, vec![poll.id]);

        assert!(claim_results(&pool, poll.id, now()).await.unwrap());
        assert!(!claim_results(&pool, poll.id, now()).await.unwrap());
        assert!(list_open_polls(&pool).await.unwrap().is_empty());

        release_results(&pool, poll.id).await.unwrap();
        assert_eq!(list_open_polls(&pool).await.unwrap().len(), 1);
        assert!(claim_results(&pool, poll.id, now() + Duration::minutes(1)).await.unwrap());
    }
}
