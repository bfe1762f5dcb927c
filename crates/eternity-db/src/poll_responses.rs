use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use eternity_models::PollResponse;

#[derive(Debug, Clone, sqlx::FromRow)]
struct PollResponseRow {
    id: i64,
    poll_id: i64,
    voter_id: i64,
    choice: String,
    created_at: DateTime<Utc>,
}

impl From<PollResponseRow> for PollResponse {
    fn from(row: PollResponseRow) -> Self {
        PollResponse {
            id: row.id,
            poll_id: row.poll_id,
            voter_id: row.voter_id,
            choice: row.choice,
            created_at: row.created_at,
        }
    }
}

/// Record a voter's single response. A second response for the same poll is `DbError::Conflict`.
pub async fn create_response(
    pool: &DbPool,
    poll_id: i64,
    voter_id: i64,
    choice: &str,
    created_at: DateTime<Utc>,
) -> Result<PollResponse, DbError> {
    let row = sqlx::query_as::<_, PollResponseRow>(
        "INSERT INTO poll_responses (poll_id, voter_id, choice, created_at)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id, poll_id, voter_id, choice, created_at",
    )
    .bind(poll_id)
    .bind(voter_id)
    .bind(choice)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_insert)?;
    Ok(row.into())
}

/// All responses for a poll in arrival order.
pub async fn get_poll_responses(
    pool: &DbPool,
    poll_id: i64,
) -> Result<Vec<PollResponse>, DbError> {
    let rows = sqlx::query_as::<_, PollResponseRow>(
        "SELECT id, poll_id, voter_id, choice, created_at
         FROM poll_responses
         WHERE poll_id = ?1
         ORDER BY id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_responded_voter_ids(pool: &DbPool, poll_id: i64) -> Result<Vec<i64>, DbError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT voter_id FROM poll_responses WHERE poll_id = ?1 ORDER BY id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polls::create_poll;
    use crate::test_pool;
    use chrono::TimeZone;
    use eternity_models::{NewPoll, Selector};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    async fn seeded_poll(pool: &DbPool, title: &str) -> i64 {
        let poll = NewPoll {
            title: title.to_string(),
            identifiable: false,
            targets: vec![Selector::All],
            choices: vec!["A".into(), "B".into()],
            duration_hours: 1,
        };
        create_poll(pool, &poll, now()).await.unwrap().id
    }

    #[tokio::test]
    async fn test_create_and_list_responses() {
        let pool = test_pool().await;
        let poll_id = seeded_poll(&pool, "p").await;
        let created = create_response(&pool, poll_id, 42, "B", now()).await.unwrap();
        assert_eq!(created.poll_id, poll_id);
        assert_eq!(created.voter_id, 42);
        assert_eq!(created.choice, "B");

        assert_eq!(get_poll_responses(&pool, poll_id).await.unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn test_second_response_conflicts() {
        let pool = test_pool().await;
        let poll_id = seeded_poll(&pool, "p").await;
        create_response(&pool, poll_id, 42, "A", now()).await.unwrap();
        let err = create_response(&pool, poll_id, 42, "B", now()).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict));

        let stored = get_poll_responses(&pool, poll_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].choice, "A");
    }

    #[tokio::test]
    async fn test_same_voter_may_answer_different_polls() {
        let pool = test_pool().await;
        let first = seeded_poll(&pool, "first").await;
        let second = seeded_poll(&pool, "second").await;
        create_response(&pool, first, 42, "A", now()).await.unwrap();
        create_response(&pool, second, 42, "B", now()).await.unwrap();
        assert_eq!(get_poll_responses(&pool, first).await.unwrap().len(), 1);
        assert_eq!(get_poll_responses(&pool, second).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_responses_require_existing_poll() {
        let pool = test_pool().await;
        let err = create_response(&pool, 999, 42, "A", now()).await.unwrap_err();
        assert!(matches!(err, DbError::Sqlx(_)));
    }

    #[tokio::test]
    async fn test_responded_voter_ids_in_arrival_order() {
        let pool = test_pool().await;
        let poll_id = seeded_poll(&pool, "p").await;
        for voter in [30, 10, 20] {
            create_response(&pool, poll_id, voter, "A", now()).await.unwrap();
        }
        assert_eq!(
            get_responded_voter_ids(&pool, poll_id).await.unwrap(),
            vec![30, 10, 20]
        );
    }
}
