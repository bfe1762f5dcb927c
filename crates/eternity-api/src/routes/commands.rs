use axum::{extract::State, Json};
use eternity_core::{DirectorySource, NotificationSink};
use eternity_util::chunk::{split_message, MESSAGE_LIMIT};
use serde::{Deserialize, Serialize};

use crate::commands::{execute, Inbound};
use crate::error::ApiError;
use crate::middleware::Relay;
use crate::AppState;

/// Snowflakes travel as strings, the way the chat gateway sends them.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub author_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub reply: Option<String>,
    /// The reply split into postable messages.
    pub chunks: Vec<String>,
}

fn parse_id(field: &str, raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("{field} must be a numeric id")))
}

pub async fn relay_command<S, N>(
    State(state): State<AppState<S, N>>,
    _relay: Relay,
    Json(body): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError>
where
    S: DirectorySource,
    N: NotificationSink,
{
    let message = Inbound {
        author_id: parse_id("author_id", &body.author_id)?,
        channel_id: body
            .channel_id
            .as_deref()
            .map(|raw| parse_id("channel_id", raw))
            .transpose()?,
        content: body.content,
    };

    let reply = execute(&state.engine, &message).await;
    let chunks = reply
        .as_deref()
        .map(|text| split_message(text, MESSAGE_LIMIT))
        .unwrap_or_default();
    Ok(Json(CommandResponse { reply, chunks }))
}
