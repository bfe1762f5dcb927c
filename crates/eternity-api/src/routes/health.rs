use axum::{extract::State, Json};
use eternity_core::{DirectorySource, NotificationSink};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health<S, N>(State(state): State<AppState<S, N>>) -> Json<Value>
where
    S: DirectorySource,
    N: NotificationSink,
{
    let directory = state.engine.directory();
    Json(json!({
        "status": "ok",
        "members": directory.members().len(),
        "roles": directory.roles().len(),
    }))
}
