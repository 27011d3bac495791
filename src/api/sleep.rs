use axum::{Form, Json, debug_handler, extract::State};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{AppResult, SharedChallenge};

use super::UsernameForm;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn to_sleep(
    State(challenge): State<SharedChallenge>,
    Form(UsernameForm { username }): Form<UsernameForm>,
) -> AppResult<Json<Value>> {
    let event = challenge.sleep(&username, OffsetDateTime::now_utc()).await?;
    Ok(Json(json!({ "message": event.payload.message })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn to_awake(
    State(challenge): State<SharedChallenge>,
    Form(UsernameForm { username }): Form<UsernameForm>,
) -> AppResult<Json<Value>> {
    let event = challenge.wake(&username, OffsetDateTime::now_utc()).await?;
    Ok(Json(json!({
        "message": event.payload.message,
        "score": event.payload.score,
        "days_remaining": event.payload.days_remaining,
        "dissolved": event.payload.dissolved,
    })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn to_snooze(
    State(challenge): State<SharedChallenge>,
    Form(UsernameForm { username }): Form<UsernameForm>,
) -> AppResult<Json<Value>> {
    let event = challenge.snooze(&username, OffsetDateTime::now_utc()).await?;
    Ok(Json(json!({ "message": event.payload.message })))
}
