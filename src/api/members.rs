use axum::{Form, Json, debug_handler, extract::State};
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppResult, SharedChallenge, member::Member};

use super::UsernameForm;

#[derive(Debug, Serialize)]
pub(crate) struct MemberView {
    message: &'static str,
    username: String,
    group_id: Option<Uuid>,
    owns_a_group: bool,
    score: u8,
    average_minutes_slept: Option<i64>,
    is_asleep: bool,
    snooze_count: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    last_sleep_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    last_awake_time: Option<OffsetDateTime>,
}

impl MemberView {
    fn new(member: Member, owns_a_group: bool) -> Self {
        MemberView {
            message: "user found",
            owns_a_group,
            is_asleep: member.is_asleep(),
            username: member.username,
            group_id: member.group_id,
            score: member.score,
            average_minutes_slept: member.avg_sleep_minutes,
            snooze_count: member.snooze_count,
            last_sleep_time: member.last_sleep_at,
            last_awake_time: member.last_wake_at,
        }
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_user(
    State(challenge): State<SharedChallenge>,
    Form(UsernameForm { username }): Form<UsernameForm>,
) -> AppResult<Json<Value>> {
    challenge.register(&username).await?;
    Ok(Json(json!({ "message": format!("User created: {username}") })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(challenge): State<SharedChallenge>,
    Form(UsernameForm { username }): Form<UsernameForm>,
) -> AppResult<Json<Value>> {
    let member = challenge.member(&username).await?;
    Ok(Json(json!({ "message": "user found", "username": member.username })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn user_data(
    State(challenge): State<SharedChallenge>,
    Form(UsernameForm { username }): Form<UsernameForm>,
) -> AppResult<Json<MemberView>> {
    let member = challenge.member(&username).await?;
    let owns_a_group = challenge.owns_group(&member).await?;
    Ok(Json(MemberView::new(member, owns_a_group)))
}

#[derive(Debug, Serialize)]
pub(crate) struct Users {
    users: Vec<MemberView>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn all_user_data(State(challenge): State<SharedChallenge>) -> AppResult<Json<Users>> {
    let owners = challenge.group_owners().await?;
    let users = challenge
        .members()
        .await?
        .into_iter()
        .map(|member| {
            let owns_a_group = member
                .group_id
                .and_then(|group_id| owners.get(&group_id))
                .is_some_and(|owner| *owner == member.username);
            MemberView::new(member, owns_a_group)
        })
        .collect();
    Ok(Json(Users { users }))
}
