use axum::{Form, Json, debug_handler, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use time::{OffsetDateTime, Time};

use crate::{AppResult, SharedChallenge, challenge::NewGroup};

use super::UsernameForm;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateGroupData {
    owner_username: String,
    #[serde(default)]
    group_members: Vec<String>,
    to_sleep_time: String,
    to_wake_up_time: String,
    duration_days: i64,
    start_date: String,
}

impl From<CreateGroupData> for NewGroup {
    fn from(data: CreateGroupData) -> Self {
        NewGroup {
            owner: data.owner_username,
            members: data.group_members,
            to_sleep_at: data.to_sleep_time,
            to_wake_at: data.to_wake_up_time,
            duration_days: data.duration_days,
            start_date: data.start_date,
        }
    }
}

fn clock(t: Time) -> String {
    format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_group(
    State(challenge): State<SharedChallenge>,
    Json(data): Json<CreateGroupData>,
) -> AppResult<Json<Value>> {
    let group = challenge.create_group(data.into(), OffsetDateTime::now_utc()).await?;
    Ok(Json(json!({
        "message": "Group created successfully",
        "group_id": group.id,
    })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn my_group(
    State(challenge): State<SharedChallenge>,
    Form(UsernameForm { username }): Form<UsernameForm>,
) -> AppResult<Json<Value>> {
    let Some(view) = challenge.group_of(&username).await? else {
        return Ok(Json(json!({
            "message": format!("{username} is not in a group"),
            "in_group": false,
        })));
    };

    let group = view.group;
    Ok(Json(json!({
        "in_group": true,
        "group_id": group.id,
        "owner_username": group.owner,
        "group_members": view.members,
        "to_sleep_time": clock(group.to_sleep_at.time()),
        "to_wake_up_time": clock(group.to_wake_at.time()),
        "duration_days": group.duration_days,
        "days_remaining": group.days_remaining,
        "start_date": group.start_date.to_string(),
    })))
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use time::Duration;

    use super::*;
    use crate::{AppState, api::members, config::Config, error::SnuzError};

    fn form(username: &str) -> Form<UsernameForm> {
        Form(UsernameForm {
            username: username.to_owned(),
        })
    }

    fn tomorrow_night() -> (String, String, String) {
        let day = OffsetDateTime::now_utc().date() + Duration::days(1);
        (
            format!("{day}T23:15:00Z"),
            format!("{day}T07:45:00Z"),
            day.to_string(),
        )
    }

    #[tokio::test]
    async fn group_round_trip() {
        let state = AppState::from_config(Config::default()).await.unwrap();
        for name in ["ada", "bob"] {
            let _ = members::create_user(State(state.challenge.clone()), form(name)).await.unwrap();
        }

        let Json(alone) = my_group(State(state.challenge.clone()), form("ada")).await.unwrap();
        assert_eq!(alone["in_group"], false);

        let (sleep, wake, start) = tomorrow_night();
        let data = CreateGroupData {
            owner_username: "ada".to_owned(),
            group_members: vec!["bob".to_owned()],
            to_sleep_time: sleep,
            to_wake_up_time: wake,
            duration_days: 5,
            start_date: start.clone(),
        };
        create_group(State(state.challenge.clone()), Json(data)).await.unwrap();

        let Json(group) = my_group(State(state.challenge.clone()), form("bob")).await.unwrap();
        assert_eq!(group["owner_username"], "ada");
        assert_eq!(group["group_members"], json!(["ada", "bob"]));
        assert_eq!(group["to_sleep_time"], "23:15:00");
        assert_eq!(group["to_wake_up_time"], "07:45:00");
        assert_eq!(group["days_remaining"], 5);
        assert_eq!(group["start_date"], start);

        let Json(ada) = members::user_data(State(state.challenge.clone()), form("ada")).await.unwrap();
        assert_eq!(serde_json::to_value(&ada).unwrap()["owns_a_group"], true);

        let Json(users) = members::all_user_data(State(state.challenge.clone())).await.unwrap();
        let users = serde_json::to_value(&users).unwrap();
        assert_eq!(users["users"][0]["owns_a_group"], true);
        assert_eq!(users["users"][1]["username"], "bob");
        assert_eq!(users["users"][1]["owns_a_group"], false);
    }

    #[tokio::test]
    async fn errors_carry_their_status() {
        let state = AppState::from_config(Config::default()).await.unwrap();

        let err = members::login(State(state.challenge.clone()), form("ghost")).await.unwrap_err();
        assert!(matches!(err.0, SnuzError::NotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = members::create_user(State(state.challenge.clone()), form("not valid")).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let _ = members::create_user(State(state.challenge.clone()), form("ada")).await.unwrap();
        let err = members::create_user(State(state.challenge.clone()), form("ada")).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = crate::api::sleep::to_awake(State(state.challenge.clone()), form("ada")).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
