mod groups;
mod members;
mod sleep;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct UsernameForm {
    pub(crate) username: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(hello))
        .route("/create-user", post(members::create_user))
        .route("/login", post(members::login))
        .route("/get-user-data", post(members::user_data))
        .route("/all-user-data", get(members::all_user_data))
        .route("/to-sleep", post(sleep::to_sleep))
        .route("/to-awake", post(sleep::to_awake))
        .route("/to-snooze", post(sleep::to_snooze))
        .route("/create-group", post(groups::create_group))
        .route("/my-group", post(groups::my_group))
}

async fn hello() -> Json<Value> {
    Json(json!({ "message": "hello from server" }))
}
