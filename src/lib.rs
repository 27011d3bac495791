pub mod api;
pub mod challenge;
pub mod config;
pub mod error;
pub mod event;
pub mod group;
pub mod member;
pub mod narrator;
pub mod res;
pub mod rooms;
pub mod scoring;
pub mod store;

use std::sync::Arc;

use axum::{
    Json,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use challenge::Challenge;
use config::Config;
use error::SnuzError;
use narrator::Narrator;
use store::{AnyStore, MemoryStore, SqliteStore};

pub type SharedChallenge = Arc<Challenge<AnyStore>>;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub challenge: SharedChallenge,
    pub config: Arc<Config>,
}

impl AppState {
    /// Opens the store, picks the narrator and brings back the rooms of
    /// groups that outlived the last run.
    pub async fn from_config(config: Config) -> anyhow::Result<AppState> {
        let store = match &config.database_url {
            Some(url) => AnyStore::Sqlite(SqliteStore::connect(url, 16).await?),
            None => {
                tracing::warn!("DATABASE_URL not set, keeping everything in memory");
                AnyStore::Memory(MemoryStore::new())
            }
        };
        let narrator = match &config.narrator_url {
            Some(url) => Narrator::remote(url.clone(), config.narrator_timeout)?,
            None => Narrator::canned(),
        };

        let challenge = Challenge::new(store, narrator);
        let restored = challenge.restore_rooms().await?;
        tracing::info!(restored, "rooms restored");

        Ok(AppState {
            challenge: Arc::new(challenge),
            config: Arc::new(config),
        })
    }
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub SnuzError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SnuzError::NotFound(_) | SnuzError::UnknownRoom(_) => StatusCode::NOT_FOUND,
            SnuzError::InvalidTransition(_) | SnuzError::MembershipConflict(_) => StatusCode::CONFLICT,
            SnuzError::Validation(_) => StatusCode::BAD_REQUEST,
            SnuzError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(err = ?self.0, "request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<SnuzError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
