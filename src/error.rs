use thiserror::Error;
use uuid::Uuid;

pub type SnuzResult<T> = Result<T, SnuzError>;

/// Everything a core operation can fail with. Each variant aborts the
/// operation before anything is committed.
#[derive(Error, Debug)]
pub enum SnuzError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{0} is already a member of another group")]
    MembershipConflict(String),
    #[error("no room for group {0}")]
    UnknownRoom(Uuid),
    #[error("storage failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl SnuzError {
    pub(crate) fn member_not_found(username: &str) -> Self {
        Self::NotFound(format!("member {username}"))
    }

    pub(crate) fn group_not_found(group_id: Uuid) -> Self {
        Self::NotFound(format!("group {group_id}"))
    }
}

impl From<sqlx::Error> for SnuzError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.into())
    }
}

/// A single connection refused an event. Never escalated past the room.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    #[error("connection closed")]
    Closed,
    #[error("connection queue full")]
    Saturated,
}
