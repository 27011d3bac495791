use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{SnuzError, SnuzResult},
    scoring::{self, MAX_SCORE, Night, Scored},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepState {
    Awake,
    Asleep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub username: String,
    pub group_id: Option<Uuid>,
    pub sleep_state: SleepState,
    pub last_sleep_at: Option<OffsetDateTime>,
    pub last_wake_at: Option<OffsetDateTime>,
    pub snooze_count: u32,
    pub avg_sleep_minutes: Option<i64>,
    pub score: u8,
}

/// The window a wake is judged against, taken from the member's group.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub sleep_at: OffsetDateTime,
    pub wake_at: OffsetDateTime,
}

impl Member {
    pub fn new(username: impl Into<String>) -> Self {
        Member {
            username: username.into(),
            group_id: None,
            sleep_state: SleepState::Awake,
            last_sleep_at: None,
            last_wake_at: None,
            snooze_count: 0,
            avg_sleep_minutes: None,
            score: MAX_SCORE,
        }
    }

    pub fn is_asleep(&self) -> bool {
        self.sleep_state == SleepState::Asleep
    }

    fn grouped(&self) -> SnuzResult<Uuid> {
        self.group_id
            .ok_or_else(|| SnuzError::InvalidTransition(format!("{} is not in a group", self.username)))
    }

    pub fn fall_asleep(&mut self, now: OffsetDateTime) -> SnuzResult<()> {
        self.grouped()?;
        if self.is_asleep() {
            return Err(SnuzError::InvalidTransition(format!("{} is already asleep", self.username)));
        }

        self.sleep_state = SleepState::Asleep;
        self.last_sleep_at = Some(now);
        self.last_wake_at = None;
        self.snooze_count = 0;
        Ok(())
    }

    /// Returns the snooze count after this one.
    pub fn snooze(&mut self) -> SnuzResult<u32> {
        if !self.is_asleep() {
            return Err(SnuzError::InvalidTransition(format!("{} is not asleep", self.username)));
        }

        self.snooze_count += 1;
        Ok(self.snooze_count)
    }

    pub fn wake(&mut self, now: OffsetDateTime, target: Target) -> SnuzResult<Scored> {
        self.grouped()?;
        let (true, Some(slept_at)) = (self.is_asleep(), self.last_sleep_at) else {
            return Err(SnuzError::InvalidTransition(format!("{} is not asleep", self.username)));
        };

        let scored = scoring::score(
            &Night {
                slept_at,
                woke_at: now,
                target_sleep_at: target.sleep_at,
                target_wake_at: target.wake_at,
            },
            self.avg_sleep_minutes,
            self.score,
            self.snooze_count,
        );

        self.sleep_state = SleepState::Awake;
        self.last_wake_at = Some(now);
        self.avg_sleep_minutes = Some(scored.avg_sleep_minutes);
        self.score = scored.score;
        self.snooze_count = 0;
        Ok(scored)
    }
}

/// Usernames are plain alphanumerics.
pub fn validate_username(username: &str) -> SnuzResult<()> {
    if username.is_empty() || !username.chars().all(char::is_alphanumeric) {
        return Err(SnuzError::Validation(
            "username can only contain letters and numbers".to_owned(),
        ));
    }
    Ok(())
}
