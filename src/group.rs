//! Group schedule and the daily rollover.

use time::{
    Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
    format_description::well_known::Iso8601, macros::format_description,
};
use uuid::Uuid;

use crate::{
    error::{SnuzError, SnuzResult},
    member::Target,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub owner: String,
    pub to_sleep_at: OffsetDateTime,
    pub to_wake_at: OffsetDateTime,
    pub duration_days: u32,
    pub days_remaining: u32,
    pub start_date: Date,
}

/// What a completed cycle did to the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    Advanced { days_remaining: u32 },
    Dissolved,
}

fn out_of_range() -> SnuzError {
    SnuzError::Validation("schedule runs past the last supported date".to_owned())
}

/// Anchors the sleep and wake times of day on `date`. A wake time that is
/// earlier in the day than the sleep time lands on the following day.
pub fn window_on(date: Date, sleep: Time, wake: Time) -> SnuzResult<(OffsetDateTime, OffsetDateTime)> {
    let sleep_at = PrimitiveDateTime::new(date, sleep).assume_utc();
    let wake_date = if wake >= sleep { Some(date) } else { date.next_day() };
    let wake_at = PrimitiveDateTime::new(wake_date.ok_or_else(out_of_range)?, wake).assume_utc();
    Ok((sleep_at, wake_at))
}

impl Group {
    pub fn new(
        owner: String,
        start_date: Date,
        sleep: Time,
        wake: Time,
        duration_days: u32,
    ) -> SnuzResult<Self> {
        // the last day's wake may land one day past the final cycle
        start_date
            .checked_add(Duration::days(i64::from(duration_days)))
            .ok_or_else(out_of_range)?;
        let (to_sleep_at, to_wake_at) = window_on(start_date, sleep, wake)?;
        Ok(Group {
            id: Uuid::now_v7(),
            owner,
            to_sleep_at,
            to_wake_at,
            duration_days,
            days_remaining: duration_days,
            start_date,
        })
    }

    pub fn target(&self) -> Target {
        Target {
            sleep_at: self.to_sleep_at,
            wake_at: self.to_wake_at,
        }
    }

    /// Closes the current cycle. Members who never slept do not hold the
    /// schedule back. The group is left untouched on error.
    pub fn roll_over(&mut self) -> SnuzResult<Rollover> {
        let days_remaining = self.days_remaining.saturating_sub(1);
        if days_remaining == 0 {
            self.days_remaining = 0;
            return Ok(Rollover::Dissolved);
        }

        let elapsed = self.duration_days - days_remaining;
        let date = self
            .start_date
            .checked_add(Duration::days(i64::from(elapsed)))
            .ok_or_else(out_of_range)?;
        let (to_sleep_at, to_wake_at) = window_on(date, self.to_sleep_at.time(), self.to_wake_at.time())?;
        self.to_sleep_at = to_sleep_at;
        self.to_wake_at = to_wake_at;
        self.days_remaining = days_remaining;

        Ok(Rollover::Advanced { days_remaining })
    }
}

/// Parses an ISO 8601 timestamp. Timestamps without an offset are UTC.
pub fn parse_instant(field: &str, raw: &str) -> SnuzResult<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(at) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Ok(at.to_offset(UtcOffset::UTC));
    }
    PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|err| SnuzError::Validation(format!("{field} is not a valid ISO 8601 timestamp: {err}")))
}

/// Accepts a bare `YYYY-MM-DD` or a full timestamp, whose UTC date is used.
pub fn parse_date(field: &str, raw: &str) -> SnuzResult<Date> {
    let raw = raw.trim();
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Ok(date);
    }
    parse_instant(field, raw).map(OffsetDateTime::date)
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime, time};

    use super::*;

    #[test]
    fn same_day_window() {
        let (sleep_at, wake_at) = window_on(date!(2026-10-20), time!(13:00), time!(14:30)).unwrap();
        assert_eq!(sleep_at, datetime!(2026-10-20 13:00 UTC));
        assert_eq!(wake_at, datetime!(2026-10-20 14:30 UTC));
    }

    #[test]
    fn overnight_window_wakes_next_day() {
        let (sleep_at, wake_at) = window_on(date!(2026-10-31), time!(23:00), time!(07:00)).unwrap();
        assert_eq!(sleep_at, datetime!(2026-10-31 23:00 UTC));
        assert_eq!(wake_at, datetime!(2026-11-01 07:00 UTC));
    }

    #[test]
    fn rollover_advances_from_start_date() {
        let mut group = Group::new("ada".to_owned(), date!(2026-10-20), time!(23:00), time!(07:00), 3).unwrap();
        assert_eq!(group.days_remaining, 3);

        assert_eq!(group.roll_over().unwrap(), Rollover::Advanced { days_remaining: 2 });
        assert_eq!(group.to_sleep_at, datetime!(2026-10-21 23:00 UTC));
        assert_eq!(group.to_wake_at, datetime!(2026-10-22 07:00 UTC));

        assert_eq!(group.roll_over().unwrap(), Rollover::Advanced { days_remaining: 1 });
        assert_eq!(group.to_sleep_at, datetime!(2026-10-22 23:00 UTC));
        assert_eq!(group.to_wake_at, datetime!(2026-10-23 07:00 UTC));

        assert_eq!(group.roll_over().unwrap(), Rollover::Dissolved);
        assert_eq!(group.days_remaining, 0);
    }

    #[test]
    fn single_day_group_dissolves_at_once() {
        let mut group = Group::new("ada".to_owned(), date!(2026-10-20), time!(22:00), time!(06:00), 1).unwrap();
        let before = group.target().sleep_at;
        assert_eq!(group.roll_over().unwrap(), Rollover::Dissolved);
        assert_eq!(group.to_sleep_at, before);
    }

    #[test]
    fn schedules_past_the_calendar_end_are_rejected() {
        let overnight = Group::new("ada".to_owned(), date!(9999-12-31), time!(23:00), time!(07:00), 1);
        assert!(matches!(overnight, Err(SnuzError::Validation(_))));

        let too_long = Group::new("ada".to_owned(), date!(2026-10-20), time!(22:00), time!(06:00), u32::MAX);
        assert!(matches!(too_long, Err(SnuzError::Validation(_))));

        assert!(window_on(date!(9999-12-31), time!(23:00), time!(07:00)).is_err());
        assert!(window_on(date!(9999-12-31), time!(07:00), time!(23:00)).is_ok());

        let mut last = Group::new("ada".to_owned(), date!(9999-12-29), time!(23:00), time!(07:00), 2).unwrap();
        assert_eq!(last.roll_over().unwrap(), Rollover::Advanced { days_remaining: 1 });
        assert_eq!(last.to_wake_at, datetime!(9999-12-31 07:00 UTC));
        assert_eq!(last.roll_over().unwrap(), Rollover::Dissolved);
    }

    #[test]
    fn failed_rollover_leaves_the_group_alone() {
        let mut group = Group::new("ada".to_owned(), date!(2026-10-20), time!(23:00), time!(07:00), 3).unwrap();
        // a schedule that could only come from a corrupted row
        group.start_date = date!(9999-12-30);
        let before = group.clone();
        assert!(matches!(group.roll_over(), Err(SnuzError::Validation(_))));
        assert_eq!(group, before);
    }

    #[test]
    fn instants_normalize_to_utc() {
        let at = parse_instant("sleep", "2026-10-20T23:00:00+02:00").unwrap();
        assert_eq!(at, datetime!(2026-10-20 21:00 UTC));
        assert_eq!(at.offset(), UtcOffset::UTC);

        let naive = parse_instant("sleep", "2026-10-20T23:00:00").unwrap();
        assert_eq!(naive, datetime!(2026-10-20 23:00 UTC));

        assert!(matches!(parse_instant("sleep", "tonight"), Err(SnuzError::Validation(_))));
    }

    #[test]
    fn dates_accept_bare_and_timestamp_forms() {
        assert_eq!(parse_date("start", "2026-10-20").unwrap(), date!(2026-10-20));
        assert_eq!(parse_date("start", "2026-10-20T01:00:00+03:00").unwrap(), date!(2026-10-19));
        assert!(parse_date("start", "20/10/2026").is_err());
    }
}
