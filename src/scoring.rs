//! Adherence scoring for a completed sleep.
//!
//! The score moves by a fifth of a point per unit of "summary", where the
//! summary adds up how far the night beat the member's running average and
//! how many 5-minute buckets the member was early to bed or late out of it.
//! Every snooze during the night costs one full point.

use time::{Duration, OffsetDateTime};

pub const MIN_SCORE: u8 = 0;
pub const MAX_SCORE: u8 = 100;

const BUCKET_SECONDS: i64 = 5 * 60;
const SUMMARY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct Night {
    pub slept_at: OffsetDateTime,
    pub woke_at: OffsetDateTime,
    pub target_sleep_at: OffsetDateTime,
    pub target_wake_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scored {
    pub minutes_slept: i64,
    pub avg_sleep_minutes: i64,
    pub sleep_delta: i64,
    pub target_sleep_offset: i64,
    pub target_wake_offset: i64,
    pub score: u8,
}

impl Scored {
    pub fn summary(&self) -> i64 {
        self.sleep_delta + self.target_sleep_offset + self.target_wake_offset
    }
}

/// Floor of `d / bucket`, rounding toward negative infinity.
fn floor_buckets(d: Duration, bucket_seconds: i64) -> i64 {
    let bucket = i128::from(bucket_seconds) * 1_000_000_000;
    d.whole_nanoseconds().div_euclid(bucket) as i64
}

pub fn score(night: &Night, prior_avg: Option<i64>, prior_score: u8, snoozes: u32) -> Scored {
    let minutes_slept = floor_buckets(night.woke_at - night.slept_at, 60);

    // halving, not a true moving average
    let avg_sleep_minutes = match prior_avg {
        None => minutes_slept,
        Some(avg) => (avg + minutes_slept).div_euclid(2),
    };

    let sleep_delta = minutes_slept - avg_sleep_minutes;
    let target_sleep_offset = floor_buckets(night.target_sleep_at - night.slept_at, BUCKET_SECONDS);
    let target_wake_offset = floor_buckets(night.woke_at - night.target_wake_at, BUCKET_SECONDS);
    let summary = sleep_delta + target_sleep_offset + target_wake_offset;

    let raw = (f64::from(prior_score) + summary as f64 * SUMMARY_WEIGHT - f64::from(snoozes)).floor();
    let score = (raw as i64).clamp(i64::from(MIN_SCORE), i64::from(MAX_SCORE)) as u8;

    Scored {
        minutes_slept,
        avg_sleep_minutes,
        sleep_delta,
        target_sleep_offset,
        target_wake_offset,
        score,
    }
}
